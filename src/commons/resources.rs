//! Validation helpers for container resource requirements.
//!
//! Kubernetes happily accepts a [`PodSpec`] whose containers have no resource
//! limits, or whose limits are wildly disproportionate to their requests.
//! Neither failure mode produces an admission error, so we check for both
//! ourselves and log a warning instead of silently shipping an
//! under-specified pod.

use k8s_openapi::api::core::v1::PodSpec;
use snafu::{ResultExt, Snafu};

use crate::quantity::Quantity;

/// Limits more than four times the request are almost always a mistake
/// rather than intentional burst headroom.
pub const LIMIT_REQUEST_RATIO_CPU: f32 = 4.0;
pub const LIMIT_REQUEST_RATIO_MEMORY: f32 = 4.0;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("container {container_name:?} has no {resource_type} for resource {resource:?}"))]
    MissingResourceRequirement {
        container_name: String,
        resource_type: ResourceRequirementsType,
        resource: String,
    },

    #[snafu(display(
        "container {container_name:?} has a {resource:?} limit of {limit} which is more than {max_ratio}x its request of {request}"
    ))]
    LimitToRequestRatioTooHigh {
        container_name: String,
        resource: ComputeResource,
        limit: Quantity,
        request: Quantity,
        max_ratio: f32,
    },

    #[snafu(display("failed to parse quantity for {resource:?}"))]
    ParseQuantity {
        source: crate::quantity::ParseQuantityError,
        resource: ComputeResource,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceRequirementsType {
    Limits,
    Requests,
}

impl std::fmt::Display for ResourceRequirementsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceRequirementsType::Limits => write!(f, "limit"),
            ResourceRequirementsType::Requests => write!(f, "request"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeResource {
    Cpu,
    Memory,
}

impl ComputeResource {
    fn key(&self) -> &'static str {
        match self {
            ComputeResource::Cpu => "cpu",
            ComputeResource::Memory => "memory",
        }
    }
}

/// Extension trait providing best-effort sanity checks on the resource
/// requirements of every container in a [`PodSpec`].
pub trait ResourceRequirementsExt {
    fn check_resource_requirement(
        &self,
        resource_type: ResourceRequirementsType,
        resource: &str,
    ) -> Result<(), Error>;

    fn check_limit_to_request_ratio(
        &self,
        resource: &ComputeResource,
        max_ratio: f32,
    ) -> Result<(), Error>;
}

impl ResourceRequirementsExt for PodSpec {
    fn check_resource_requirement(
        &self,
        resource_type: ResourceRequirementsType,
        resource: &str,
    ) -> Result<(), Error> {
        for container in &self.containers {
            let requirements = container.resources.as_ref();
            let values = match resource_type {
                ResourceRequirementsType::Limits => {
                    requirements.and_then(|r| r.limits.as_ref())
                }
                ResourceRequirementsType::Requests => {
                    requirements.and_then(|r| r.requests.as_ref())
                }
            };

            let has_resource = values.map(|v| v.contains_key(resource)).unwrap_or(false);
            if !has_resource {
                return MissingResourceRequirementSnafu {
                    container_name: container.name.clone(),
                    resource_type,
                    resource: resource.to_string(),
                }
                .fail();
            }
        }

        Ok(())
    }

    fn check_limit_to_request_ratio(
        &self,
        resource: &ComputeResource,
        max_ratio: f32,
    ) -> Result<(), Error> {
        for container in &self.containers {
            let Some(requirements) = container.resources.as_ref() else {
                continue;
            };

            let limit = requirements
                .limits
                .as_ref()
                .and_then(|l| l.get(resource.key()));
            let request = requirements
                .requests
                .as_ref()
                .and_then(|r| r.get(resource.key()));

            let (Some(limit), Some(request)) = (limit, request) else {
                continue;
            };

            let limit = Quantity::try_from(limit.clone()).context(ParseQuantitySnafu {
                resource: *resource,
            })?;
            let request = Quantity::try_from(request.clone()).context(ParseQuantitySnafu {
                resource: *resource,
            })?;

            let (limit, request) = limit.set_suffix_or_scale_rhs(request);
            let threshold = request * max_ratio;

            if limit > threshold {
                return LimitToRequestRatioTooHighSnafu {
                    container_name: container.name.clone(),
                    resource: *resource,
                    limit,
                    request,
                    max_ratio,
                }
                .fail();
            }
        }

        Ok(())
    }
}
