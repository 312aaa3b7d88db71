//! Builder for Kubernetes [`ResourceRequirements`].

use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::ResourceRequirements, apimachinery::pkg::api::resource::Quantity,
};

/// A builder to build [`ResourceRequirements`] objects.
#[derive(Clone, Default)]
pub struct ResourceRequirementsBuilder {
    limits: BTreeMap<String, Quantity>,
    requests: BTreeMap<String, Quantity>,
}

impl ResourceRequirementsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cpu_limit(mut self, limit: impl Into<String>) -> Self {
        self.limits.insert("cpu".to_string(), Quantity(limit.into()));
        self
    }

    pub fn with_cpu_request(mut self, request: impl Into<String>) -> Self {
        self.requests
            .insert("cpu".to_string(), Quantity(request.into()));
        self
    }

    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.limits
            .insert("memory".to_string(), Quantity(limit.into()));
        self
    }

    pub fn with_memory_request(mut self, request: impl Into<String>) -> Self {
        self.requests
            .insert("memory".to_string(), Quantity(request.into()));
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>, quantity: impl Into<String>) -> Self {
        let quantity = Quantity(quantity.into());
        self.limits.insert(resource.into(), quantity);
        self
    }

    pub fn build(&self) -> ResourceRequirements {
        ResourceRequirements {
            limits: (!self.limits.is_empty()).then(|| self.limits.clone()),
            requests: (!self.requests.is_empty()).then(|| self.requests.clone()),
            claims: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_cpu_and_memory() {
        let requirements = ResourceRequirementsBuilder::new()
            .with_cpu_request("500m")
            .with_cpu_limit("1")
            .with_memory_request("256Mi")
            .with_memory_limit("512Mi")
            .build();

        let limits = requirements.limits.unwrap();
        let requests = requirements.requests.unwrap();

        assert_eq!(limits.get("cpu"), Some(&Quantity("1".to_string())));
        assert_eq!(requests.get("memory"), Some(&Quantity("256Mi".to_string())));
    }
}
