//! The Kubernetes object adapter (spec §4.6 "Apply semantics", §6 "external
//! interfaces"). This wraps [`kube::Api`] rather than building raw HTTP
//! requests — kubeconfig parsing, TLS and transport are out of scope per
//! spec §1 and delegated entirely to [`kube::Client`].

pub mod events;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolume, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use snafu::{ResultExt, Snafu};

use crate::component::Kind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to {verb} {kind} {name:?} in cluster"))]
    Request {
        verb: &'static str,
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("kind {kind} does not support the requested operation"))]
    Unsupported { kind: String },
}

/// A typed Kubernetes object, produced by `prepareDeploy` (see
/// [`crate::component::kinds`]) and consumed by [`Adapter::apply`].
#[derive(Clone, Debug)]
pub enum ObjectKind {
    Job(Job),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
    Service(Service),
    ConfigMap(ConfigMap),
    Secret(Secret),
    PersistentVolume(PersistentVolume),
    Ingress(Ingress),
    Namespace(Namespace),
    Role(Role),
    ClusterRole(ClusterRole),
    RoleBinding(RoleBinding),
    ClusterRoleBinding(ClusterRoleBinding),
    ServiceAccount(ServiceAccount),
}

impl ObjectKind {
    pub fn kind(&self) -> Kind {
        match self {
            ObjectKind::Job(_) => Kind::Job,
            ObjectKind::Deployment(_) => Kind::Deployment,
            ObjectKind::StatefulSet(_) => Kind::StatefulSet,
            ObjectKind::DaemonSet(_) => Kind::DaemonSet,
            ObjectKind::Service(_) => Kind::Service,
            ObjectKind::ConfigMap(_) => Kind::ConfigMap,
            ObjectKind::Secret(_) => Kind::Secret,
            ObjectKind::PersistentVolume(_) => Kind::PersistentVolume,
            ObjectKind::Ingress(_) => Kind::Ingress,
            ObjectKind::Namespace(_) => Kind::Namespace,
            ObjectKind::Role(_) => Kind::Role,
            ObjectKind::ClusterRole(_) => Kind::ClusterRole,
            ObjectKind::RoleBinding(_) => Kind::RoleBinding,
            ObjectKind::ClusterRoleBinding(_) => Kind::ClusterRoleBinding,
            ObjectKind::ServiceAccount(_) => Kind::ServiceAccount,
        }
    }

    pub fn name(&self) -> String {
        macro_rules! name_of {
            ($obj:expr) => {
                $obj.name_any()
            };
        }
        match self {
            ObjectKind::Job(o) => name_of!(o),
            ObjectKind::Deployment(o) => name_of!(o),
            ObjectKind::StatefulSet(o) => name_of!(o),
            ObjectKind::DaemonSet(o) => name_of!(o),
            ObjectKind::Service(o) => name_of!(o),
            ObjectKind::ConfigMap(o) => name_of!(o),
            ObjectKind::Secret(o) => name_of!(o),
            ObjectKind::PersistentVolume(o) => name_of!(o),
            ObjectKind::Ingress(o) => name_of!(o),
            ObjectKind::Namespace(o) => name_of!(o),
            ObjectKind::Role(o) => name_of!(o),
            ObjectKind::ClusterRole(o) => name_of!(o),
            ObjectKind::RoleBinding(o) => name_of!(o),
            ObjectKind::ClusterRoleBinding(o) => name_of!(o),
            ObjectKind::ServiceAccount(o) => name_of!(o),
        }
    }
}

/// True for kinds whose `kube::Api` must be constructed with [`Api::all`]
/// rather than [`Api::namespaced`].
fn is_cluster_scoped(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Namespace | Kind::ClusterRole | Kind::ClusterRoleBinding
    )
}

/// Wraps a `kube::Client` and dispatches apply/patch/delete/get by
/// [`ObjectKind`]/[`Kind`].
#[derive(Clone)]
pub struct Adapter {
    client: Client,
}

impl Adapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, kind: Kind, namespace: &str) -> Api<K>
    where
        K: kube::Resource<DynamicType = ()>,
    {
        if is_cluster_scoped(kind) {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }

    /// POSTs `object` to its creation endpoint. On a 409 conflict with
    /// `dont_fail_if_already_exists` set, falls back to a merge-patch
    /// against the named object instead (spec §4.6, §7 "Conflict on
    /// create").
    pub async fn apply(
        &self,
        namespace: &str,
        object: &ObjectKind,
        dont_fail_if_already_exists: bool,
    ) -> Result<()> {
        macro_rules! apply_as {
            ($kind:expr, $obj:expr) => {{
                let api = self.api(object.kind(), namespace);
                match api.create(&PostParams::default(), $obj).await {
                    Ok(_) => Ok(()),
                    Err(kube::Error::Api(ae)) if ae.code == 409 && dont_fail_if_already_exists => {
                        let name = $obj.name_any();
                        let patch = Patch::Merge($obj);
                        api.patch(&name, &PatchParams::apply("kdeploy"), &patch)
                            .await
                            .context(RequestSnafu {
                                verb: "patch",
                                kind: $kind.as_str(),
                                name,
                            })?;
                        Ok(())
                    }
                    Err(source) => Err(Error::Request {
                        verb: "create",
                        kind: $kind.as_str().to_string(),
                        name: $obj.name_any(),
                        source,
                    }),
                }
            }};
        }

        match object {
            ObjectKind::Job(o) => apply_as!(Kind::Job, o),
            ObjectKind::Deployment(o) => apply_as!(Kind::Deployment, o),
            ObjectKind::StatefulSet(o) => apply_as!(Kind::StatefulSet, o),
            ObjectKind::DaemonSet(o) => apply_as!(Kind::DaemonSet, o),
            ObjectKind::Service(o) => apply_as!(Kind::Service, o),
            ObjectKind::ConfigMap(o) => apply_as!(Kind::ConfigMap, o),
            ObjectKind::Secret(o) => apply_as!(Kind::Secret, o),
            ObjectKind::PersistentVolume(o) => apply_as!(Kind::PersistentVolume, o),
            ObjectKind::Ingress(o) => apply_as!(Kind::Ingress, o),
            ObjectKind::Namespace(o) => apply_as!(Kind::Namespace, o),
            ObjectKind::Role(o) => apply_as!(Kind::Role, o),
            ObjectKind::ClusterRole(o) => apply_as!(Kind::ClusterRole, o),
            ObjectKind::RoleBinding(o) => apply_as!(Kind::RoleBinding, o),
            ObjectKind::ClusterRoleBinding(o) => apply_as!(Kind::ClusterRoleBinding, o),
            ObjectKind::ServiceAccount(o) => apply_as!(Kind::ServiceAccount, o),
        }
    }

    /// DELETEs the named object, treating 404 as success (spec §7
    /// "Not-found on apply/delete").
    pub async fn delete(&self, namespace: &str, kind: Kind, name: &str) -> Result<()> {
        macro_rules! delete_as {
            ($ty:ty) => {{
                let api: Api<$ty> = self.api(kind, namespace);
                match api.delete(name, &DeleteParams::default()).await {
                    Ok(_) => Ok(()),
                    Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
                    Err(source) => Err(Error::Request {
                        verb: "delete",
                        kind: kind.as_str().to_string(),
                        name: name.to_string(),
                        source,
                    }),
                }
            }};
        }

        match kind {
            Kind::Job => delete_as!(Job),
            Kind::Deployment => delete_as!(Deployment),
            Kind::StatefulSet => delete_as!(StatefulSet),
            Kind::DaemonSet => delete_as!(DaemonSet),
            Kind::Service => delete_as!(Service),
            Kind::ConfigMap => delete_as!(ConfigMap),
            Kind::Secret => delete_as!(Secret),
            Kind::PersistentVolume => delete_as!(PersistentVolume),
            Kind::Ingress => delete_as!(Ingress),
            Kind::Namespace => delete_as!(Namespace),
            Kind::Role => delete_as!(Role),
            Kind::ClusterRole => delete_as!(ClusterRole),
            Kind::RoleBinding => delete_as!(RoleBinding),
            Kind::ClusterRoleBinding => delete_as!(ClusterRoleBinding),
            Kind::ServiceAccount => delete_as!(ServiceAccount),
            Kind::App | Kind::HttpRequest => UnsupportedSnafu {
                kind: kind.as_str(),
            }
            .fail(),
        }
    }

    /// Scales a `StatefulSet` to `replicas` (spec §4.5 scenario S3:
    /// "scale replicas to 0 and wait").
    pub async fn scale_statefulset(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<StatefulSet> = self.api(Kind::StatefulSet, namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        api.patch(
            name,
            &PatchParams::apply("kdeploy"),
            &Patch::Merge(&patch),
        )
        .await
        .context(RequestSnafu {
            verb: "scale",
            kind: Kind::StatefulSet.as_str(),
            name,
        })?;
        Ok(())
    }

    /// Deletes every `PersistentVolumeClaim` matching `label_selector`
    /// (spec §4.5 scenario S3: "PVC deletion uses labelSelector ... with
    /// `propagationPolicy=Orphan`").
    pub async fn delete_pvcs_by_label(&self, namespace: &str, label_selector: &str) -> Result<()> {
        use k8s_openapi::api::core::v1::PersistentVolumeClaim;
        use kube::api::{ListParams, PropagationPolicy};

        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let claims = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .context(RequestSnafu {
                verb: "list",
                kind: "PersistentVolumeClaim",
                name: label_selector,
            })?;

        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Orphan),
            ..Default::default()
        };

        for claim in claims.items {
            let name = claim.name_any();
            match api.delete(&name, &params).await {
                Ok(_) => {}
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(source) => {
                    return Err(Error::Request {
                        verb: "delete",
                        kind: "PersistentVolumeClaim".to_string(),
                        name,
                        source,
                    })
                }
            }
        }

        Ok(())
    }

    /// GETs the named object and returns it as JSON, or `None` on 404
    /// (used by [`crate::orchestrator::probe`]).
    pub async fn get(
        &self,
        namespace: &str,
        kind: Kind,
        name: &str,
    ) -> Result<Option<serde_json::Value>> {
        macro_rules! get_as {
            ($ty:ty) => {{
                let api: Api<$ty> = self.api(kind, namespace);
                match api.get_opt(name).await {
                    Ok(Some(obj)) => Ok(Some(serde_json::to_value(&obj).unwrap_or_default())),
                    Ok(None) => Ok(None),
                    Err(source) => Err(Error::Request {
                        verb: "get",
                        kind: kind.as_str().to_string(),
                        name: name.to_string(),
                        source,
                    }),
                }
            }};
        }

        match kind {
            Kind::Job => get_as!(Job),
            Kind::Deployment => get_as!(Deployment),
            Kind::StatefulSet => get_as!(StatefulSet),
            Kind::DaemonSet => get_as!(DaemonSet),
            Kind::Service => get_as!(Service),
            Kind::ConfigMap => get_as!(ConfigMap),
            Kind::Secret => get_as!(Secret),
            Kind::PersistentVolume => get_as!(PersistentVolume),
            Kind::Ingress => get_as!(Ingress),
            Kind::Namespace => get_as!(Namespace),
            Kind::Role => get_as!(Role),
            Kind::ClusterRole => get_as!(ClusterRole),
            Kind::RoleBinding => get_as!(RoleBinding),
            Kind::ClusterRoleBinding => get_as!(ClusterRoleBinding),
            Kind::ServiceAccount => get_as!(ServiceAccount),
            Kind::App | Kind::HttpRequest => UnsupportedSnafu {
                kind: kind.as_str(),
            }
            .fail(),
        }
    }
}
