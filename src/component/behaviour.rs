//! Per-kind preparation dispatch (spec §4.3, Design Notes §9: "collapse to
//! a single Component record carrying a `kind` discriminant plus a
//! per-kind 'behaviour' capability set `{prepareDeploy, buildDeployTasks,
//! buildRemoveTasks, probe}`; dispatch on `kind`").
//!
//! `buildDeployTasks`/`buildRemoveTasks` live in [`crate::task::graph`]
//! (they need the whole arena, not a single component) and `probe` lives in
//! [`crate::orchestrator::probe`] (it needs the K8s adapter). This module
//! covers the part that can run standalone: turning a component's
//! `effectiveArgs` into a built object and any implicit children.

use snafu::{ResultExt, Snafu};

use crate::component::kinds;
use crate::component::{ComponentArena, ComponentId, Kind};
use crate::dns::DnsProvisioner;
use crate::storage::StorageBackend;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to prepare pod-bearing component {name:?}"))]
    PodBearing {
        name: String,
        source: kinds::pod_bearing::Error,
    },
    #[snafu(display("failed to prepare Service component {name:?}"))]
    Service { name: String, source: kinds::service::Error },
    #[snafu(display("failed to prepare Ingress component {name:?}"))]
    Ingress { name: String, source: kinds::ingress::Error },
    #[snafu(display("failed to prepare ConfigMap component {name:?}"))]
    ConfigMap { name: String, source: kinds::configmap::Error },
    #[snafu(display("failed to prepare Secret component {name:?}"))]
    Secret { name: String, source: kinds::secret::Error },
    #[snafu(display("failed to prepare HttpRequest component {name:?}"))]
    HttpRequest {
        name: String,
        source: kinds::http_request::Error,
    },
    #[snafu(display("failed to prepare RBAC component {name:?}"))]
    Rbac { name: String, source: kinds::rbac::Error },
    #[snafu(display("failed to prepare PersistentVolume component {name:?}"))]
    PersistentVolume {
        name: String,
        source: kinds::persistent_volume::Error,
    },
    #[snafu(display("failed to prepare Namespace component {name:?}"))]
    Namespace { name: String, source: kinds::namespace::Error },
}

/// Everything `prepareDeploy` needs that isn't already on the component
/// itself: the storage and DNS collaborators named as trait-object
/// boundaries in spec §1 ("Out of scope: ... Storage backends ...",
/// "... the `DnsProvisioner` trait boundary").
pub struct PrepareContext<'a> {
    pub default_namespace: &'a str,
    pub storage_backend: Option<&'a dyn StorageBackend>,
    pub dns_provisioner: Option<&'a dyn DnsProvisioner>,
}

/// Runs `prepareDeploy` over every component currently in the arena, in
/// parent-before-child order so a pod-bearing component's synthesised
/// children (Service/ConfigMap/Secret/PersistentVolume) exist before the
/// arena is walked again by the dependency resolver and task builder.
pub fn prepare_all(arena: &mut ComponentArena, ctx: &PrepareContext<'_>) -> Result<()> {
    let roots: Vec<ComponentId> = arena.ids().filter(|&id| arena.get(id).parent.is_none()).collect();
    for root in roots {
        prepare_subtree(arena, root, ctx)?;
    }
    Ok(())
}

fn prepare_subtree(arena: &mut ComponentArena, id: ComponentId, ctx: &PrepareContext<'_>) -> Result<()> {
    prepare_one(arena, id, ctx)?;
    let children = arena.get(id).children.clone();
    for child in children {
        prepare_subtree(arena, child, ctx)?;
    }
    Ok(())
}

fn prepare_one(arena: &mut ComponentArena, id: ComponentId, ctx: &PrepareContext<'_>) -> Result<()> {
    let kind = arena.get(id).kind;
    let name = arena.get(id).name.clone();

    match kind {
        Kind::App => Ok(()),
        Kind::Deployment | Kind::StatefulSet | Kind::DaemonSet | Kind::Job => {
            kinds::pod_bearing::prepare(arena, id, ctx).context(PodBearingSnafu { name })
        }
        Kind::Service => kinds::service::prepare(arena, id).context(ServiceSnafu { name }),
        Kind::Ingress => kinds::ingress::prepare(arena, id, ctx.dns_provisioner).context(IngressSnafu { name }),
        Kind::ConfigMap => kinds::configmap::prepare(arena, id).context(ConfigMapSnafu { name }),
        Kind::Secret => kinds::secret::prepare(arena, id).context(SecretSnafu { name }),
        Kind::HttpRequest => kinds::http_request::prepare(arena, id).context(HttpRequestSnafu { name }),
        Kind::Role | Kind::ClusterRole | Kind::RoleBinding | Kind::ClusterRoleBinding | Kind::ServiceAccount => {
            kinds::rbac::prepare(arena, id).context(RbacSnafu { name })
        }
        Kind::PersistentVolume => {
            kinds::persistent_volume::prepare(arena, id, ctx.storage_backend).context(PersistentVolumeSnafu { name })
        }
        Kind::Namespace => kinds::namespace::prepare(arena, id).context(NamespaceSnafu { name }),
    }
}
