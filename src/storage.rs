//! The `StorageBackend` trait boundary (spec §1 Out-of-scope: "the concrete
//! backend's volume-source shape is behind a `StorageBackend` trait";
//! grounded in `Storage.h`/`HostPathStorage.cpp`/`NfsStorage.cpp`).
//!
//! `prepareDeploy` on a PersistentVolume component only decides *whether* a
//! volume is synthesised and how many; the backend below decides the
//! concrete `hostPath` vs `nfs` volume source. Two concrete backends are
//! provided, mirroring the pair the original tool ships out of the box;
//! further backends (cloud block storage, CSI drivers) are the kind of
//! cluster-specific integration point spec §1 explicitly places out of
//! scope.

use k8s_openapi::api::core::v1::{HostPathVolumeSource, NFSVolumeSource, PersistentVolumeSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::{ensure, Snafu};
use std::collections::BTreeMap;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("hostpath backend definition {def:?} must be 'hostpath:<path>'"))]
    HostPathArgs { def: String },
    #[snafu(display("nfs backend definition {def:?} must be 'nfs:<server>:<path>'"))]
    NfsArgs { def: String },
}

/// A request to carve out one persistent volume for one replica of a
/// component (spec §4.3 "synthesise one PersistentVolume per replica").
pub struct VolumeRequest<'a> {
    pub namespace: &'a str,
    pub component_name: &'a str,
    pub replica_index: u32,
}

/// Produces the volume-source-specific half of a `PersistentVolumeSpec`;
/// the calling component fills in `claimRef`, `metadata.name`/`namespace`.
pub trait StorageBackend: Send + Sync {
    fn create_volume(&self, storage_size: &str, request: &VolumeRequest<'_>) -> PersistentVolumeSpec;
}

/// `hostPath:<path>` — a single-node directory-backed volume (grounded in
/// `HostPathStorage.cpp`).
pub struct HostPathBackend {
    host_path: String,
}

impl HostPathBackend {
    pub fn parse(def: &str) -> Result<Self> {
        let mut parts = def.split(':');
        let scheme = parts.next().unwrap_or_default();
        let path = parts.next();
        ensure!(scheme == "hostpath" && path.is_some() && parts.next().is_none(), HostPathArgsSnafu { def });
        Ok(Self {
            host_path: path.unwrap().to_string(),
        })
    }
}

impl StorageBackend for HostPathBackend {
    fn create_volume(&self, storage_size: &str, request: &VolumeRequest<'_>) -> PersistentVolumeSpec {
        let path = format!(
            "{}/{}/{}/{}",
            self.host_path, request.namespace, request.component_name, request.replica_index
        );

        let mut capacity = BTreeMap::new();
        capacity.insert("storage".to_string(), Quantity(storage_size.to_string()));

        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert("pv.beta.kubernetes.io/gid".to_string(), "1000".to_string());

        PersistentVolumeSpec {
            host_path: Some(HostPathVolumeSource {
                path,
                type_: Some("DirectoryOrCreate".to_string()),
            }),
            storage_class_name: Some("manual".to_string()),
            capacity: Some(capacity),
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            persistent_volume_reclaim_policy: Some("Delete".to_string()),
            ..Default::default()
        }
    }
}

/// `nfs:<server>:<path>` — a shared NFS-export-backed volume (grounded in
/// `NfsStorage.cpp`).
pub struct NfsBackend {
    server: String,
    path: String,
}

impl NfsBackend {
    pub fn parse(def: &str) -> Result<Self> {
        let mut parts = def.split(':');
        let scheme = parts.next().unwrap_or_default();
        let server = parts.next();
        let path = parts.next();
        ensure!(
            scheme == "nfs" && server.is_some() && path.is_some() && parts.next().is_none(),
            NfsArgsSnafu { def }
        );
        Ok(Self {
            server: server.unwrap().to_string(),
            path: path.unwrap().to_string(),
        })
    }
}

impl StorageBackend for NfsBackend {
    fn create_volume(&self, storage_size: &str, request: &VolumeRequest<'_>) -> PersistentVolumeSpec {
        let path = format!(
            "{}/{}/{}/{}",
            self.path, request.namespace, request.component_name, request.replica_index
        );

        let mut capacity = BTreeMap::new();
        capacity.insert("storage".to_string(), Quantity(storage_size.to_string()));

        PersistentVolumeSpec {
            nfs: Some(NFSVolumeSource {
                server: self.server.clone(),
                path,
                read_only: None,
            }),
            storage_class_name: Some("nfs".to_string()),
            capacity: Some(capacity),
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            persistent_volume_reclaim_policy: Some("Delete".to_string()),
            mount_options: Some(vec!["hard".to_string()]),
            ..Default::default()
        }
    }
}

/// Builds the configured backend from a `-storage backend:...` definition
/// string (spec §4.3, `storage[].createVolume`).
pub fn backend_from_def(def: &str) -> Result<Box<dyn StorageBackend>> {
    if def.starts_with("hostpath:") {
        Ok(Box::new(HostPathBackend::parse(def)?))
    } else {
        Ok(Box::new(NfsBackend::parse(def)?))
    }
}
