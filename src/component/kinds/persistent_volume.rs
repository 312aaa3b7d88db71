//! PersistentVolume preparation (spec §4.3, grounded in
//! `PersistentVolumeComponent.cpp`): the volume-source shape comes from the
//! cluster's configured [`StorageBackend`]; this module only fills in
//! metadata and `claimRef`.

use k8s_openapi::api::core::v1::PersistentVolume;
use snafu::Snafu;

use crate::builder::meta::ObjectMetaBuilder;
use crate::component::{ComponentArena, ComponentId};
use crate::k8s::ObjectKind;
use crate::storage::{StorageBackend, VolumeRequest};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId, backend: Option<&dyn StorageBackend>) -> Result<()> {
    let (name, namespace, labels, capacity) = {
        let c = arena.get(id);
        (
            c.name.clone(),
            c.effective_args.get("namespace").cloned().unwrap_or_else(|| "default".to_string()),
            c.labels.clone(),
            c.effective_args.get("pv.capacity").cloned().unwrap_or_else(|| "1Gi".to_string()),
        )
    };

    let mut spec = backend
        .map(|backend| {
            backend.create_volume(
                &capacity,
                &VolumeRequest {
                    namespace: &namespace,
                    component_name: &name,
                    replica_index: 0,
                },
            )
        })
        .unwrap_or_default();

    spec.claim_ref = Some(k8s_openapi::api::core::v1::ObjectReference {
        namespace: Some(namespace.clone()),
        name: Some(name.clone()),
        ..Default::default()
    });

    let metadata = ObjectMetaBuilder::new()
        .name(name)
        .namespace(namespace)
        .with_labels(labels.into_iter())
        .build();

    arena.get_mut(id).built = Some(ObjectKind::PersistentVolume(PersistentVolume {
        metadata,
        spec: Some(spec),
        ..Default::default()
    }));
    Ok(())
}

/// Synthesises one PersistentVolume + PersistentVolumeClaim template per
/// replica for a pod-bearing component's `storage[]` entries (spec §4.3
/// "For each `storage[]` entry with `createVolume=true`..."). Lives here
/// rather than in `pod_bearing` since it shares the `StorageBackend`
/// plumbing with the standalone `PersistentVolume` kind above.
pub struct StorageEntry {
    pub mount_path: String,
    pub capacity: String,
    pub create_volume: bool,
}

/// Parses one `storage[]` entry of the grammar
/// `mountPath[:capacity=SIZE][:createVolume=true|false]`.
pub fn parse_storage_entry(raw: &str) -> StorageEntry {
    let mut segments = raw.split(':');
    let mount_path = segments.next().unwrap_or_default().to_string();
    let mut capacity = "1Gi".to_string();
    let mut create_volume = false;
    for segment in segments {
        if let Some((k, v)) = segment.split_once('=') {
            match k {
                "capacity" => capacity = v.to_string(),
                "createVolume" => create_volume = v == "true",
                _ => {}
            }
        }
    }
    StorageEntry {
        mount_path,
        capacity,
        create_volume,
    }
}

pub fn build_persistent_volumes(
    backend: Option<&dyn StorageBackend>,
    namespace: &str,
    component_name: &str,
    replicas: u32,
    entry: &StorageEntry,
) -> Vec<PersistentVolume> {
    let Some(backend) = backend else {
        return Vec::new();
    };
    if !entry.create_volume {
        return Vec::new();
    }

    (0..replicas.max(1))
        .map(|replica_index| {
            let pv_name = format!("{component_name}-{replica_index}");
            let mut spec = backend.create_volume(
                &entry.capacity,
                &VolumeRequest {
                    namespace,
                    component_name,
                    replica_index,
                },
            );
            spec.claim_ref = Some(k8s_openapi::api::core::v1::ObjectReference {
                namespace: Some(namespace.to_string()),
                name: Some(format!("{component_name}-{replica_index}-pvc")),
                ..Default::default()
            });

            PersistentVolume {
                metadata: ObjectMetaBuilder::new().name(pv_name).build(),
                spec: Some(spec),
                ..Default::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HostPathBackend;

    #[test]
    fn parses_storage_entry_grammar() {
        let entry = parse_storage_entry("/var/lib/pg:capacity=10Gi:createVolume=true");
        assert_eq!(entry.mount_path, "/var/lib/pg");
        assert_eq!(entry.capacity, "10Gi");
        assert!(entry.create_volume);
    }

    #[test]
    fn builds_one_volume_per_replica() {
        let backend = HostPathBackend::parse("hostpath:/data").unwrap();
        let entry = StorageEntry {
            mount_path: "/var/lib/pg".to_string(),
            capacity: "10Gi".to_string(),
            create_volume: true,
        };
        let volumes = build_persistent_volumes(Some(&backend), "default", "pg", 3, &entry);
        assert_eq!(volumes.len(), 3);
        assert_eq!(volumes[1].metadata.name.as_deref(), Some("pg-1"));
    }

    #[test]
    fn no_backend_means_no_volumes() {
        let entry = StorageEntry {
            mount_path: "/data".to_string(),
            capacity: "1Gi".to_string(),
            create_volume: true,
        };
        assert!(build_persistent_volumes(None, "default", "pg", 1, &entry).is_empty());
    }
}
