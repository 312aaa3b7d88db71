//! Deployment / StatefulSet / DaemonSet / Job preparation (spec §4.3,
//! "pod-bearing" kinds).

use indexmap::IndexMap;
use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceRequirements, SecretVolumeSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::builder::configmap::ConfigMapBuilder;
use crate::builder::meta::ObjectMetaBuilder;
use crate::builder::pod::container::ContainerBuilder;
use crate::builder::pod::resources::ResourceRequirementsBuilder;
use crate::builder::pod::security::SecurityContextBuilder;
use crate::builder::pod::volume::VolumeBuilder;
use crate::builder::pod::PodBuilder;
use crate::component::behaviour::PrepareContext;
use crate::component::kinds::persistent_volume::{self, StorageEntry};
use crate::component::{Component, ComponentArena, ComponentId, Delays, Kind, State};
use crate::definition::ParentRelation;
use crate::k8s::ObjectKind;

use super::{split_kv, split_whitespace};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid container name derived from component name {name:?}"))]
    ContainerName {
        name: String,
        source: crate::builder::pod::container::Error,
    },
    #[snafu(display("failed to assemble pod template"))]
    PodTemplate { source: crate::builder::pod::Error },
    #[snafu(display("malformed port spec entry {entry:?}: missing port=N"))]
    MalformedPort { entry: String },
    #[snafu(display("port value {value:?} is not a valid integer"))]
    InvalidPortNumber {
        value: String,
        source: std::num::ParseIntError,
    },
    #[snafu(display("failed to read config.fromFile entry {path:?}"))]
    ReadConfigFile {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to build synthesised ConfigMap"))]
    ConfigMapBuild { source: crate::builder::configmap::Error },
    #[snafu(display("failed to attach volume mount"))]
    VolumeMount { source: crate::builder::pod::container::Error },
}

/// One parsed entry of the `port` argument grammar (spec §4.3):
/// `port=N[:name=…][:protocol=…][:nodePort=…][:serviceName=…][:serviceType=…][:ingress]`.
#[derive(Clone, Debug)]
pub struct PortSpec {
    pub port: i32,
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub node_port: Option<i32>,
    pub service_name: Option<String>,
    pub service_type: Option<String>,
    pub ingress: bool,
}

pub fn parse_ports(raw: &str) -> Result<Vec<PortSpec>> {
    split_whitespace(raw)
        .iter()
        .map(|entry| parse_port_entry(entry))
        .collect()
}

fn parse_port_entry(entry: &str) -> Result<PortSpec> {
    let mut segments = entry.split(':');
    let first = segments.next().unwrap_or_default();
    let (key, value) = split_kv(first).context(MalformedPortSnafu { entry: entry.to_string() })?;
    if key != "port" {
        return MalformedPortSnafu { entry: entry.to_string() }.fail();
    }
    let port: i32 = value.parse().context(InvalidPortNumberSnafu { value: value.to_string() })?;

    let mut spec = PortSpec {
        port,
        name: None,
        protocol: None,
        node_port: None,
        service_name: None,
        service_type: None,
        ingress: false,
    };

    for segment in segments {
        if segment == "ingress" {
            spec.ingress = true;
            continue;
        }
        let Some((k, v)) = split_kv(segment) else { continue };
        match k {
            "name" => spec.name = Some(v.to_string()),
            "protocol" => spec.protocol = Some(v.to_string()),
            "nodePort" => {
                spec.node_port = Some(v.parse().context(InvalidPortNumberSnafu { value: v.to_string() })?)
            }
            "serviceName" => spec.service_name = Some(v.to_string()),
            "serviceType" => spec.service_type = Some(v.to_string()),
            _ => {}
        }
    }

    if spec.name.is_none() {
        spec.name = Some(format!("port-{}", spec.port));
    }

    Ok(spec)
}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId, ctx: &PrepareContext<'_>) -> Result<()> {
    let (name, namespace, args, labels, kind) = {
        let c = arena.get(id);
        (
            c.name.clone(),
            c.effective_args
                .get("namespace")
                .cloned()
                .unwrap_or_else(|| ctx.default_namespace.to_string()),
            c.effective_args.clone(),
            c.labels.clone(),
            c.kind,
        )
    };

    // Only StatefulSets have a stable per-replica identity for `storage[]`
    // entries to bind against (via `volumeClaimTemplates`); other pod-bearing
    // kinds leave `storage[]` unsynthesised (grounded in
    // `StatefulSetComponent.cpp::buildDependencies()`, which is the only
    // pod-bearing component that does this; see DESIGN.md).
    let storage_entries: Vec<StorageEntry> = if kind == Kind::StatefulSet {
        args.get("storage")
            .map(|raw| split_whitespace(raw).iter().map(|e| persistent_volume::parse_storage_entry(e)).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let (container, volumes) = build_container(&name, &args, &storage_entries)?;
    let mut pod_builder = PodBuilder::new();
    pod_builder.add_container(container);
    for volume in volumes {
        pod_builder.add_volume(volume).context(PodTemplateSnafu)?;
    }

    if let Some(secret) = args.get("imagePullSecrets") {
        pod_builder.image_pull_secrets(secret.split(',').map(str::trim).map(String::from));
    }

    let selector_labels: std::collections::BTreeMap<String, String> =
        [("app".to_string(), name.clone())].into_iter().collect();

    let template = pod_builder
        .metadata_builder(|b| b.with_labels(selector_labels.clone()))
        .build_template();

    let replicas = args.get("replicas").and_then(|v| v.parse::<i32>().ok());

    let metadata = ObjectMetaBuilder::new()
        .name(name.clone())
        .namespace(namespace.clone())
        .with_labels(labels.clone().into_iter())
        .build();

    let built = match kind {
        Kind::Deployment => ObjectKind::Deployment(Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas,
                selector: LabelSelector {
                    match_labels: Some(selector_labels),
                    ..Default::default()
                },
                template,
                ..Default::default()
            }),
            ..Default::default()
        }),
        Kind::StatefulSet => ObjectKind::StatefulSet(StatefulSet {
            metadata,
            spec: Some(StatefulSetSpec {
                service_name: format!("{name}-svc"),
                replicas,
                selector: LabelSelector {
                    match_labels: Some(selector_labels),
                    ..Default::default()
                },
                template,
                volume_claim_templates: build_volume_claim_templates(&name, &storage_entries),
                ..Default::default()
            }),
            ..Default::default()
        }),
        Kind::DaemonSet => ObjectKind::DaemonSet(DaemonSet {
            metadata,
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_labels: Some(selector_labels),
                    ..Default::default()
                },
                template,
                ..Default::default()
            }),
            ..Default::default()
        }),
        Kind::Job => ObjectKind::Job(Job {
            metadata,
            spec: Some(JobSpec {
                template,
                ..Default::default()
            }),
            ..Default::default()
        }),
        _ => unreachable!("dispatched only for pod-bearing kinds"),
    };

    arena.get_mut(id).built = Some(built);

    synthesise_service(arena, id, &name, &namespace, &labels, &args)?;
    synthesise_configmap(arena, id, &name, &namespace, &labels, &args)?;
    synthesise_storage_volumes(
        arena,
        id,
        &name,
        &namespace,
        &labels,
        replicas.unwrap_or(1).max(1) as u32,
        &storage_entries,
        ctx.storage_backend,
    );

    Ok(())
}

fn build_container(
    name: &str,
    args: &IndexMap<String, String>,
    storage_entries: &[StorageEntry],
) -> Result<(Container, Vec<k8s_openapi::api::core::v1::Volume>)> {
    let mut builder = ContainerBuilder::new(name).context(ContainerNameSnafu { name: name.to_string() })?;
    let mut volumes = Vec::new();

    let image = args.get("image").cloned().unwrap_or_else(|| name.to_string());
    builder.image(image);

    if let Some(policy) = args.get("imagePullPolicy") {
        builder.image_pull_policy(policy.clone());
    }

    if let Some(command) = args.get("pod.command") {
        builder.command(split_whitespace(command));
    }

    if let Some(pod_args) = args.get("pod.args") {
        builder.args(split_whitespace(pod_args));
    }

    if let Some(env) = args.get("pod.env") {
        for pair in split_whitespace(env) {
            if let Some((k, v)) = split_kv(&pair) {
                builder.add_env_var(k, v);
            }
        }
    }

    if let Some(raw_ports) = args.get("port") {
        for port in parse_ports(raw_ports)? {
            let mut port_builder = crate::builder::pod::container::ContainerPortBuilder::new(port.port);
            if let Some(name) = &port.name {
                port_builder.name(name.clone());
            }
            if let Some(protocol) = &port.protocol {
                port_builder.protocol(protocol.clone());
            }
            builder.add_container_ports(vec![port_builder.build()]);
        }
    }

    let mut requirements = ResourceRequirementsBuilder::new();
    if let Some(v) = args.get("resources.cpu.min") {
        requirements = requirements.with_cpu_request(v.clone());
    }
    if let Some(v) = args.get("resources.cpu.max") {
        requirements = requirements.with_cpu_limit(v.clone());
    }
    if let Some(v) = args.get("resources.memory.min") {
        requirements = requirements.with_memory_request(v.clone());
    }
    if let Some(v) = args.get("resources.memory.max") {
        requirements = requirements.with_memory_limit(v.clone());
    }
    let resources: ResourceRequirements = requirements.build();
    if resources.requests.is_some() || resources.limits.is_some() {
        builder.resources(resources);
    }

    if args.get("securityContext.runAsRoot").map(|v| v == "true").unwrap_or(false) {
        builder.security_context(SecurityContextBuilder::run_as_root());
    } else if let Some(uid) = args.get("securityContext.runAsUser").and_then(|v| v.parse::<i64>().ok()) {
        builder.security_context(k8s_openapi::api::core::v1::SecurityContext {
            run_as_user: Some(uid),
            ..Default::default()
        });
    }

    if let Some(secret) = args.get("tls.secret") {
        let mut volume = VolumeBuilder::new("tls-certs");
        volume.secret(SecretVolumeSource {
            secret_name: Some(secret.clone()),
            ..Default::default()
        });
        builder.add_volume_mount("tls-certs", "/certs").context(VolumeMountSnafu)?;
        volumes.push(volume.build());
    }

    if args.contains_key("config.fromFile") {
        let mut volume = VolumeBuilder::new("config");
        volume.with_config_map(format!("{name}-config"));
        builder.add_volume_mount("config", "/config").context(VolumeMountSnafu)?;
        volumes.push(volume.build());
    }

    for (index, entry) in storage_entries.iter().enumerate() {
        if !entry.create_volume {
            continue;
        }
        builder
            .add_volume_mount(storage_volume_name(name, index), entry.mount_path.clone())
            .context(VolumeMountSnafu)?;
    }

    Ok((builder.build(), volumes))
}

/// Name shared between a container's `volumeMount` and the matching
/// `volumeClaimTemplate` entry it binds to (spec §4.3 "add a
/// `PersistentVolumeClaim` template + matching `volumeMount`").
fn storage_volume_name(component_name: &str, index: usize) -> String {
    format!("{component_name}-storage-{index}")
}

fn synthesise_service(
    arena: &mut ComponentArena,
    parent: ComponentId,
    name: &str,
    namespace: &str,
    labels: &IndexMap<String, String>,
    args: &IndexMap<String, String>,
) -> Result<()> {
    if args.get("service.enabled").map(|v| v == "false").unwrap_or(false) {
        return Ok(());
    }
    let has_service_child = arena
        .get(parent)
        .children
        .iter()
        .any(|&c| arena.get(c).kind == Kind::Service);
    if has_service_child {
        return Ok(());
    }

    let service_name = format!("{name}-svc");
    let mut service_args = IndexMap::new();
    if let Some(ports) = args.get("port") {
        service_args.insert("port".to_string(), ports.clone());
    }
    if let Some(node_port) = args.get("service.nodePort") {
        service_args.insert("service.nodePort".to_string(), node_port.clone());
    }
    if let Some(service_type) = args.get("service.type") {
        service_args.insert("service.type".to_string(), service_type.clone());
    }
    service_args.insert("namespace".to_string(), namespace.to_string());
    service_args.insert("selector".to_string(), format!("app={name}"));

    let svc_id = arena.insert(|id| Component {
        id,
        parent: Some(parent),
        children: Vec::new(),
        name: service_name,
        kind: Kind::Service,
        variant: None,
        labels: labels.clone(),
        args: service_args.clone(),
        default_args: IndexMap::new(),
        effective_args: service_args,
        depends: Vec::new(),
        parent_relation: ParentRelation::Before,
        state: State::Pre,
        depends_on: Vec::new(),
        cluster_depends_on: Vec::new(),
        tasks: Vec::new(),
        delays: Delays::default(),
        start_time: None,
        elapsed: None,
        object: None,
        built: None,
    });
    arena.get_mut(parent).children.push(svc_id);
    Ok(())
}

fn synthesise_configmap(
    arena: &mut ComponentArena,
    parent: ComponentId,
    name: &str,
    namespace: &str,
    labels: &IndexMap<String, String>,
    args: &IndexMap<String, String>,
) -> Result<()> {
    let Some(files) = args.get("config.fromFile") else {
        return Ok(());
    };

    let cm_name = format!("{name}-config");
    let mut builder = ConfigMapBuilder::new();
    builder.metadata(
        ObjectMetaBuilder::new()
            .name(cm_name.clone())
            .namespace(namespace.to_string())
            .with_labels(labels.clone().into_iter())
            .build(),
    );

    for path in split_whitespace(files) {
        let contents = std::fs::read(&path).context(ReadConfigFileSnafu { path: path.clone() })?;
        let basename = std::path::Path::new(&path)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        builder.add_binary_data(basename, contents);
    }

    let built = builder.build().context(ConfigMapBuildSnafu)?;

    let cm_id = arena.insert(|id| Component {
        id,
        parent: Some(parent),
        children: Vec::new(),
        name: cm_name,
        kind: Kind::ConfigMap,
        variant: None,
        labels: labels.clone(),
        args: IndexMap::new(),
        default_args: IndexMap::new(),
        effective_args: IndexMap::new(),
        depends: Vec::new(),
        parent_relation: ParentRelation::Before,
        state: State::Pre,
        depends_on: Vec::new(),
        cluster_depends_on: Vec::new(),
        tasks: Vec::new(),
        delays: Delays::default(),
        start_time: None,
        elapsed: None,
        object: None,
        built: Some(ObjectKind::ConfigMap(built)),
    });
    arena.get_mut(parent).children.push(cm_id);

    Ok(())
}

/// One `volumeClaimTemplates` entry per `storage[]` entry with
/// `createVolume=true` — its name matches the container's `volumeMount`
/// built alongside it in [`build_container`] (spec §4.3 "add a
/// `PersistentVolumeClaim` template + matching `volumeMount`").
fn build_volume_claim_templates(name: &str, storage_entries: &[StorageEntry]) -> Option<Vec<PersistentVolumeClaim>> {
    let templates: Vec<PersistentVolumeClaim> = storage_entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.create_volume)
        .map(|(index, entry)| PersistentVolumeClaim {
            metadata: ObjectMetaBuilder::new().name(storage_volume_name(name, index)).build(),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(ResourceRequirements {
                    requests: Some(
                        [(
                            "storage".to_string(),
                            k8s_openapi::apimachinery::pkg::api::resource::Quantity(entry.capacity.clone()),
                        )]
                        .into_iter()
                        .collect(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    if templates.is_empty() {
        None
    } else {
        Some(templates)
    }
}

/// Synthesises one PersistentVolume child per replica for each `storage[]`
/// entry with `createVolume=true` and a configured backend (spec §4.3).
#[allow(clippy::too_many_arguments)]
fn synthesise_storage_volumes(
    arena: &mut ComponentArena,
    parent: ComponentId,
    name: &str,
    namespace: &str,
    labels: &IndexMap<String, String>,
    replicas: u32,
    storage_entries: &[StorageEntry],
    backend: Option<&dyn crate::storage::StorageBackend>,
) {
    for entry in storage_entries {
        let volumes = persistent_volume::build_persistent_volumes(backend, namespace, name, replicas, entry);
        for (index, volume) in volumes.into_iter().enumerate() {
            let pv_name = volume
                .metadata
                .name
                .clone()
                .unwrap_or_else(|| format!("{name}-{index}"));
            let pv_id = arena.insert(|id| Component {
                id,
                parent: Some(parent),
                children: Vec::new(),
                name: pv_name,
                kind: Kind::PersistentVolume,
                variant: None,
                labels: labels.clone(),
                args: IndexMap::new(),
                default_args: IndexMap::new(),
                effective_args: IndexMap::new(),
                depends: Vec::new(),
                parent_relation: ParentRelation::Before,
                state: State::Pre,
                depends_on: Vec::new(),
                cluster_depends_on: Vec::new(),
                tasks: Vec::new(),
                delays: Delays::default(),
                start_time: None,
                elapsed: None,
                object: None,
                built: Some(ObjectKind::PersistentVolume(volume)),
            });
            arena.get_mut(parent).children.push(pv_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_port_entry() {
        let specs = parse_ports("port=80").unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].port, 80);
        assert_eq!(specs[0].name.as_deref(), Some("port-80"));
    }

    #[test]
    fn parses_full_port_entry() {
        let specs = parse_ports("port=8080:name=http:protocol=TCP:nodePort=30080:ingress").unwrap();
        let spec = &specs[0];
        assert_eq!(spec.port, 8080);
        assert_eq!(spec.name.as_deref(), Some("http"));
        assert_eq!(spec.protocol.as_deref(), Some("TCP"));
        assert_eq!(spec.node_port, Some(30080));
        assert!(spec.ingress);
    }

    #[test]
    fn parses_multiple_space_separated_entries() {
        let specs = parse_ports("port=80 port=443:name=https").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name.as_deref(), Some("https"));
    }

    #[test]
    fn missing_port_key_is_rejected() {
        assert!(parse_ports("name=http").is_err());
    }
}
