//! Service preparation (spec §4.3): pulls selectors and ports from the
//! parent pod-bearing component.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use snafu::{ResultExt, Snafu};

use crate::builder::meta::ObjectMetaBuilder;
use crate::component::{ComponentArena, ComponentId};
use crate::k8s::ObjectKind;

use super::pod_bearing::{self, PortSpec};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse port spec on Service's pod-bearing parent"))]
    ParsePorts { source: pod_bearing::Error },
}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId) -> Result<()> {
    let (name, namespace, labels, args) = {
        let c = arena.get(id);
        (
            c.name.clone(),
            c.effective_args.get("namespace").cloned().unwrap_or_else(|| "default".to_string()),
            c.labels.clone(),
            c.effective_args.clone(),
        )
    };

    let selector = args
        .get("selector")
        .and_then(|s| s.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()));

    let ports: Vec<PortSpec> = match args.get("port") {
        Some(raw) => pod_bearing::parse_ports(raw).context(ParsePortsSnafu)?,
        None => Vec::new(),
    };

    let node_port: Option<i32> = args.get("service.nodePort").and_then(|v| v.parse().ok());
    let explicit_type = args.get("service.type").cloned();

    // Resolved Open Question (spec §9): the newer upstream rule only forces
    // `NodePort` when no explicit `service.type` was given.
    let service_type = explicit_type.clone().or_else(|| {
        if node_port.is_some() {
            Some("NodePort".to_string())
        } else {
            None
        }
    });

    let service_ports: Vec<ServicePort> = if ports.is_empty() {
        Vec::new()
    } else {
        ports
            .iter()
            .map(|p| ServicePort {
                name: p.name.clone(),
                port: p.port,
                target_port: Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(p.port)),
                node_port: node_port.or(p.node_port),
                protocol: p.protocol.clone(),
                ..Default::default()
            })
            .collect()
    };

    let metadata = ObjectMetaBuilder::new()
        .name(name)
        .namespace(namespace)
        .with_labels(labels.into_iter())
        .build();

    let service = Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: selector.map(|(k, v)| [(k, v)].into_iter().collect()),
            ports: if service_ports.is_empty() { None } else { Some(service_ports) },
            type_: service_type,
            ..Default::default()
        }),
        ..Default::default()
    };

    arena.get_mut(id).built = Some(ObjectKind::Service(service));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Delays, Kind, State};
    use crate::definition::ParentRelation;
    use indexmap::IndexMap;

    fn service_component(args: IndexMap<String, String>) -> Component {
        Component {
            id: ComponentId(0),
            parent: None,
            children: Vec::new(),
            name: "web-svc".to_string(),
            kind: Kind::Service,
            variant: None,
            labels: IndexMap::new(),
            args: args.clone(),
            default_args: IndexMap::new(),
            effective_args: args,
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
        }
    }

    #[test]
    fn node_port_forces_nodeport_type_when_no_explicit_type() {
        let mut args = IndexMap::new();
        args.insert("port".to_string(), "port=80".to_string());
        args.insert("service.nodePort".to_string(), "30080".to_string());

        let mut arena = ComponentArena::new();
        let id = arena.insert(|_| service_component(args));
        prepare(&mut arena, id).unwrap();

        match arena.get(id).built.as_ref().unwrap() {
            ObjectKind::Service(svc) => {
                assert_eq!(svc.spec.as_ref().unwrap().type_.as_deref(), Some("NodePort"));
            }
            _ => panic!("expected Service"),
        }
    }

    #[test]
    fn explicit_type_is_not_overridden_by_node_port() {
        let mut args = IndexMap::new();
        args.insert("service.nodePort".to_string(), "30080".to_string());
        args.insert("service.type".to_string(), "ClusterIP".to_string());

        let mut arena = ComponentArena::new();
        let id = arena.insert(|_| service_component(args));
        prepare(&mut arena, id).unwrap();

        match arena.get(id).built.as_ref().unwrap() {
            ObjectKind::Service(svc) => {
                assert_eq!(svc.spec.as_ref().unwrap().type_.as_deref(), Some("ClusterIP"));
            }
            _ => panic!("expected Service"),
        }
    }
}
