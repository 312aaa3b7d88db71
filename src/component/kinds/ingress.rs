//! Ingress preparation (spec §4.3 "Ingress"): parses the `ingress.paths`
//! grammar against the parent Service's ports, and —when a DNS provisioner
//! is configured— marks the component so [`crate::task::graph`] appends a
//! DNS-provision task after the apply task (spec §4.5 scenario S6).

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec,
    IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use snafu::{ensure, OptionExt, Snafu};

use crate::builder::meta::ObjectMetaBuilder;
use crate::component::{ComponentArena, ComponentId, Kind};
use crate::dns::DnsProvisioner;
use crate::k8s::ObjectKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Ingress {name:?} has no parent, but its backend must target a Service"))]
    MissingParent { name: String },
    #[snafu(display("Ingress {name:?}'s parent must be a Service"))]
    ParentNotService { name: String },
    #[snafu(display("malformed ingress.paths entry {entry:?}: missing leading '/'"))]
    MalformedPath { entry: String },
    #[snafu(display("ingress.port {port:?} does not match any port on the parent Service"))]
    UnknownPort { port: String },
    #[snafu(display("Ingress {name:?}'s parent Service has no ports to default to"))]
    NoDefaultPort { name: String },
}

/// One parsed entry of `ingress.paths`: `[host:]/path[/*]`. A trailing `/*`
/// means `pathType=Prefix` over the path with the `/*` stripped; an exact
/// path (no trailing `/*`) gets `pathType=Exact`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ParsedPath {
    host: Option<String>,
    path: String,
    prefix: bool,
}

/// Parses the whitespace-separated `ingress.paths` grammar (spec §4.3,
/// scenario S6: `"example.com:/app/*"` -> host `example.com`, path `/app`,
/// `pathType=Prefix`).
fn parse_paths(raw: &str) -> Result<Vec<ParsedPath>> {
    raw.split_whitespace().map(parse_one_path).collect()
}

fn parse_one_path(entry: &str) -> Result<ParsedPath> {
    // `host:/path` vs. a bare `/path` — a colon before the first `/` marks
    // a host prefix; paths themselves never contain a colon in this
    // grammar.
    let (host, rest) = match entry.split_once(':') {
        Some((host, rest)) if !host.is_empty() && rest.starts_with('/') => (Some(host.to_string()), rest),
        _ => (None, entry),
    };

    ensure!(rest.starts_with('/'), MalformedPathSnafu { entry: entry.to_string() });

    let (path, prefix) = match rest.strip_suffix("/*") {
        Some(stripped) => (if stripped.is_empty() { "/" } else { stripped }.to_string(), true),
        None => (rest.to_string(), false),
    };

    Ok(ParsedPath { host, path, prefix })
}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId, _dns_provisioner: Option<&dyn DnsProvisioner>) -> Result<()> {
    let (name, namespace, labels, args, parent) = {
        let c = arena.get(id);
        (
            c.name.clone(),
            c.effective_args.get("namespace").cloned().unwrap_or_else(|| "default".to_string()),
            c.labels.clone(),
            c.effective_args.clone(),
            c.parent,
        )
    };

    let parent_id = parent.context(MissingParentSnafu { name: name.clone() })?;
    ensure!(arena.get(parent_id).kind == Kind::Service, ParentNotServiceSnafu { name: name.clone() });

    let service = match arena.get(parent_id).built.as_ref() {
        Some(ObjectKind::Service(svc)) => svc.clone(),
        _ => Service::default(),
    };
    let service_name = arena.get(parent_id).name.clone();
    let service_ports = service.spec.as_ref().and_then(|s| s.ports.clone()).unwrap_or_default();

    let port_name = match args.get("ingress.port") {
        Some(requested) => {
            ensure!(
                service_ports.iter().any(|p| p.name.as_deref() == Some(requested.as_str())),
                UnknownPortSnafu { port: requested.clone() }
            );
            requested.clone()
        }
        None => service_ports
            .first()
            .and_then(|p| p.name.clone())
            .context(NoDefaultPortSnafu { name: name.clone() })?,
    };

    let paths = match args.get("ingress.paths") {
        Some(raw) => parse_paths(raw)?,
        None => Vec::new(),
    };

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: service_name,
            port: Some(ServiceBackendPort {
                name: Some(port_name),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    let mut rules_by_host: indexmap::IndexMap<Option<String>, Vec<HTTPIngressPath>> = indexmap::IndexMap::new();
    for parsed in &paths {
        rules_by_host.entry(parsed.host.clone()).or_default().push(HTTPIngressPath {
            path: Some(parsed.path.clone()),
            path_type: if parsed.prefix { "Prefix".to_string() } else { "Exact".to_string() },
            backend: backend.clone(),
        });
    }

    let rules: Vec<IngressRule> = rules_by_host
        .into_iter()
        .map(|(host, http_paths)| IngressRule {
            host,
            http: Some(HTTPIngressRuleValue { paths: http_paths }),
        })
        .collect();

    let tls = args.get("ingress.secret").map(|secret| {
        let hosts: Vec<String> = paths.iter().filter_map(|p| p.host.clone()).collect();
        vec![IngressTLS {
            hosts: if hosts.is_empty() { None } else { Some(hosts) },
            secret_name: Some(secret.clone()),
        }]
    });

    let metadata = ObjectMetaBuilder::new()
        .name(name)
        .namespace(namespace)
        .with_labels(labels.into_iter())
        .build();

    let ingress = Ingress {
        metadata,
        spec: Some(IngressSpec {
            rules: if rules.is_empty() { None } else { Some(rules) },
            tls,
            ..Default::default()
        }),
        ..Default::default()
    };

    arena.get_mut(id).built = Some(ObjectKind::Ingress(ingress));
    Ok(())
}
