//! Task effect execution (spec §4.6 step 3: "invoke its effect (apply/patch/
//! delete via the K8s adapter, or an HTTP request, or a DNS operation)")
//! plus the readiness-probe poll loop a `startProbeAfterApply` task enters
//! afterwards (spec §4.6 "Readiness probing").

use std::time::Duration as StdDuration;

use indexmap::IndexMap;

use crate::component::Kind;
use crate::dns::{DnsProvisioner, DnsRequest};
use crate::component::kinds::http_request;
use crate::k8s::Adapter;
use crate::task::{Action, Mode};

use super::probe::{self, ProbeArgs, Verdict};

/// The fixed probe-poll interval (spec §4.6: "schedules a poll with a fixed
/// 2-second interval").
const PROBE_INTERVAL: StdDuration = StdDuration::from_secs(2);

/// Everything [`execute`] needs, snapshotted out of the component/task
/// arenas before the future starts running — it never borrows the arena,
/// so many of these can run concurrently via `join_all` (spec §4.6: "every
/// callback ... is posted onto the cluster's I/O runtime", modeled here as
/// independent futures the orchestrator loop awaits together).
#[derive(Clone)]
pub struct ExecSpec {
    pub namespace: String,
    pub kind: Kind,
    pub name: String,
    pub mode: Mode,
    pub action: Action,
    pub object: Option<crate::k8s::ObjectKind>,
    pub dont_fail_if_already_exists: bool,
    pub start_probe_after_apply: bool,
    pub probe_args: ProbeArgs,
    pub effective_args: IndexMap<String, String>,
}

/// The outcome of running one task's effect to completion (including any
/// probe polling), folded down to what the orchestrator loop needs to move
/// the task to its terminal state.
pub enum Outcome {
    Done,
    Failed(String),
}

pub async fn execute(adapter: &Adapter, dns: Option<&dyn DnsProvisioner>, http: &reqwest::Client, spec: ExecSpec) -> Outcome {
    match &spec.action {
        Action::Apply => {
            let Some(object) = spec.object.as_ref() else {
                return Outcome::Failed(format!("component {:?} has no built object to apply", spec.name));
            };
            match adapter.apply(&spec.namespace, object, spec.dont_fail_if_already_exists).await {
                Ok(()) => maybe_probe(adapter, &spec).await,
                Err(source) => Outcome::Failed(source.to_string()),
            }
        }
        Action::Delete => match adapter.delete(&spec.namespace, spec.kind, &spec.name).await {
            Ok(()) => Outcome::Done,
            Err(source) => Outcome::Failed(source.to_string()),
        },
        Action::ScaleStatefulSet { replicas } => {
            match adapter.scale_statefulset(&spec.namespace, &spec.name, *replicas).await {
                Ok(()) => maybe_probe(adapter, &spec).await,
                Err(source) => Outcome::Failed(source.to_string()),
            }
        }
        Action::DeletePvcsByLabel { label_selector } => {
            match adapter.delete_pvcs_by_label(&spec.namespace, label_selector).await {
                Ok(()) => Outcome::Done,
                Err(source) => Outcome::Failed(source.to_string()),
            }
        }
        Action::HttpRequest => execute_http_request(http, &spec).await,
        Action::DnsProvision => execute_dns_provision(dns, &spec).await,
    }
}

async fn maybe_probe(adapter: &Adapter, spec: &ExecSpec) -> Outcome {
    if !spec.start_probe_after_apply {
        return Outcome::Done;
    }

    loop {
        let object = match adapter.get(&spec.namespace, spec.kind, &spec.name).await {
            Ok(object) => object,
            Err(source) => return Outcome::Failed(source.to_string()),
        };

        match probe::evaluate(spec.kind, spec.mode, object.as_ref(), spec.probe_args) {
            Verdict::Done => return Outcome::Done,
            Verdict::Failed => return Outcome::Failed(format!("{} failed its readiness probe", spec.name)),
            Verdict::Pending => tokio::time::sleep(PROBE_INTERVAL).await,
        }
    }
}

/// Issues the HttpRequest component's configured call, retrying transient
/// failures up to `retry.count` times with `retry.delay.seconds` between
/// attempts (spec §7 "Transient HTTP error ... For HttpRequest tasks,
/// retry up to `retry.count` with `retry.delay.seconds`").
async fn execute_http_request(http: &reqwest::Client, spec: &ExecSpec) -> Outcome {
    let parsed = match http_request::parse(&spec.effective_args) {
        Ok(parsed) => parsed,
        Err(source) => return Outcome::Failed(source.to_string()),
    };

    let method = match parsed.method {
        http_request::Method::Get => reqwest::Method::GET,
        http_request::Method::Post => reqwest::Method::POST,
        http_request::Method::Put => reqwest::Method::PUT,
        http_request::Method::Patch => reqwest::Method::PATCH,
        http_request::Method::Delete => reqwest::Method::DELETE,
        http_request::Method::Options => reqwest::Method::OPTIONS,
        http_request::Method::Head => reqwest::Method::HEAD,
    };

    let mut attempt = 0;
    loop {
        let mut request = http.request(method.clone(), &parsed.url);
        if let Some(body) = &parsed.json {
            request = request.header("Content-Type", "application/json").body(body.clone());
        }
        if let Some(user) = &parsed.user {
            request = request.basic_auth(user, parsed.passwd.clone());
        }

        match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => return Outcome::Done,
            Err(source) if attempt < parsed.retry_count => {
                attempt += 1;
                tracing::warn!(url = %parsed.url, attempt, error = %source, "HttpRequest failed, retrying");
                tokio::time::sleep(StdDuration::from_secs(parsed.retry_delay_seconds)).await;
            }
            Err(source) => return Outcome::Failed(source.to_string()),
        }
    }
}

/// Provisions a DNS record for an Ingress host (spec §4.3, §4.5 scenario
/// S6). The host is the first `ingress.paths` host token (or `ingress.host`
/// if set explicitly); the target defaults to the component's own name,
/// standing in for wherever the paired Service is externally reachable.
async fn execute_dns_provision(dns: Option<&dyn DnsProvisioner>, spec: &ExecSpec) -> Outcome {
    let Some(dns) = dns else {
        return Outcome::Failed("dns.enabled is set but no DNS provisioner is configured".to_string());
    };

    let host = spec
        .effective_args
        .get("ingress.host")
        .cloned()
        .or_else(|| {
            spec.effective_args
                .get("ingress.paths")
                .and_then(|paths| paths.split_whitespace().next())
                .and_then(|entry| entry.split_once(':').map(|(host, _)| host.to_string()))
        })
        .unwrap_or_else(|| spec.name.clone());

    let target = spec.effective_args.get("dns.target").cloned().unwrap_or_else(|| spec.name.clone());

    match dns.create(&DnsRequest { host: &host, target: &target }).await {
        Ok(()) => Outcome::Done,
        Err(source) => Outcome::Failed(source.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::LoggingProvisioner;

    fn bare_spec(action: Action) -> ExecSpec {
        ExecSpec {
            namespace: "default".to_string(),
            kind: Kind::Ingress,
            name: "web-ingress".to_string(),
            mode: Mode::Create,
            action,
            object: None,
            dont_fail_if_already_exists: false,
            start_probe_after_apply: false,
            probe_args: ProbeArgs::default(),
            effective_args: IndexMap::new(),
        }
    }

    #[tokio::test]
    async fn dns_provision_without_any_provisioner_fails() {
        let spec = bare_spec(Action::DnsProvision);
        match execute_dns_provision(None, &spec).await {
            Outcome::Failed(_) => {}
            Outcome::Done => panic!("expected failure without a configured provisioner"),
        }
    }

    #[tokio::test]
    async fn dns_provision_derives_host_from_ingress_paths() {
        let mut spec = bare_spec(Action::DnsProvision);
        spec.effective_args.insert("ingress.paths".to_string(), "example.com:/app".to_string());
        let provisioner = LoggingProvisioner;
        match execute_dns_provision(Some(&provisioner), &spec).await {
            Outcome::Done => {}
            Outcome::Failed(e) => panic!("expected success, got {e}"),
        }
    }
}
