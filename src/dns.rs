//! The `DnsProvisioner` trait boundary (spec §1 Out-of-scope: "DNS
//! provisioning and certificate acquisition"; §4.3 Ingress: "If a DNS
//! provisioner is configured, append a DNS task depending on the apply
//! task"; §9 Open Question: "`DnsProvisioner::create` in one branch throws
//! after returning the provisioner; the intended control flow is
//! ambiguous").
//!
//! The core only needs to know *that* a DNS record can be requested for an
//! Ingress host and *whether* that request succeeded; the concrete
//! provisioner (a cloud DNS API, an internal registrar) is exactly the kind
//! of cluster-specific integration spec §1 places out of scope. This
//! mirrors [`crate::storage::StorageBackend`]'s shape: a small trait plus a
//! couple of concrete, easily swapped implementations.

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to provision DNS record for host {host:?}"))]
    Provision {
        host: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A request to point `host` at `target` (spec §4.3 Ingress: the backend
/// targets the parent Service; the DNS record is expected to resolve to
/// wherever that Service is externally reachable).
pub struct DnsRequest<'a> {
    pub host: &'a str,
    pub target: &'a str,
}

/// Provisions a DNS record for an Ingress host (spec §4.3, §4.5 "Ingress
/// with DNS expands to an apply task + a DNS-provision task depending on
/// it"). Resolved Open Question (spec §9): unlike the ambiguous branch in
/// the source, `create` here returns before any further use of the
/// provisioner — the caller (the DNS task's executor in
/// [`crate::orchestrator`]) owns the `&dyn DnsProvisioner` for the whole
/// run and never re-enters `create` reentrantly.
#[async_trait]
pub trait DnsProvisioner: Send + Sync {
    async fn create(&self, request: &DnsRequest<'_>) -> Result<()>;
}

/// No DNS provisioner configured: the Ingress's DNS task is never built in
/// this case (spec §4.3, §4.5 guard on `dns.enabled`), so this only exists
/// to give `PrepareContext::dns_provisioner` a `None` to default to.
pub struct NoopProvisioner;

#[async_trait]
impl DnsProvisioner for NoopProvisioner {
    async fn create(&self, _request: &DnsRequest<'_>) -> Result<()> {
        Ok(())
    }
}

/// Logs the record it would create instead of calling out to a real
/// registrar. Useful for `--dry-run`-style invocations and for the test
/// suite.
pub struct LoggingProvisioner;

#[async_trait]
impl DnsProvisioner for LoggingProvisioner {
    async fn create(&self, request: &DnsRequest<'_>) -> Result<()> {
        tracing::info!(host = request.host, target = request.target, "would provision DNS record");
        Ok(())
    }
}

/// Provisions a record via a simple HTTP webhook (`POST {endpoint}` with a
/// `{host, target}` JSON body), the shape most small internal DNS
/// registrars expose. Errors from the webhook surface as [`Error::Provision`].
pub struct WebhookProvisioner {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookProvisioner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DnsProvisioner for WebhookProvisioner {
    async fn create(&self, request: &DnsRequest<'_>) -> Result<()> {
        let body = serde_json::json!({ "host": request.host, "target": request.target });
        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            .context(ProvisionSnafu {
                host: request.host.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_provisioner_always_succeeds() {
        let provisioner = LoggingProvisioner;
        let request = DnsRequest {
            host: "example.test",
            target: "203.0.113.10",
        };
        assert!(provisioner.create(&request).await.is_ok());
    }
}
