//! HttpRequest preparation (spec §4.3): parses `target` plus `json`/`auth`/
//! `retry.*` arguments eagerly, so a malformed target fails before any
//! cluster starts executing (spec §7 "Configuration error ... Fatal before
//! execution"). The parsed [`HttpRequestSpec`] is re-derived by the
//! orchestrator's task executor from the same `effectiveArgs`, since
//! [`crate::k8s::ObjectKind`] has no slot for a non-Kubernetes action.

use snafu::{OptionExt, Snafu};

use crate::component::{ComponentArena, ComponentId};

use super::split_kv;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("no 'target' argument specified"))]
    MissingTarget,
    #[snafu(display(
        "invalid target {target:?}: must be '<METHOD> <url>' with METHOD one of GET/POST/PUT/PATCH/DELETE/OPTIONS/HEAD"
    ))]
    InvalidTarget { target: String },
}

/// HTTP verbs accepted by the `target` argument's method token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl Method {
    fn parse(raw: &str) -> Option<Method> {
        Some(match raw {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "HEAD" => Method::Head,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct HttpRequestSpec {
    pub method: Method,
    pub url: String,
    pub json: Option<String>,
    pub user: Option<String>,
    pub passwd: Option<String>,
    pub retry_count: u32,
    pub retry_delay_seconds: u64,
}

/// Parses `target` (`<METHOD> <url>`) and the remaining HttpRequest
/// arguments from a component's effective arguments.
pub fn parse(args: &indexmap::IndexMap<String, String>) -> Result<HttpRequestSpec> {
    let target = args.get("target").context(MissingTargetSnafu)?;
    let (method_token, url) = target.split_once(' ').context(InvalidTargetSnafu { target: target.clone() })?;
    let method = Method::parse(method_token).context(InvalidTargetSnafu { target: target.clone() })?;

    let json = args.get("json").cloned().filter(|v| !v.is_empty());

    let (mut user, mut passwd) = (None, None);
    if let Some(auth) = args.get("auth") {
        for pair in auth.split_whitespace() {
            if let Some((k, v)) = split_kv(pair) {
                match k {
                    "user" => user = Some(v.to_string()),
                    "passwd" => passwd = Some(v.to_string()),
                    _ => {}
                }
            }
        }
    }

    let retry_count = args.get("retry.count").and_then(|v| v.parse().ok()).unwrap_or(0);
    let retry_delay_seconds = args.get("retry.delay.seconds").and_then(|v| v.parse().ok()).unwrap_or(5);

    Ok(HttpRequestSpec {
        method,
        url: url.to_string(),
        json,
        user,
        passwd,
        retry_count,
        retry_delay_seconds,
    })
}

/// Validates the component's HttpRequest arguments eagerly; the parsed
/// result itself is recomputed at task-execution time.
pub fn prepare(arena: &mut ComponentArena, id: ComponentId) -> Result<()> {
    let args = arena.get(id).effective_args.clone();
    parse(&args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn args(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_minimal_get_target() {
        let spec = parse(&args(&[("target", "GET http://example.test/health")])).unwrap();
        assert_eq!(spec.method, Method::Get);
        assert_eq!(spec.url, "http://example.test/health");
        assert_eq!(spec.retry_count, 0);
        assert_eq!(spec.retry_delay_seconds, 5);
    }

    #[test]
    fn parses_auth_and_retry() {
        let spec = parse(&args(&[
            ("target", "POST http://example.test/hook"),
            ("auth", "user=alice passwd=hunter2"),
            ("retry.count", "3"),
            ("retry.delay.seconds", "10"),
            ("json", "{\"ok\":true}"),
        ]))
        .unwrap();
        assert_eq!(spec.method, Method::Post);
        assert_eq!(spec.user.as_deref(), Some("alice"));
        assert_eq!(spec.passwd.as_deref(), Some("hunter2"));
        assert_eq!(spec.retry_count, 3);
        assert_eq!(spec.retry_delay_seconds, 10);
        assert_eq!(spec.json.as_deref(), Some("{\"ok\":true}"));
    }

    #[test]
    fn rejects_missing_target() {
        assert!(matches!(parse(&args(&[])), Err(Error::MissingTarget)));
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(matches!(
            parse(&args(&[("target", "FETCH http://example.test")])),
            Err(Error::InvalidTarget { .. })
        ));
    }
}
