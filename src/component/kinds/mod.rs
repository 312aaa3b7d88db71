//! Kind-specific `prepareDeploy` behaviour (spec §4.3). Each submodule
//! implements one branch of the dispatch in [`super::behaviour`].

pub mod configmap;
pub mod http_request;
pub mod ingress;
pub mod namespace;
pub mod persistent_volume;
pub mod pod_bearing;
pub mod rbac;
pub mod secret;
pub mod service;

/// Splits a whitespace-separated argument value into tokens, the grammar
/// used throughout §4.3 for `pod.args`, `port`, and similar multi-valued
/// arguments. Consecutive whitespace collapses; surrounding whitespace is
/// trimmed.
pub(crate) fn split_whitespace(value: &str) -> Vec<String> {
    value.split_whitespace().map(String::from).collect()
}

/// Parses a single `key=value` pair, used by the `pod.env` and `port`
/// sub-grammars.
pub(crate) fn split_kv(pair: &str) -> Option<(&str, &str)> {
    pair.split_once('=')
}
