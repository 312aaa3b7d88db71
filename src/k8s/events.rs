//! Event-watch streaming (spec §4.6 "Event watch"): a long-running watch
//! against the Events collection, filtered by (kind, name prefix,
//! namespace) and used to wake [`crate::orchestrator`] early instead of
//! waiting out the full probe-poll interval.

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Event;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};

/// One event, reduced to the fields the orchestrator filters on (spec §4.6:
/// "for example, `involvedObject.kind=Pod` with name prefix equal to the
/// component and reason `Created`").
#[derive(Clone, Debug)]
pub struct MatchedEvent {
    pub involved_kind: String,
    pub involved_name: String,
    pub namespace: String,
    pub reason: String,
}

/// Whether `event` concerns an object of `involved_kind` (e.g. `"Pod"`,
/// not the owning component's own kind) whose name starts with
/// `name_prefix` inside `namespace`.
pub fn matches(event: &MatchedEvent, involved_kind: &str, name_prefix: &str, namespace: &str) -> bool {
    event.involved_kind == involved_kind && event.involved_name.starts_with(name_prefix) && event.namespace == namespace
}

/// Streams every Event in `namespace`, reduced to [`MatchedEvent`]. This is
/// long-running by design (spec §5 "Long-running streams ... use an
/// effectively unbounded receive timeout") — the caller holds it alongside
/// the rest of the cluster's event loop and never awaits it to completion.
pub fn watch(client: Client, namespace: &str) -> impl Stream<Item = MatchedEvent> {
    let api: Api<Event> = Api::namespaced(client, namespace);
    watcher(api, watcher::Config::default())
        .applied_objects()
        .filter_map(|result| async move { result.ok() })
        .filter_map(|event| async move {
            let involved = event.involved_object;
            Some(MatchedEvent {
                involved_kind: involved.kind.unwrap_or_default(),
                involved_name: involved.name.unwrap_or_default(),
                namespace: event.metadata.namespace.unwrap_or_default(),
                reason: event.reason.unwrap_or_default(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str, name: &str, namespace: &str) -> MatchedEvent {
        MatchedEvent {
            involved_kind: kind.to_string(),
            involved_name: name.to_string(),
            namespace: namespace.to_string(),
            reason: "Created".to_string(),
        }
    }

    #[test]
    fn matches_by_kind_name_prefix_and_namespace() {
        let ev = event("Pod", "web-7c9f6-abcde", "default");
        assert!(matches(&ev, "Pod", "web", "default"));
    }

    #[test]
    fn rejects_wrong_namespace() {
        let ev = event("Pod", "web-7c9f6-abcde", "other");
        assert!(!matches(&ev, "Pod", "web", "default"));
    }

    #[test]
    fn rejects_non_matching_prefix() {
        let ev = event("Pod", "api-7c9f6-abcde", "default");
        assert!(!matches(&ev, "Pod", "web", "default"));
    }
}
