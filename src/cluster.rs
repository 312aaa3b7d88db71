//! A single cluster (spec §3 "Cluster", §4.7): a name, server URL, the
//! root component tree, a shared async I/O runtime, a variable mapping and
//! the four startup barriers the coordinator and the dependency resolver
//! synchronise on.

use std::collections::BTreeMap;

use tokio::sync::{broadcast, watch};

use crate::component::{ComponentArena, ComponentId, State};
use crate::definition::Variables;
use crate::k8s::Adapter;
use crate::task::TaskArena;

/// How many in-flight state transitions a cross-cluster subscriber may lag
/// behind before missing one (spec §4.7 "State listeners"). Generous for a
/// tool whose whole tree is a few hundred components at most; a lagged
/// subscriber just misses intermediate states; the final DONE/FAILED is
/// what dependants actually wait on and is always the last one sent.
const STATE_CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// A one-shot signal (spec §4.7 "Cluster barrier"): fires exactly once,
/// and every waiter — however many arrive before or after the fire —
/// observes it. Built on [`watch`] rather than a condvar so `wait()` is an
/// `.await`, not a real OS-level block (spec §5: "the blocking
/// `barrier.wait()` ... is the sole place a runtime may block rather than
/// yield" refers to the *caller's* narrow startup step, not this signal
/// itself, which never blocks a runtime thread).
#[derive(Clone)]
pub struct Barrier {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Barrier {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Signals every current and future waiter. Idempotent.
    pub fn fire(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`Barrier::fire`] has been called (immediately, if it
    /// already has been).
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                // Sender dropped without ever firing — treat as fired so a
                // waiter can't hang forever on a gone cluster.
                return;
            }
        }
    }
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

/// The four startup stages every cluster signals in order (spec §4.7).
#[derive(Clone, Default)]
pub struct Barriers {
    pub vars_ready: Barrier,
    pub definitions_ready: Barrier,
    pub basic_components_ready: Barrier,
    pub prepared_ready: Barrier,
}

/// One target cluster of the deployment (spec §3 "Cluster").
pub struct Cluster {
    pub index: usize,
    pub name: String,
    pub server_url: String,
    pub adapter: Adapter,
    pub default_namespace: String,
    pub variables: Variables,
    pub barriers: Barriers,
    pub components: ComponentArena,
    pub tasks: TaskArena,

    /// Broadcasts every component state transition this cluster's
    /// orchestrator makes (spec §4.7 "State listeners"). Peer clusters
    /// subscribe to mirror a `clusterN:name` dependency's state; nothing
    /// in this cluster's own run loop ever subscribes to its own channel.
    pub state_changes: broadcast::Sender<(ComponentId, State)>,
}

impl Cluster {
    pub fn new(index: usize, name: impl Into<String>, server_url: impl Into<String>, adapter: Adapter, default_namespace: impl Into<String>) -> Self {
        let (state_changes, _) = broadcast::channel(STATE_CHANGE_CHANNEL_CAPACITY);
        Self {
            index,
            name: name.into(),
            server_url: server_url.into(),
            adapter,
            default_namespace: default_namespace.into(),
            variables: BTreeMap::new(),
            barriers: Barriers::default(),
            components: ComponentArena::new(),
            tasks: TaskArena::new(),
            state_changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn barrier_wait_resolves_after_fire() {
        let barrier = Barrier::new();
        let waiter = barrier.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        barrier.fire();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn barrier_wait_resolves_immediately_if_already_fired() {
        let barrier = Barrier::new();
        barrier.fire();
        barrier.wait().await;
    }
}
