//! The cross-cluster coordinator (spec §4.7): wires every cluster's four
//! startup barriers, resolves `clusterN:name` dependencies once the target
//! cluster's tree exists, and runs every cluster's orchestrator to
//! completion in parallel.
//!
//! "The root coordinator runs three phases sequentially: prepare across all
//! clusters (parallel), execute across all clusters (parallel), drain
//! pending work (log streaming). Each phase joins before the next begins.
//! Exceptions surface per cluster but do not abort peers in the current
//! phase." (spec §4.7) — modeled here as three `futures::future::join_all`
//! barriers, one per phase, with per-cluster [`Result`]s collected rather
//! than short-circuited.

use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tokio::sync::{mpsc, Mutex};

use crate::cluster::{Barriers, Cluster};
use crate::component::{behaviour, tree, ComponentArena, ComponentId};
use crate::definition::{variant::Filters, Definition};
use crate::dependency::{self, Resolved};
use crate::dns::DnsProvisioner;
use crate::orchestrator::{self, Orchestrator, Outcome, RemoteDependencyUpdate};
use crate::storage::StorageBackend;
use crate::task::{self, Mode};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("cluster {name:?}: failed to build the component tree"))]
    Tree { name: String, source: tree::Error },
    #[snafu(display("cluster {name:?}: failed to prepare implicit children"))]
    Prepare { name: String, source: behaviour::Error },
    #[snafu(display("cluster {name:?}: failed to resolve dependencies"))]
    Dependency { name: String, source: dependency::Error },
    #[snafu(display("cluster {name:?}: failed to build the task graph"))]
    TaskGraph { name: String, source: task::graph::Error },
    #[snafu(display("cluster {from_name:?}: cross-cluster reference to unknown cluster index {index}"))]
    UnknownCluster { from_name: String, index: usize },
    #[snafu(display("cluster {from_name:?}: cross-cluster reference to unknown component {target:?} in cluster{index}"))]
    UnknownRemoteComponent { from_name: String, index: usize, target: String },
    #[snafu(display("cross-cluster dependency cycle detected involving cluster {cluster_name:?} component {component:?}"))]
    CrossClusterCycle { cluster_name: String, component: String },
    #[snafu(display("cluster {name:?} orchestrator failed"))]
    Orchestrator { name: String, source: orchestrator::Error },
}

/// Everything one cluster needs to go from an already-expanded definition
/// tree to a running orchestrator (spec §6 "Definition file": "The core
/// consumes this as an already-expanded structure" — parsing, macro
/// expansion and variant-directive collection from the CLI all happen
/// upstream of this type).
pub struct ClusterPlan {
    pub cluster: Cluster,
    pub definition: Definition,
    pub filters: Filters,
    pub deployment_name: String,
    pub auto_manage_namespace: bool,
    pub storage_backend: Option<Box<dyn StorageBackend>>,
}

/// One cluster's outcome, folded into the coordinator's overall result.
pub struct ClusterOutcome {
    pub name: String,
    pub outcome: Outcome,
}

struct PreparedCluster {
    name: String,
    cluster: Arc<Mutex<Cluster>>,
    barriers: Barriers,
    deferred: Vec<(ComponentId, Resolved)>,
}

/// Drives every cluster in `plans` through prepare / execute / drain (spec
/// §4.7). `dns_provisioner` is shared by every cluster, matching the
/// sequencer's cross-cluster sharing in spec §5.
pub struct Coordinator {
    sequencer: Arc<orchestrator::sequencer::Sequencer>,
    dns_provisioner: Option<Arc<dyn DnsProvisioner>>,
}

impl Coordinator {
    pub fn new(dns_provisioner: Option<Arc<dyn DnsProvisioner>>) -> Self {
        Self {
            sequencer: Arc::new(orchestrator::sequencer::Sequencer::new()),
            dns_provisioner,
        }
    }

    pub async fn run(&self, plans: Vec<ClusterPlan>, mode: Mode) -> Result<Vec<ClusterOutcome>> {
        let names: Vec<String> = plans.iter().map(|p| p.cluster.name.clone()).collect();

        // Phase 1: prepare, in parallel. Every cluster builds its tree,
        // synthesises implicit children, resolves same-cluster
        // dependencies and builds its task graph, firing its four
        // barriers in order as it goes.
        let prepared_futures = plans.into_iter().map(|plan| self.prepare_one(plan, mode));
        let prepared_results: Vec<Result<PreparedCluster>> = futures::future::join_all(prepared_futures).await;
        let mut prepared = Vec::with_capacity(prepared_results.len());
        for result in prepared_results {
            prepared.push(result?);
        }

        // Cross-cluster wiring (spec §4.4 step 2, §4.7 "scanDependencies"):
        // every cluster's tree now exists, so `clusterN:name` references can
        // be resolved and subscribed to. One channel per cluster carries
        // mirrored remote states into that cluster's own orchestrator loop.
        let mut remote_txs = Vec::with_capacity(prepared.len());
        let mut remote_rxs = Vec::with_capacity(prepared.len());
        for _ in &prepared {
            let (tx, rx) = mpsc::unbounded_channel::<RemoteDependencyUpdate>();
            remote_txs.push(tx);
            remote_rxs.push(Some(rx));
        }

        self.scan_dependencies(&prepared, &remote_txs).await?;
        self.check_cross_cluster_cycles(&prepared).await?;

        // Phase 2: execute, in parallel.
        let mut execute_futures = Vec::with_capacity(prepared.len());
        for (index, cluster) in prepared.iter().enumerate() {
            let name = cluster.name.clone();
            let cluster_arc = cluster.cluster.clone();
            let rx = remote_rxs[index].take().expect("each cluster's receiver is taken exactly once");
            let orchestrator = Orchestrator::new(self.sequencer.clone(), self.dns_provisioner.clone());
            execute_futures.push(async move {
                let mut guard = cluster_arc.lock().await;
                orchestrator
                    .run(&mut guard, rx)
                    .await
                    .context(OrchestratorSnafu { name: name.clone() })
                    .map(|outcome| ClusterOutcome { name, outcome })
            });
        }
        let execute_results: Vec<Result<ClusterOutcome>> = futures::future::join_all(execute_futures).await;
        let mut outcomes = Vec::with_capacity(execute_results.len());
        for result in execute_results {
            outcomes.push(result?);
        }

        // Phase 3: drain. Container-log streaming and file sinks are out of
        // scope (spec §1); there is nothing left for the core to do once
        // every cluster has reached a terminal state, so this phase is a
        // join point only.
        tracing::debug!(clusters = names.len(), "drain phase complete");

        Ok(outcomes)
    }

    async fn prepare_one(&self, plan: ClusterPlan, mode: Mode) -> Result<PreparedCluster> {
        let ClusterPlan {
            mut cluster,
            mut definition,
            filters,
            deployment_name,
            auto_manage_namespace,
            storage_backend,
        } = plan;

        let name = cluster.name.clone();

        // varsReady / definitionsReady (spec §4.7): both stages are the
        // responsibility of the CLI bootstrap and the external macro
        // expander (spec §1 Out of scope); by the time a `ClusterPlan`
        // reaches the coordinator both have already happened, so these
        // barriers simply mark that fact for any dependency waiting on
        // them.
        cluster.barriers.vars_ready.fire();
        cluster.barriers.definitions_ready.fire();

        crate::definition::variant::select(&mut definition, &filters);

        let mut roots = tree::build_forest(&mut cluster.components, &definition).context(TreeSnafu { name: name.clone() })?;
        let namespace = cluster.default_namespace.clone();
        tree::init(
            &mut cluster.components,
            &mut roots,
            &deployment_name,
            &name,
            auto_manage_namespace,
            &namespace,
        );
        cluster.barriers.basic_components_ready.fire();

        {
            let ctx = behaviour::PrepareContext {
                default_namespace: &namespace,
                storage_backend: storage_backend.as_deref(),
                dns_provisioner: self.dns_provisioner.as_deref(),
            };
            behaviour::prepare_all(&mut cluster.components, &ctx).context(PrepareSnafu { name: name.clone() })?;
        }
        cluster.barriers.prepared_ready.fire();

        let deferred = dependency::resolve(&mut cluster.components, mode).context(DependencySnafu { name: name.clone() })?;

        task::graph::build(&cluster.components, &mut cluster.tasks, mode).context(TaskGraphSnafu { name: name.clone() })?;

        let barriers = cluster.barriers.clone();
        Ok(PreparedCluster {
            name,
            cluster: Arc::new(Mutex::new(cluster)),
            barriers,
            deferred,
        })
    }

    /// Resolves every deferred `clusterN:name` reference (spec §4.4 step 2):
    /// waits for the target's `basicComponentsReady` (already fired by the
    /// time prepare's `join_all` above returns, so this never actually
    /// blocks), looks up the remote component by name, registers the local
    /// `ClusterDependency` slot, and spawns a forwarder that mirrors the
    /// remote's state-change broadcast into the local cluster's own
    /// orchestrator loop (spec §4.7: "the subscriber always reposts the
    /// work onto its own cluster's runtime before mutating state").
    async fn scan_dependencies(&self, prepared: &[PreparedCluster], remote_txs: &[mpsc::UnboundedSender<RemoteDependencyUpdate>]) -> Result<()> {
        for (local_index, local) in prepared.iter().enumerate() {
            for (component_id, resolved) in &local.deferred {
                let Resolved::CrossCluster { cluster_index, name: remote_name } = resolved else {
                    continue;
                };
                let target = prepared.get(*cluster_index).ok_or_else(|| Error::UnknownCluster {
                    from_name: local.name.clone(),
                    index: *cluster_index,
                })?;

                target.barriers.basic_components_ready.wait().await;

                let (remote_id, mut state_rx) = {
                    let guard = target.cluster.lock().await;
                    let remote_id = guard.components.find_by_name(remote_name).ok_or_else(|| Error::UnknownRemoteComponent {
                        from_name: local.name.clone(),
                        index: *cluster_index,
                        target: remote_name.clone(),
                    })?;
                    (remote_id, guard.state_changes.subscribe())
                };

                {
                    let mut guard = local.cluster.lock().await;
                    dependency::register_cluster_dependency(&mut guard.components, *component_id, *cluster_index, remote_name.clone());
                }

                let local_tx = remote_txs[local_index].clone();
                let local_component = *component_id;
                let cluster_index = *cluster_index;
                let remote_name = remote_name.clone();
                tokio::spawn(async move {
                    while let Ok((id, state)) = state_rx.recv().await {
                        if id != remote_id {
                            continue;
                        }
                        let done = state.is_terminal();
                        let _ = local_tx.send(RemoteDependencyUpdate {
                            local_component,
                            cluster_index,
                            remote_name: remote_name.clone(),
                            state,
                        });
                        if done {
                            break;
                        }
                    }
                });
            }
        }
        Ok(())
    }

    /// Cycle detection across the cross-cluster dependency graph (spec §4.4
    /// step 4, testable property 7, scenario S4: "cycle detection across
    /// the two clusters is performed at startup"). Walks `dependsOn` edges
    /// within a cluster and `clusterDependsOn` edges across clusters as one
    /// combined graph keyed by `(cluster_index, ComponentId)`.
    async fn check_cross_cluster_cycles(&self, prepared: &[PreparedCluster]) -> Result<()> {
        let mut snapshots: Vec<ComponentArena> = Vec::with_capacity(prepared.len());
        for cluster in prepared {
            snapshots.push(cluster.cluster.lock().await.components.clone());
        }

        if let Some((cycle_cluster, cycle_component)) = detect_cross_cluster_cycle(&snapshots) {
            return Err(Error::CrossClusterCycle {
                cluster_name: prepared[cycle_cluster].name.clone(),
                component: snapshots[cycle_cluster].get(cycle_component).name.clone(),
            });
        }

        Ok(())
    }
}

/// Pure DFS over the combined graph of every cluster's `dependsOn` edges
/// plus `clusterDependsOn` edges crossing into another cluster's snapshot,
/// keyed by `(cluster_index, ComponentId)` (spec §4.4 step 4, testable
/// property 7, scenario S4). Returns the first node found still
/// `InProgress` when revisited.
fn detect_cross_cluster_cycle(snapshots: &[ComponentArena]) -> Option<(usize, ComponentId)> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: Vec<Vec<Mark>> = snapshots.iter().map(|arena| vec![Mark::Unvisited; arena.len()]).collect();

    fn visit(snapshots: &[ComponentArena], marks: &mut [Vec<Mark>], cluster_index: usize, id: ComponentId) -> Option<(usize, ComponentId)> {
        if marks[cluster_index][id.0 as usize] == Mark::Done {
            return None;
        }
        if marks[cluster_index][id.0 as usize] == Mark::InProgress {
            return Some((cluster_index, id));
        }
        marks[cluster_index][id.0 as usize] = Mark::InProgress;

        let component = snapshots[cluster_index].get(id);
        for &dep in &component.depends_on {
            if let Some(cycle) = visit(snapshots, marks, cluster_index, dep) {
                return Some(cycle);
            }
        }
        for dep in &component.cluster_depends_on {
            if dep.cluster_index >= snapshots.len() {
                continue;
            }
            if let Some(remote_id) = snapshots[dep.cluster_index].find_by_name(&dep.name) {
                if let Some(cycle) = visit(snapshots, marks, dep.cluster_index, remote_id) {
                    return Some(cycle);
                }
            }
        }

        marks[cluster_index][id.0 as usize] = Mark::Done;
        None
    }

    for cluster_index in 0..snapshots.len() {
        for id in snapshots[cluster_index].ids() {
            if let Some(cycle) = visit(snapshots, &mut marks, cluster_index, id) {
                return Some(cycle);
            }
        }
    }

    None
}

/// Whether every cluster reached `DONE` (spec §6 "Exit: zero on all
/// clusters reaching DONE; non-zero if any reaches FAILED").
pub fn all_done(outcomes: &[ClusterOutcome]) -> bool {
    outcomes.iter().all(|o| o.outcome == Outcome::AllDone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Delays, Kind, State};
    use crate::definition::ParentRelation;
    use indexmap::IndexMap;

    fn bare(id: ComponentId, name: &str) -> Component {
        Component {
            id,
            parent: None,
            children: Vec::new(),
            name: name.to_string(),
            kind: Kind::Deployment,
            variant: None,
            labels: IndexMap::new(),
            args: IndexMap::new(),
            default_args: IndexMap::new(),
            effective_args: IndexMap::new(),
            depends: Vec::new(),
            parent_relation: ParentRelation::Independent,
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
    fn cross_cluster_cycle_is_detected() {
        let mut arena0 = ComponentArena::new();
        arena0.insert(|id| {
            let mut c = bare(id, "a");
            c.cluster_depends_on.push(crate::component::ClusterDependency {
                cluster_index: 1,
                name: "b".to_string(),
                remote_state: None,
            });
            c
        });

        let mut arena1 = ComponentArena::new();
        arena1.insert(|id| {
            let mut c = bare(id, "b");
            c.cluster_depends_on.push(crate::component::ClusterDependency {
                cluster_index: 0,
                name: "a".to_string(),
                remote_state: None,
            });
            c
        });

        assert!(detect_cross_cluster_cycle(&[arena0, arena1]).is_some());
    }

    #[test]
    fn cross_cluster_dependency_without_a_cycle_is_accepted() {
        let mut arena0 = ComponentArena::new();
        arena0.insert(|id| {
            let mut c = bare(id, "api");
            c.cluster_depends_on.push(crate::component::ClusterDependency {
                cluster_index: 1,
                name: "db".to_string(),
                remote_state: None,
            });
            c
        });

        let mut arena1 = ComponentArena::new();
        arena1.insert(|id| bare(id, "db"));

        assert!(detect_cross_cluster_cycle(&[arena0, arena1]).is_none());
    }
}
