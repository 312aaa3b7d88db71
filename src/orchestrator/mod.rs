//! The per-cluster orchestrator (spec §4.6): drives the component and task
//! state machines to completion. Scheduling model (spec §4.6, §5): "every
//! callback — HTTP result, watch event, timer, state change — is posted
//! onto the cluster's I/O runtime, so all state mutations within a cluster
//! are serialised". [`Orchestrator::run`] models this as a single
//! reactive loop owning the cluster's arenas exclusively; individual task
//! effects and component timers run as spawned futures that report back
//! over a channel rather than ever touching the arenas themselves, so no
//! lock is needed (Design Notes: "no locks required for intra-cluster
//! state").

pub mod execute;
pub mod probe;
pub mod sequencer;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use snafu::Snafu;
use tokio::sync::mpsc;

use crate::cluster::Cluster;
use crate::component::{ComponentArena, ComponentId, State as ComponentState};
use crate::dns::DnsProvisioner;
use crate::task::{State as TaskState, TaskArena, TaskId};

use self::execute::ExecSpec;
use self::probe::ProbeArgs;
use self::sequencer::Sequencer;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("event watch failed"))]
    EventWatch { source: crate::k8s::Error },
}

/// How a cluster run finished (spec §6 "Exit: zero on all clusters
/// reaching DONE; non-zero if any reaches FAILED").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    AllDone,
    SomeFailed,
}

/// Periodic fallback re-evaluation, covering state changes that don't
/// arrive as a channel event — chiefly a cross-cluster dependency's mirrored
/// `remote_state` being written directly by the coordinator (spec §4.7:
/// "the subscriber always reposts the work onto its own cluster's runtime
/// before mutating state"; here that repost is simply "wait for the next
/// tick" rather than an explicit wakeup).
const RECHECK_INTERVAL: StdDuration = StdDuration::from_millis(200);

#[derive(Clone, Copy, Debug)]
enum TimerPhase {
    Pre,
    Post,
}

enum Event {
    TaskFinished(TaskId, execute::Outcome),
    ComponentTimerFired(ComponentId, TimerPhase),
}

/// A mirrored update for one component's `clusterDependsOn` entry, posted
/// by the coordinator's cross-cluster subscription forwarder (spec §4.7:
/// "the subscriber always reposts the work onto its own cluster's runtime
/// before mutating state" — this is that repost, delivered into the same
/// event loop every other state mutation for this cluster goes through).
pub struct RemoteDependencyUpdate {
    pub local_component: ComponentId,
    pub cluster_index: usize,
    pub remote_name: String,
    pub state: ComponentState,
}

/// Owns the collaborators shared by every task/timer this cluster's run
/// spawns: the HTTP client for HttpRequest tasks, and the cross-cluster
/// `delay.sequence` gate (spec §5 "Shared resources: the per-name sequencer
/// ... is shared across all clusters").
pub struct Orchestrator {
    sequencer: Arc<Sequencer>,
    http_client: reqwest::Client,
    dns_provisioner: Option<Arc<dyn DnsProvisioner>>,
}

impl Orchestrator {
    pub fn new(sequencer: Arc<Sequencer>, dns_provisioner: Option<Arc<dyn DnsProvisioner>>) -> Self {
        Self {
            sequencer,
            http_client: reqwest::Client::new(),
            dns_provisioner,
        }
    }

    /// Drives `cluster` to completion: runs `runTasks` (spec §4.6) until
    /// every component is `DONE` or `FAILED`. `remote_updates` carries
    /// mirrored cross-cluster dependency states wired up by
    /// [`crate::coordinator::Coordinator::scan_dependencies`]; this loop is
    /// the only place that ever writes `cluster_depends_on[..].remote_state`
    /// (spec §5: "no component or task field is concurrently mutated from
    /// two runtimes").
    pub async fn run(&self, cluster: &mut Cluster, mut remote_updates: mpsc::UnboundedReceiver<RemoteDependencyUpdate>) -> Result<Outcome> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut executing: HashSet<TaskId> = HashSet::new();
        let mut pending_timers: HashSet<ComponentId> = HashSet::new();

        loop {
            let mut changed = true;
            while changed {
                changed = false;
                let before: Vec<ComponentState> = cluster.components.iter().map(|c| c.state).collect();
                changed |= advance_components(&mut cluster.components, &cluster.tasks, &mut pending_timers, &self.sequencer, &tx);
                changed |= advance_tasks(&mut cluster.tasks, &cluster.components);
                for (i, prev) in before.iter().enumerate() {
                    let id = ComponentId(i as u32);
                    let now = cluster.components.get(id).state;
                    if now != *prev {
                        let _ = cluster.state_changes.send((id, now));
                    }
                }
            }

            let ready: Vec<TaskId> = cluster
                .tasks
                .iter()
                .filter(|t| t.state == TaskState::Ready)
                .map(|t| t.id)
                .collect();

            for id in ready {
                if !executing.insert(id) {
                    continue;
                }
                cluster.tasks.get_mut(id).state = TaskState::Executing;
                let spec = build_exec_spec(&cluster.components, &cluster.tasks, id);
                let adapter = cluster.adapter.clone();
                let dns = self.dns_provisioner.clone();
                let http = self.http_client.clone();
                let txc = tx.clone();
                tokio::spawn(async move {
                    let outcome = execute::execute(&adapter, dns.as_deref(), &http, spec).await;
                    let _ = txc.send(Event::TaskFinished(id, outcome));
                });
            }

            if executing.is_empty() && pending_timers.is_empty() && is_settled(&cluster.components) {
                break;
            }

            tokio::select! {
                event = rx.recv() => match event {
                    Some(Event::TaskFinished(id, outcome)) => {
                        executing.remove(&id);
                        apply_task_outcome(&mut cluster.tasks, id, outcome);
                    }
                    Some(Event::ComponentTimerFired(id, phase)) => {
                        pending_timers.remove(&id);
                        apply_timer_fired(&mut cluster.components, id, phase);
                    }
                    None => break,
                },
                Some(update) = remote_updates.recv() => {
                    apply_remote_update(&mut cluster.components, update);
                }
                _ = tokio::time::sleep(RECHECK_INTERVAL) => {}
            }
        }

        Ok(if cluster.components.iter().any(|c| c.state == ComponentState::Failed) {
            Outcome::SomeFailed
        } else {
            Outcome::AllDone
        })
    }
}

fn is_settled(components: &ComponentArena) -> bool {
    components.iter().all(|c| c.state.is_terminal())
}

fn apply_task_outcome(tasks: &mut TaskArena, id: TaskId, outcome: execute::Outcome) {
    let task = tasks.get_mut(id);
    match outcome {
        execute::Outcome::Done => task.state = TaskState::Done,
        execute::Outcome::Failed(reason) => {
            tracing::error!(task = %task.name, %reason, "task failed");
            task.state = TaskState::Failed;
        }
    }
}

/// Writes a mirrored remote state into the matching `cluster_depends_on`
/// entry (spec §4.4 step 2, §4.7). A component may depend on more than one
/// remote name, so the update is matched by `(cluster_index, remote_name)`
/// rather than assumed to be the only entry.
fn apply_remote_update(components: &mut ComponentArena, update: RemoteDependencyUpdate) {
    let component = components.get_mut(update.local_component);
    if let Some(dep) = component
        .cluster_depends_on
        .iter_mut()
        .find(|d| d.cluster_index == update.cluster_index && d.name == update.remote_name)
    {
        dep.remote_state = Some(update.state);
    }
}

fn apply_timer_fired(components: &mut ComponentArena, id: ComponentId, phase: TimerPhase) {
    let component = components.get_mut(id);
    let target = match phase {
        TimerPhase::Pre => ComponentState::Running,
        TimerPhase::Post => ComponentState::Done,
    };
    if component.state.can_transition_to(target) {
        component.state = target;
    }
}

fn build_exec_spec(components: &ComponentArena, tasks: &TaskArena, id: TaskId) -> ExecSpec {
    let task = tasks.get(id);
    let component = components.get(task.component);

    let probe_args = ProbeArgs {
        expected_replicas: component.effective_args.get("replicas").and_then(|v| v.parse().ok()).unwrap_or(0),
        require_load_balancer_ip: component
            .effective_args
            .get("ingress.useLoadBalancerIp")
            .map(|v| v == "true")
            .unwrap_or(false),
    };

    ExecSpec {
        namespace: component.effective_args.get("namespace").cloned().unwrap_or_default(),
        kind: component.kind,
        name: component.name.clone(),
        mode: task.mode,
        action: task.action.clone(),
        object: component.built.clone(),
        dont_fail_if_already_exists: task.dont_fail_if_already_exists,
        start_probe_after_apply: task.start_probe_after_apply,
        probe_args,
        effective_args: component.effective_args.clone(),
    }
}

/// Re-evaluates every task (spec §4.6 step 2). A task leaves `BLOCKED` for
/// `READY` only once every dependency task is `DONE` *and* its owning
/// component has entered `RUNNING`/`POST_TIMER` — the latter is how a
/// component's own `dependsOn`/`clusterDependsOn` gating (encoded entirely
/// at the component level, see [`advance_components`]) reaches down to the
/// tasks that belong to it.
fn advance_tasks(tasks: &mut TaskArena, components: &ComponentArena) -> bool {
    let mut changed = false;
    for id in tasks.ids() {
        changed |= advance_one_task(tasks, components, id);
    }
    changed
}

fn advance_one_task(tasks: &mut TaskArena, components: &ComponentArena, id: TaskId) -> bool {
    let state = tasks.get(id).state;
    match state {
        TaskState::Pre => {
            tasks.get_mut(id).state = TaskState::Blocked;
            true
        }
        TaskState::Blocked => {
            let deps = tasks.get(id).dependencies.clone();
            if deps.iter().any(|d| tasks.get(*d).state.is_failure()) {
                tasks.get_mut(id).state = TaskState::DependencyFailed;
                return true;
            }
            if !deps.iter().all(|d| tasks.get(*d).state == TaskState::Done) {
                return false;
            }
            let component = tasks.get(id).component;
            if matches!(components.get(component).state, ComponentState::Running | ComponentState::PostTimer) {
                tasks.get_mut(id).state = TaskState::Ready;
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

/// Re-evaluates every component (spec §4.6 step 1). Failure escalation is
/// checked before the state-specific transition so a child or dependency
/// that failed while this component was still `BLOCKED` still propagates
/// (spec §7 "any task failure in a component flips it to FAILED and
/// propagates to the parent").
fn advance_components(
    components: &mut ComponentArena,
    tasks: &TaskArena,
    pending_timers: &mut HashSet<ComponentId>,
    sequencer: &Arc<Sequencer>,
    tx: &mpsc::UnboundedSender<Event>,
) -> bool {
    let mut changed = false;
    let ids: Vec<ComponentId> = components.ids().collect();
    for id in ids {
        changed |= advance_one_component(components, tasks, pending_timers, sequencer, tx, id);
    }
    changed
}

fn advance_one_component(
    components: &mut ComponentArena,
    tasks: &TaskArena,
    pending_timers: &mut HashSet<ComponentId>,
    sequencer: &Arc<Sequencer>,
    tx: &mpsc::UnboundedSender<Event>,
    id: ComponentId,
) -> bool {
    let current = components.get(id).state;
    if current.is_terminal() {
        return false;
    }

    if has_failed_task(tasks, id) || has_failed_child(components, id) || has_failed_dependency(components, id) {
        components.get_mut(id).state = ComponentState::Failed;
        return true;
    }

    match current {
        ComponentState::Pre => {
            components.get_mut(id).state = ComponentState::Creating;
            true
        }
        ComponentState::Creating => {
            components.get_mut(id).state = ComponentState::Blocked;
            true
        }
        ComponentState::Blocked => {
            if !dependencies_satisfied(components, id) {
                return false;
            }
            let component = components.get(id);
            let delays = component.delays.clone();
            let name = component.name.clone();
            if delays.before.is_some() || delays.sequence.is_some() {
                components.get_mut(id).state = ComponentState::PreTimer;
                if pending_timers.insert(id) {
                    spawn_timer(id, name, delays, TimerPhase::Pre, sequencer.clone(), tx.clone());
                }
            } else {
                components.get_mut(id).state = ComponentState::Running;
            }
            true
        }
        ComponentState::PreTimer => false,
        ComponentState::Running => {
            if !(all_tasks_done(tasks, id) && all_children_done(components, id)) {
                return false;
            }
            let delays = components.get(id).delays.clone();
            if let Some(after) = delays.after {
                components.get_mut(id).state = ComponentState::PostTimer;
                if pending_timers.insert(id) {
                    let mut after_only = crate::component::Delays::default();
                    after_only.after = Some(after);
                    spawn_timer(id, String::new(), after_only, TimerPhase::Post, sequencer.clone(), tx.clone());
                }
            } else {
                components.get_mut(id).state = ComponentState::Done;
            }
            true
        }
        ComponentState::PostTimer => false,
        ComponentState::Done | ComponentState::Failed => false,
    }
}

fn has_failed_task(tasks: &TaskArena, component: ComponentId) -> bool {
    tasks.for_component(component).any(|t| t.state.is_failure())
}

fn has_failed_child(components: &ComponentArena, id: ComponentId) -> bool {
    components.get(id).children.iter().any(|&c| components.get(c).state == ComponentState::Failed)
}

fn has_failed_dependency(components: &ComponentArena, id: ComponentId) -> bool {
    components.get(id).depends_on.iter().any(|&d| components.get(d).state == ComponentState::Failed)
}

fn dependencies_satisfied(components: &ComponentArena, id: ComponentId) -> bool {
    let component = components.get(id);
    let local = component.depends_on.iter().all(|&d| components.get(d).state == ComponentState::Done);
    let cross = component
        .cluster_depends_on
        .iter()
        .all(|dep| dep.remote_state == Some(ComponentState::Done));
    local && cross
}

fn all_tasks_done(tasks: &TaskArena, component: ComponentId) -> bool {
    tasks.for_component(component).all(|t| t.state == TaskState::Done)
}

fn all_children_done(components: &ComponentArena, id: ComponentId) -> bool {
    components.get(id).children.iter().all(|&c| components.get(c).state == ComponentState::Done)
}

/// Runs one component's `PRE_TIMER`/`POST_TIMER` gate (spec §4.6 "Timer
/// states"): `delay.sequence` acquires the process-wide per-name slot for
/// the sleep's duration before `delay.before` (or, for the post-phase,
/// `delay.after`) runs, then reports completion back to the owning cluster.
fn spawn_timer(
    id: ComponentId,
    name: String,
    delays: crate::component::Delays,
    phase: TimerPhase,
    sequencer: Arc<Sequencer>,
    tx: mpsc::UnboundedSender<Event>,
) {
    tokio::spawn(async move {
        match phase {
            TimerPhase::Pre => {
                if let Some(duration) = delays.sequence {
                    let ticket = sequencer.acquire(&name).await;
                    tokio::time::sleep(duration.as_std()).await;
                    ticket.release();
                }
                if let Some(duration) = delays.before {
                    tokio::time::sleep(duration.as_std()).await;
                }
            }
            TimerPhase::Post => {
                if let Some(duration) = delays.after {
                    tokio::time::sleep(duration.as_std()).await;
                }
            }
        }
        let _ = tx.send(Event::ComponentTimerFired(id, phase));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Delays, State};
    use crate::definition::ParentRelation;
    use crate::task::{Action, Mode, Task};
    use indexmap::IndexMap;

    fn bare_component(id: ComponentId, parent: Option<ComponentId>) -> Component {
        Component {
            id,
            parent,
            children: Vec::new(),
            name: format!("c{}", id.0),
            kind: crate::component::Kind::Deployment,
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

    #[tokio::test]
    async fn component_without_delays_walks_straight_to_running() {
        let mut components = ComponentArena::new();
        let id = components.insert(|id| bare_component(id, None));
        let tasks = TaskArena::new();
        let sequencer = Arc::new(Sequencer::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pending = HashSet::new();

        // Pre -> Creating -> Blocked -> Running, one transition per call.
        for _ in 0..3 {
            assert!(advance_one_component(&mut components, &tasks, &mut pending, &sequencer, &tx, id));
        }
        assert_eq!(components.get(id).state, State::Running);
    }

    #[tokio::test]
    async fn component_waits_in_blocked_until_dependency_done() {
        let mut components = ComponentArena::new();
        let dep = components.insert(|id| bare_component(id, None));
        let dependent = components.insert(|id| {
            let mut c = bare_component(id, None);
            c.depends_on.push(dep);
            c
        });
        let tasks = TaskArena::new();
        let sequencer = Arc::new(Sequencer::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pending = HashSet::new();

        for _ in 0..2 {
            advance_one_component(&mut components, &tasks, &mut pending, &sequencer, &tx, dependent);
        }
        assert_eq!(components.get(dependent).state, State::Blocked);
        assert!(!advance_one_component(&mut components, &tasks, &mut pending, &sequencer, &tx, dependent));

        components.get_mut(dep).state = State::Done;
        assert!(advance_one_component(&mut components, &tasks, &mut pending, &sequencer, &tx, dependent));
        assert_eq!(components.get(dependent).state, State::Running);
    }

    #[tokio::test]
    async fn failed_task_escalates_owning_component_to_failed() {
        let mut components = ComponentArena::new();
        let id = components.insert(|cid| {
            let mut c = bare_component(cid, None);
            c.state = State::Running;
            c
        });
        let mut tasks = TaskArena::new();
        tasks.insert(|tid| {
            let mut t = Task::new(tid, id, "t", Mode::Create, Action::Apply);
            t.state = crate::task::State::Failed;
            t
        });
        let sequencer = Arc::new(Sequencer::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pending = HashSet::new();

        assert!(advance_one_component(&mut components, &tasks, &mut pending, &sequencer, &tx, id));
        assert_eq!(components.get(id).state, State::Failed);
    }

    #[tokio::test]
    async fn task_stays_blocked_until_owning_component_is_running() {
        let mut components = ComponentArena::new();
        let id = components.insert(|cid| bare_component(cid, None));
        let mut tasks = TaskArena::new();
        let task_id = tasks.insert(|tid| Task::new(tid, id, "t", Mode::Create, Action::Apply));
        tasks.get_mut(task_id).state = TaskState::Blocked;

        assert!(!advance_one_task(&mut tasks, &components, task_id));
        components.get_mut(id).state = State::Running;
        assert!(advance_one_task(&mut tasks, &components, task_id));
        assert_eq!(tasks.get(task_id).state, TaskState::Ready);
    }

    #[tokio::test]
    async fn task_with_failed_dependency_becomes_dependency_failed() {
        let mut components = ComponentArena::new();
        let id = components.insert(|cid| {
            let mut c = bare_component(cid, None);
            c.state = State::Running;
            c
        });
        let mut tasks = TaskArena::new();
        let upstream = tasks.insert(|tid| {
            let mut t = Task::new(tid, id, "up", Mode::Create, Action::Apply);
            t.state = crate::task::State::Failed;
            t
        });
        let downstream = tasks.insert(|tid| {
            let mut t = Task::new(tid, id, "down", Mode::Create, Action::Apply);
            t.state = TaskState::Blocked;
            t.dependencies.push(upstream);
            t
        });

        assert!(advance_one_task(&mut tasks, &components, downstream));
        assert_eq!(tasks.get(downstream).state, TaskState::DependencyFailed);
    }

    #[test]
    fn remote_update_fills_in_the_matching_dependency_by_name() {
        let mut components = ComponentArena::new();
        let id = components.insert(|cid| {
            let mut c = bare_component(cid, None);
            c.cluster_depends_on.push(crate::component::ClusterDependency {
                cluster_index: 1,
                name: "db".to_string(),
                remote_state: None,
            });
            c.cluster_depends_on.push(crate::component::ClusterDependency {
                cluster_index: 1,
                name: "cache".to_string(),
                remote_state: None,
            });
            c
        });

        apply_remote_update(
            &mut components,
            RemoteDependencyUpdate {
                local_component: id,
                cluster_index: 1,
                remote_name: "db".to_string(),
                state: State::Done,
            },
        );

        assert_eq!(components.get(id).cluster_depends_on[0].remote_state, Some(State::Done));
        assert_eq!(components.get(id).cluster_depends_on[1].remote_state, None);
    }
}
