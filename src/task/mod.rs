//! The task graph (spec §3 "Task", §4.5): the unit of work attached to a
//! component. Mirrors [`crate::component::ComponentArena`]'s arena-of-index
//! design (Design Notes §9) rather than a pointer graph.

pub mod graph;

use serde::{Deserialize, Serialize};

use crate::component::ComponentId;

/// Index of a [`Task`] inside its cluster's [`TaskArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u32);

/// Task lifecycle state (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Pre,
    Blocked,
    Ready,
    Executing,
    Waiting,
    Done,
    Aborted,
    Failed,
    DependencyFailed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            State::Done | State::Aborted | State::Failed | State::DependencyFailed
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, State::Aborted | State::Failed | State::DependencyFailed)
    }
}

/// Whether a task applies (creates/patches) or tears down its object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Create,
    Remove,
}

/// What a [`Task`] actually does when it runs (spec §4.6 step 3: "apply /
/// patch / delete via the K8s adapter, or an HTTP request, or a DNS
/// operation").
#[derive(Clone, Debug)]
pub enum Action {
    /// POST (or, on 409 with `dont_fail_if_already_exists`, PATCH) the
    /// component's built object.
    Apply,
    /// DELETE the component's object by kind/name.
    Delete,
    /// Scale a StatefulSet to the given replica count and wait for the
    /// probe before continuing (spec §4.5, StatefulSet remove expansion).
    ScaleStatefulSet { replicas: i32 },
    /// Delete PersistentVolumeClaims matching a label selector (spec §4.5
    /// scenario S3).
    DeletePvcsByLabel { label_selector: String },
    /// Issue the HttpRequest component's configured HTTP call.
    HttpRequest,
    /// Provision a DNS record via the configured [`crate::dns::DnsProvisioner`].
    DnsProvision,
}

/// A unit of work driving one phase of one component (spec §3).
#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub component: ComponentId,
    pub name: String,
    pub state: State,
    pub dependencies: Vec<TaskId>,
    pub mode: Mode,
    pub action: Action,
    /// If set, on success the task moves to `Waiting` and is driven to
    /// `Done`/`Failed` by [`crate::orchestrator::probe`] instead of
    /// immediately completing.
    pub start_probe_after_apply: bool,
    pub dont_fail_if_already_exists: bool,
}

impl Task {
    pub fn new(id: TaskId, component: ComponentId, name: impl Into<String>, mode: Mode, action: Action) -> Self {
        Self {
            id,
            component,
            name: name.into(),
            state: State::Pre,
            dependencies: Vec::new(),
            mode,
            action,
            start_probe_after_apply: false,
            dont_fail_if_already_exists: false,
        }
    }
}

/// Flat, index-addressed storage of every task belonging to one cluster.
#[derive(Clone, Debug, Default)]
pub struct TaskArena {
    tasks: Vec<Task>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, build: impl FnOnce(TaskId) -> Task) -> TaskId {
        let id = TaskId(self.tasks.len() as u32);
        self.tasks.push(build(id));
        id
    }

    pub fn get(&self, id: TaskId) -> &Task {
        &self.tasks[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.tasks.len()).map(|i| TaskId(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut()
    }

    pub fn for_component(&self, component: ComponentId) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.component == component)
    }

    /// DFS cycle detection over `dependencies`, analogous to
    /// [`crate::component::ComponentArena::has_cycle`] (spec invariant 3,
    /// testable property 7).
    pub fn has_cycle(&self) -> Option<Vec<TaskId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.tasks.len()];
        let mut stack = Vec::new();

        fn visit(
            arena: &TaskArena,
            id: TaskId,
            marks: &mut [Mark],
            stack: &mut Vec<TaskId>,
        ) -> Option<Vec<TaskId>> {
            match marks[id.0 as usize] {
                Mark::Done => return None,
                Mark::InProgress => {
                    let pos = stack.iter().position(|&x| x == id).unwrap_or(0);
                    return Some(stack[pos..].to_vec());
                }
                Mark::Unvisited => {}
            }
            marks[id.0 as usize] = Mark::InProgress;
            stack.push(id);
            for &dep in &arena.get(id).dependencies {
                if let Some(cycle) = visit(arena, dep, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks[id.0 as usize] = Mark::Done;
            None
        }

        for id in self.ids() {
            if let Some(cycle) = visit(self, id, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u32, deps: &[u32]) -> Task {
        Task {
            id: TaskId(id),
            component: ComponentId(0),
            name: format!("t{id}"),
            state: State::Pre,
            dependencies: deps.iter().map(|&d| TaskId(d)).collect(),
            mode: Mode::Create,
            action: Action::Apply,
            start_probe_after_apply: false,
            dont_fail_if_already_exists: false,
        }
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let mut arena = TaskArena::new();
        arena.insert(|_| task(0, &[]));
        arena.insert(|_| task(1, &[0]));
        assert!(arena.has_cycle().is_none());
    }

    #[test]
    fn self_cycle_is_detected() {
        let mut arena = TaskArena::new();
        arena.insert(|_| task(0, &[0]));
        assert!(arena.has_cycle().is_some());
    }

    #[test]
    fn mutual_cycle_is_detected() {
        let mut arena = TaskArena::new();
        arena.insert(|_| task(0, &[1]));
        arena.insert(|_| task(1, &[0]));
        assert!(arena.has_cycle().is_some());
    }
}
