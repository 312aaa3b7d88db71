//! The in-memory component tree (spec §3, §4.2).
//!
//! Per Design Notes §9 ("prefer storing dependencies as identifiers into a
//! flat per-cluster component table ... rather than back-pointers"), a
//! [`Cluster`](crate::cluster::Cluster) owns a single [`ComponentArena`] and
//! every "weak reference" in the prose spec (`dependsOn`, parent/child
//! links, cluster dependencies) is a [`ComponentId`] index into it. This
//! sidesteps `Rc`/`Weak` aliasing entirely and makes cycle detection a plain
//! index walk.

pub mod args;
pub mod behaviour;
pub mod kinds;
pub mod tree;

use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::definition::ParentRelation;
use crate::task::TaskId;
use crate::time::Duration;

/// Index of a [`Component`] inside its cluster's [`ComponentArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

/// The closed set of Kubernetes (or grouping) kinds a component can embed
/// (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    App,
    Job,
    Deployment,
    StatefulSet,
    DaemonSet,
    Service,
    ConfigMap,
    Secret,
    PersistentVolume,
    Ingress,
    Namespace,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    ServiceAccount,
    HttpRequest,
}

impl Kind {
    /// Parses the `kind` string carried by a [`crate::definition::DefinitionNode`].
    pub fn parse(raw: &str) -> Option<Kind> {
        Some(match raw {
            "App" => Kind::App,
            "Job" => Kind::Job,
            "Deployment" => Kind::Deployment,
            "StatefulSet" => Kind::StatefulSet,
            "DaemonSet" => Kind::DaemonSet,
            "Service" => Kind::Service,
            "ConfigMap" => Kind::ConfigMap,
            "Secret" => Kind::Secret,
            "PersistentVolume" => Kind::PersistentVolume,
            "Ingress" => Kind::Ingress,
            "Namespace" => Kind::Namespace,
            "Role" => Kind::Role,
            "ClusterRole" => Kind::ClusterRole,
            "RoleBinding" => Kind::RoleBinding,
            "ClusterRoleBinding" => Kind::ClusterRoleBinding,
            "ServiceAccount" => Kind::ServiceAccount,
            "HttpRequest" => Kind::HttpRequest,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::App => "App",
            Kind::Job => "Job",
            Kind::Deployment => "Deployment",
            Kind::StatefulSet => "StatefulSet",
            Kind::DaemonSet => "DaemonSet",
            Kind::Service => "Service",
            Kind::ConfigMap => "ConfigMap",
            Kind::Secret => "Secret",
            Kind::PersistentVolume => "PersistentVolume",
            Kind::Ingress => "Ingress",
            Kind::Namespace => "Namespace",
            Kind::Role => "Role",
            Kind::ClusterRole => "ClusterRole",
            Kind::RoleBinding => "RoleBinding",
            Kind::ClusterRoleBinding => "ClusterRoleBinding",
            Kind::ServiceAccount => "ServiceAccount",
            Kind::HttpRequest => "HttpRequest",
        }
    }

    /// "pod-bearing" kinds per spec §4.3: they own a [`k8s_openapi`] pod
    /// template and synthesise the pod-level implicit children.
    pub fn is_pod_bearing(&self) -> bool {
        matches!(
            self,
            Kind::Deployment | Kind::StatefulSet | Kind::DaemonSet | Kind::Job
        )
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component lifecycle state (spec §3 invariant 4: monotonic along
/// `PRE -> CREATING -> BLOCKED -> PRE_TIMER? -> RUNNING -> POST_TIMER? -> DONE`,
/// or any state `-> FAILED`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Pre,
    Creating,
    Blocked,
    PreTimer,
    Running,
    PostTimer,
    Done,
    Failed,
}

impl State {
    /// Whether `self -> next` is one of the permitted edges in invariant 4.
    pub fn can_transition_to(self, next: State) -> bool {
        use State::*;
        if next == Failed {
            return self != Done && self != Failed;
        }
        matches!(
            (self, next),
            (Pre, Creating)
                | (Creating, Blocked)
                | (Blocked, PreTimer)
                | (Blocked, Running)
                | (PreTimer, Running)
                | (Running, PostTimer)
                | (Running, Done)
                | (PostTimer, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }
}

/// A reference to a component exposed by another cluster (spec §3
/// `clusterDependsOn`, §4.4, §4.7).
#[derive(Clone, Debug)]
pub struct ClusterDependency {
    pub cluster_index: usize,
    pub name: String,
    /// Mirrored state of the remote component, updated by the state
    /// listener described in §4.7. `None` until the first mirrored update
    /// arrives.
    pub remote_state: Option<State>,
}

/// Per-component delay gates (spec §4.6 "Timer states").
#[derive(Clone, Debug, Default)]
pub struct Delays {
    pub before: Option<Duration>,
    pub sequence: Option<Duration>,
    pub after: Option<Duration>,
}

/// A node in the deployment tree (spec §3).
#[derive(Clone, Debug)]
pub struct Component {
    pub id: ComponentId,
    pub parent: Option<ComponentId>,
    pub children: Vec<ComponentId>,

    pub name: String,
    pub kind: Kind,
    pub variant: Option<String>,

    pub labels: IndexMap<String, String>,
    pub args: IndexMap<String, String>,
    pub default_args: IndexMap<String, String>,
    pub effective_args: IndexMap<String, String>,
    pub depends: Vec<String>,
    pub parent_relation: ParentRelation,

    pub state: State,
    pub depends_on: Vec<ComponentId>,
    pub cluster_depends_on: Vec<ClusterDependency>,
    pub tasks: Vec<TaskId>,

    pub delays: Delays,
    pub start_time: Option<Instant>,
    pub elapsed: Option<Duration>,

    /// Raw per-kind object overrides carried from the definition file,
    /// merged on top of the synthesised object by `prepareDeploy`.
    pub object: Option<serde_json::Value>,
    /// The kind-specific object synthesised by `prepareDeploy`, populated
    /// once preparation has run.
    pub built: Option<crate::k8s::ObjectKind>,
}

impl Component {
    /// Whether every task attached to this component is DONE (part of
    /// invariant 6, checked against the cluster's [`crate::task::TaskArena`]
    /// by the orchestrator).
    pub fn is_childless_and_done(&self, children_done: bool, tasks_done: bool) -> bool {
        children_done && tasks_done
    }
}

/// Flat, index-addressed storage of every component belonging to one
/// cluster (Design Notes §9).
#[derive(Clone, Debug, Default)]
pub struct ComponentArena {
    components: Vec<Component>,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, build: impl FnOnce(ComponentId) -> Component) -> ComponentId {
        let id = ComponentId(self.components.len() as u32);
        self.components.push(build(id));
        id
    }

    pub fn get(&self, id: ComponentId) -> &Component {
        &self.components[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.0 as usize]
    }

    pub fn try_get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        (0..self.components.len()).map(|i| ComponentId(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.components.iter_mut()
    }

    /// Finds the unique *enabled* component with the given name (invariant 1).
    pub fn find_by_name(&self, name: &str) -> Option<ComponentId> {
        self.components.iter().find(|c| c.name == name).map(|c| c.id)
    }

    /// Depth-first search over `dependsOn`, used both for component-graph
    /// and (via the analogous walk in [`crate::task::graph`]) task-graph
    /// cycle detection (spec invariant 3, testable property 7).
    pub fn has_cycle(&self) -> Option<Vec<ComponentId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.components.len()];
        let mut stack = Vec::new();

        fn visit(
            arena: &ComponentArena,
            id: ComponentId,
            marks: &mut [Mark],
            stack: &mut Vec<ComponentId>,
        ) -> Option<Vec<ComponentId>> {
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
            for &dep in &arena.get(id).depends_on {
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
