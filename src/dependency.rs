//! Same-cluster and cross-cluster dependency resolution (spec §4.4),
//! run once all components — including synthesised ones — exist.

use snafu::Snafu;

use crate::component::{ClusterDependency, ComponentArena, ComponentId, Kind};
use crate::task::Mode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("component {from:?} depends on unknown name {name:?}"))]
    UnknownDependency { from: String, name: String },

    #[snafu(display("unknown cluster index {index} referenced by {from:?}"))]
    UnknownCluster { from: String, index: usize },

    #[snafu(display("dependency cycle detected starting at component {first:?}"))]
    Cycle { first: ComponentId },
}

/// A same-cluster reference resolved from a `depends` entry, or a
/// cross-cluster one deferred to the coordinator (spec §4.4 step 2).
pub enum Resolved {
    SameCluster { on: ComponentId },
    CrossCluster { cluster_index: usize, name: String },
}

/// Parses one `depends` entry: `clusterN:<name>` is a cross-cluster
/// reference, everything else names a component in the same cluster.
fn parse_entry(entry: &str) -> Option<(usize, &str)> {
    let rest = entry.strip_prefix("cluster")?;
    let (digits, name) = rest.split_once(':')?;
    let index: usize = digits.parse().ok()?;
    Some((index, name))
}

/// Builds `depends_on` (same-cluster wait edges) for every component from
/// its `depends` list and, for components sharing a Namespace, an implicit
/// wait edge onto that Namespace component (spec §4.4 step 1). Returns the
/// cross-cluster references that must be wired up by the coordinator once
/// peer clusters are reachable. On `Mode::Remove`, every edge direction is
/// reversed (dependents run before their dependencies).
pub fn resolve(arena: &mut ComponentArena, mode: Mode) -> Result<Vec<(ComponentId, Resolved)>> {
    let mut cross_cluster = Vec::new();

    let namespace_components: Vec<(String, ComponentId)> = arena
        .iter()
        .filter(|c| c.kind == Kind::Namespace)
        .map(|c| (c.name.clone(), c.id))
        .collect();

    let ids: Vec<ComponentId> = arena.ids().collect();
    for id in ids {
        let (name, depends, kind) = {
            let c = arena.get(id);
            (c.name.clone(), c.depends.clone(), c.kind)
        };

        for entry in &depends {
            if let Some((index, remote_name)) = parse_entry(entry) {
                cross_cluster.push((
                    id,
                    Resolved::CrossCluster {
                        cluster_index: index,
                        name: remote_name.to_string(),
                    },
                ));
                continue;
            }

            let target = arena.find_by_name(entry).ok_or_else(|| Error::UnknownDependency {
                from: name.clone(),
                name: entry.clone(),
            })?;
            add_edge(arena, mode, id, target);
        }

        // Implicit namespace wait edge (skip the Namespace component
        // itself and any component with no namespace argument set, since
        // that just means "use the default namespace" rather than an
        // explicit dependency on a synthesised one).
        if kind != Kind::Namespace {
            if let Some(ns_name) = arena.get(id).effective_args.get("namespace").cloned() {
                if let Some(&(_, ns_id)) = namespace_components.iter().find(|(n, _)| *n == ns_name) {
                    add_edge(arena, mode, id, ns_id);
                }
            } else if let Some(&(_, ns_id)) = namespace_components.first() {
                add_edge(arena, mode, id, ns_id);
            }
        }
    }

    if let Some(cycle) = arena.has_cycle() {
        return Err(Error::Cycle { first: cycle[0] });
    }

    Ok(cross_cluster)
}

fn add_edge(arena: &mut ComponentArena, mode: Mode, from: ComponentId, to: ComponentId) {
    if from == to {
        return;
    }
    match mode {
        Mode::Create => arena.get_mut(from).depends_on.push(to),
        Mode::Remove => arena.get_mut(to).depends_on.push(from),
    }
}

/// Registers a mirrored cross-cluster dependency on `component`, once the
/// remote cluster's `basicComponentsReady` barrier has fired (spec §4.4
/// step 2, §4.7). The remote state is filled in later by the state
/// listener described in §4.7; `None` here just reserves the slot.
pub fn register_cluster_dependency(arena: &mut ComponentArena, component: ComponentId, cluster_index: usize, name: String) {
    arena.get_mut(component).cluster_depends_on.push(ClusterDependency {
        cluster_index,
        name,
        remote_state: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Delays, State};
    use crate::definition::ParentRelation;
    use indexmap::IndexMap;

    fn bare(id: ComponentId, name: &str, kind: Kind, depends: Vec<&str>) -> Component {
        Component {
            id,
            parent: None,
            children: Vec::new(),
            name: name.to_string(),
            kind,
            variant: None,
            labels: IndexMap::new(),
            args: IndexMap::new(),
            default_args: IndexMap::new(),
            effective_args: IndexMap::new(),
            depends: depends.into_iter().map(String::from).collect(),
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
    fn same_cluster_dependency_adds_wait_edge() {
        let mut arena = ComponentArena::new();
        let db = arena.insert(|id| bare(id, "db", Kind::StatefulSet, vec![]));
        let api = arena.insert(|id| bare(id, "api", Kind::Deployment, vec!["db"]));

        resolve(&mut arena, Mode::Create).unwrap();
        assert!(arena.get(api).depends_on.contains(&db));
    }

    #[test]
    fn remove_mode_reverses_the_edge() {
        let mut arena = ComponentArena::new();
        let db = arena.insert(|id| bare(id, "db", Kind::StatefulSet, vec![]));
        let api = arena.insert(|id| bare(id, "api", Kind::Deployment, vec!["db"]));

        resolve(&mut arena, Mode::Remove).unwrap();
        assert!(arena.get(db).depends_on.contains(&api));
        assert!(!arena.get(api).depends_on.contains(&db));
    }

    #[test]
    fn cross_cluster_entry_is_deferred_not_resolved_locally() {
        let mut arena = ComponentArena::new();
        let api = arena.insert(|id| bare(id, "api", Kind::Deployment, vec!["cluster1:db"]));

        let deferred = resolve(&mut arena, Mode::Create).unwrap();
        assert_eq!(deferred.len(), 1);
        assert!(arena.get(api).depends_on.is_empty());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let mut arena = ComponentArena::new();
        arena.insert(|id| bare(id, "api", Kind::Deployment, vec!["ghost"]));
        assert!(resolve(&mut arena, Mode::Create).is_err());
    }

    #[test]
    fn dependency_cycle_is_rejected() {
        let mut arena = ComponentArena::new();
        arena.insert(|id| bare(id, "a", Kind::Deployment, vec!["b"]));
        arena.insert(|id| bare(id, "b", Kind::Deployment, vec!["a"]));
        assert!(resolve(&mut arena, Mode::Create).is_err());
    }
}
