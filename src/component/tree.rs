//! Component tree construction (spec §4.2): instantiates a typed
//! [`Component`] per [`crate::definition::DefinitionNode`], then runs the
//! two `init()` passes described there — label insertion and, if
//! auto-manage-namespace is on, synthesis of a [`Kind::Namespace`] root
//! child.

use std::collections::HashSet;

use snafu::{ensure, Snafu};

use crate::definition::DefinitionNode;

use super::{args, Component, ComponentArena, ComponentId, Delays, Kind, State};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unknown component kind {kind:?} for component {name:?}"))]
    UnknownKind { name: String, kind: String },

    #[snafu(display("duplicate enabled component name {name:?}"))]
    DuplicateName { name: String },
}

pub const LABEL_DEPLOYMENT: &str = "k8dep-deployment";
pub const LABEL_CLUSTER: &str = "k8dep-cluster";
pub const LABEL_COMPONENT: &str = "k8dep-component";

/// Materialises a forest of [`DefinitionNode`]s into the arena, returning
/// the root [`ComponentId`]s in definition order.
pub fn build_forest(arena: &mut ComponentArena, nodes: &[DefinitionNode]) -> Result<Vec<ComponentId>> {
    let mut roots = Vec::with_capacity(nodes.len());
    for node in nodes {
        roots.push(build_node(arena, None, node)?);
    }

    let mut seen = HashSet::new();
    for id in arena.ids() {
        let name = arena.get(id).name.clone();
        ensure!(seen.insert(name.clone()), DuplicateNameSnafu { name });
    }

    Ok(roots)
}

fn build_node(arena: &mut ComponentArena, parent: Option<ComponentId>, node: &DefinitionNode) -> Result<ComponentId> {
    let kind = Kind::parse(&node.kind).ok_or_else(|| Error::UnknownKind {
        name: node.name.clone(),
        kind: node.kind.clone(),
    })?;

    let id = arena.insert(|id| Component {
        id,
        parent,
        children: Vec::new(),
        name: node.name.clone(),
        kind,
        variant: node.variant.clone(),
        labels: node.labels.clone(),
        args: node.args.clone(),
        default_args: node.default_args.clone(),
        effective_args: node.args.clone(),
        depends: node.depends.clone(),
        parent_relation: node.parent_relation,
        state: State::Pre,
        depends_on: Vec::new(),
        cluster_depends_on: Vec::new(),
        tasks: Vec::new(),
        delays: Delays::default(),
        start_time: None,
        elapsed: None,
        object: node.object.clone(),
        built: None,
    });

    let mut children = Vec::with_capacity(node.children.len());
    for child in &node.children {
        children.push(build_node(arena, Some(id), child)?);
    }
    arena.get_mut(id).children = children;

    Ok(id)
}

/// Runs `init()` over the whole forest: labels (§4.2 step 1) and effective
/// argument merging, then — if requested — adds a synthesised
/// [`Kind::Namespace`] component sized to `namespace` (§4.2 step 2). The
/// first root is treated as "the root" for namespace synthesis purposes;
/// deployments with more than one top-level node are expected to name their
/// namespace explicitly instead.
pub fn init(
    arena: &mut ComponentArena,
    roots: &mut Vec<ComponentId>,
    deployment_name: &str,
    cluster_name: &str,
    auto_manage_namespace: bool,
    namespace: &str,
) {
    if auto_manage_namespace && !roots.iter().any(|&r| arena.get(r).kind == Kind::Namespace) {
        let ns_id = arena.insert(|id| Component {
            id,
            parent: None,
            children: Vec::new(),
            name: namespace.to_string(),
            kind: Kind::Namespace,
            variant: None,
            labels: Default::default(),
            args: Default::default(),
            default_args: Default::default(),
            effective_args: Default::default(),
            depends: Vec::new(),
            parent_relation: crate::definition::ParentRelation::Before,
            state: State::Pre,
            depends_on: Vec::new(),
            cluster_depends_on: Vec::new(),
            tasks: Vec::new(),
            delays: Delays::default(),
            start_time: None,
            elapsed: None,
            object: None,
            built: None,
        });
        roots.insert(0, ns_id);
    }

    for &root in roots.iter() {
        apply_init(arena, root, None, deployment_name, cluster_name);
    }
}

fn apply_init(
    arena: &mut ComponentArena,
    id: ComponentId,
    nearest_app: Option<String>,
    deployment_name: &str,
    cluster_name: &str,
) {
    let app_name = if arena.get(id).kind == Kind::App {
        Some(arena.get(id).name.clone())
    } else {
        nearest_app
    };

    let mut ancestor_defaults = Vec::new();
    let mut cursor = arena.get(id).parent;
    while let Some(pid) = cursor {
        ancestor_defaults.push(arena.get(pid).default_args.clone());
        cursor = arena.get(pid).parent;
    }
    let effective = args::merge(&arena.get(id).args, ancestor_defaults.iter());

    let component = arena.get_mut(id);
    component.effective_args = effective;
    component
        .labels
        .entry(LABEL_DEPLOYMENT.to_string())
        .or_insert_with(|| deployment_name.to_string());
    component
        .labels
        .entry(LABEL_CLUSTER.to_string())
        .or_insert_with(|| cluster_name.to_string());
    if let Some(app) = &app_name {
        component
            .labels
            .entry(LABEL_COMPONENT.to_string())
            .or_insert_with(|| app.clone());
    }

    let children = arena.get(id).children.clone();
    for child in children {
        apply_init(arena, child, app_name.clone(), deployment_name, cluster_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionNode;

    fn node(name: &str, kind: &str, children: Vec<DefinitionNode>) -> DefinitionNode {
        DefinitionNode {
            name: name.to_string(),
            kind: kind.to_string(),
            children,
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut arena = ComponentArena::new();
        let nodes = vec![node("x", "Frobnicator", vec![])];
        assert!(build_forest(&mut arena, &nodes).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut arena = ComponentArena::new();
        let nodes = vec![node("dup", "Deployment", vec![]), node("dup", "Service", vec![])];
        assert!(build_forest(&mut arena, &nodes).is_err());
    }

    #[test]
    fn labels_propagate_from_nearest_app_ancestor() {
        let mut arena = ComponentArena::new();
        let nodes = vec![node(
            "myapp",
            "App",
            vec![node("web", "Deployment", vec![])],
        )];
        let mut roots = build_forest(&mut arena, &nodes).unwrap();
        init(&mut arena, &mut roots, "dep1", "cluster1", false, "default");

        let web = arena.find_by_name("web").unwrap();
        assert_eq!(
            arena.get(web).labels.get(LABEL_COMPONENT).unwrap(),
            "myapp"
        );
        assert_eq!(
            arena.get(web).labels.get(LABEL_CLUSTER).unwrap(),
            "cluster1"
        );
    }

    #[test]
    fn namespace_child_synthesised_when_auto_managed() {
        let mut arena = ComponentArena::new();
        let nodes = vec![node("myapp", "App", vec![])];
        let mut roots = build_forest(&mut arena, &nodes).unwrap();
        init(&mut arena, &mut roots, "dep1", "cluster1", true, "prod-ns");

        assert!(roots.iter().any(|&r| arena.get(r).kind == Kind::Namespace));
        assert!(arena.iter().any(|c| c.kind == Kind::Namespace && c.name == "prod-ns"));
    }
}
