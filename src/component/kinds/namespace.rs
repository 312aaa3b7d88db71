//! Namespace preparation (spec §4.2 "auto-manage-namespace", §4.3). A
//! Namespace component carries no synthesised children; its own name is
//! used verbatim unless an embedded object spec overrides it.

use k8s_openapi::api::core::v1::Namespace;
use snafu::Snafu;

use crate::builder::meta::ObjectMetaBuilder;
use crate::component::{ComponentArena, ComponentId};
use crate::k8s::ObjectKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId) -> Result<()> {
    let (name, labels) = {
        let c = arena.get(id);
        (c.name.clone(), c.labels.clone())
    };

    let metadata = ObjectMetaBuilder::new().name(name).with_labels(labels.into_iter()).build();

    arena.get_mut(id).built = Some(ObjectKind::Namespace(Namespace {
        metadata,
        ..Default::default()
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Delays, Kind, State};
    use crate::definition::ParentRelation;
    use indexmap::IndexMap;

    #[test]
    fn namespace_object_carries_its_own_name() {
        let mut arena = ComponentArena::new();
        let id = arena.insert(|id| Component {
            id,
            parent: None,
            children: Vec::new(),
            name: "staging".to_string(),
            kind: Kind::Namespace,
            variant: None,
            labels: IndexMap::new(),
            args: IndexMap::new(),
            default_args: IndexMap::new(),
            effective_args: IndexMap::new(),
            depends: Vec::new(),
            parent_relation: ParentRelation::Before,
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

        prepare(&mut arena, id).unwrap();
        match arena.get(id).built.as_ref().unwrap() {
            ObjectKind::Namespace(ns) => assert_eq!(ns.metadata.name.as_deref(), Some("staging")),
            _ => panic!("expected Namespace"),
        }
    }
}
