//! RBAC kind preparation (spec §4.3 "RBAC kinds", grounded in
//! `RoleComponent.cpp`/`ClusterRoleComponent.cpp`/`RoleBindingComponent.cpp`/
//! `ClusterRoleBindingComponent.cpp`/`ServiceAccountComponent.cpp`): these
//! carry their object spec largely verbatim from the embedded definition,
//! with only metadata name/namespace filled in here.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use snafu::{ResultExt, Snafu};

use crate::builder::meta::ObjectMetaBuilder;
use crate::component::{ComponentArena, ComponentId, Kind};
use crate::k8s::ObjectKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("embedded object spec for {kind} does not match its expected shape"))]
    Deserialize {
        kind: &'static str,
        source: serde_json::Error,
    },
}

fn embedded<T: Default + serde::de::DeserializeOwned>(object: &Option<serde_json::Value>, kind: &'static str) -> Result<T> {
    match object {
        Some(value) => serde_json::from_value(value.clone()).context(DeserializeSnafu { kind }),
        None => Ok(T::default()),
    }
}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId) -> Result<()> {
    let (name, namespace, labels, object, kind) = {
        let c = arena.get(id);
        (
            c.name.clone(),
            c.effective_args.get("namespace").cloned().unwrap_or_else(|| "default".to_string()),
            c.labels.clone(),
            c.object.clone(),
            c.kind,
        )
    };

    let built = match kind {
        Kind::Role => {
            let mut role: Role = embedded(&object, "Role")?;
            role.metadata = ObjectMetaBuilder::new()
                .name(name)
                .namespace(namespace)
                .with_labels(labels.into_iter())
                .build();
            ObjectKind::Role(role)
        }
        Kind::ClusterRole => {
            let mut cr: ClusterRole = embedded(&object, "ClusterRole")?;
            cr.metadata = ObjectMetaBuilder::new().name(name).with_labels(labels.into_iter()).build();
            ObjectKind::ClusterRole(cr)
        }
        Kind::RoleBinding => {
            let mut rb: RoleBinding = embedded(&object, "RoleBinding")?;
            rb.metadata = ObjectMetaBuilder::new()
                .name(name)
                .namespace(namespace.clone())
                .with_labels(labels.into_iter())
                .build();
            for subject in &mut rb.subjects {
                if subject.namespace.is_none() {
                    subject.namespace = Some(namespace.clone());
                }
            }
            ObjectKind::RoleBinding(rb)
        }
        Kind::ClusterRoleBinding => {
            let mut crb: ClusterRoleBinding = embedded(&object, "ClusterRoleBinding")?;
            crb.metadata = ObjectMetaBuilder::new().name(name).with_labels(labels.into_iter()).build();
            for subject in &mut crb.subjects {
                if subject.namespace.is_none() {
                    subject.namespace = Some(namespace.clone());
                }
            }
            ObjectKind::ClusterRoleBinding(crb)
        }
        Kind::ServiceAccount => {
            let mut sa: ServiceAccount = embedded(&object, "ServiceAccount")?;
            sa.metadata = ObjectMetaBuilder::new()
                .name(name)
                .namespace(namespace)
                .with_labels(labels.into_iter())
                .build();
            ObjectKind::ServiceAccount(sa)
        }
        _ => unreachable!("dispatched only for RBAC kinds"),
    };

    arena.get_mut(id).built = Some(built);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Delays, State};
    use crate::definition::ParentRelation;
    use indexmap::IndexMap;

    fn rbac_component(kind: Kind, object: Option<serde_json::Value>) -> Component {
        Component {
            id: ComponentId(0),
            parent: None,
            children: Vec::new(),
            name: "reader".to_string(),
            kind,
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
            object,
            built: None,
        }
    }

    #[test]
    fn role_binding_subjects_get_default_namespace() {
        let object = serde_json::json!({
            "roleRef": {"apiGroup": "rbac.authorization.k8s.io", "kind": "Role", "name": "reader"},
            "subjects": [{"kind": "ServiceAccount", "name": "app-sa"}],
        });
        let mut arena = ComponentArena::new();
        let id = arena.insert(|_| rbac_component(Kind::RoleBinding, Some(object)));
        prepare(&mut arena, id).unwrap();

        match arena.get(id).built.as_ref().unwrap() {
            ObjectKind::RoleBinding(rb) => {
                assert_eq!(rb.subjects[0].namespace.as_deref(), Some("default"));
                assert_eq!(rb.metadata.name.as_deref(), Some("reader"));
            }
            _ => panic!("expected RoleBinding"),
        }
    }

    #[test]
    fn role_without_embedded_object_still_builds() {
        let mut arena = ComponentArena::new();
        let id = arena.insert(|_| rbac_component(Kind::Role, None));
        prepare(&mut arena, id).unwrap();
        match arena.get(id).built.as_ref().unwrap() {
            ObjectKind::Role(role) => assert_eq!(role.metadata.name.as_deref(), Some("reader")),
            _ => panic!("expected Role"),
        }
    }
}
