//! Builder for Kubernetes [`ObjectMeta`].

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::kvp::{Annotations, KeyValuePairsExt, Labels};

/// A builder to build [`ObjectMeta`] objects.
#[derive(Clone, Default)]
pub struct ObjectMetaBuilder {
    name: Option<String>,
    generate_name: Option<String>,
    namespace: Option<String>,
    labels: Option<BTreeMap<String, String>>,
    annotations: Option<BTreeMap<String, String>>,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn name_opt(&mut self, name: impl Into<Option<String>>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn generate_name(&mut self, generate_name: impl Into<String>) -> &mut Self {
        self.generate_name = Some(generate_name.into());
        self
    }

    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace_opt(&mut self, namespace: impl Into<Option<String>>) -> &mut Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_label(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_labels(&mut self, labels: impl IntoIterator<Item = (String, String)>) -> &mut Self {
        self.labels.get_or_insert_with(BTreeMap::new).extend(labels);
        self
    }

    pub fn labels(&mut self, labels: Labels) -> &mut Self {
        self.labels = Some(labels.to_unvalidated());
        self
    }

    pub fn with_annotation(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn annotations(&mut self, annotations: Annotations) -> &mut Self {
        self.annotations = Some(annotations.to_unvalidated());
        self
    }

    pub fn build(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.name.clone(),
            generate_name: self.generate_name.clone(),
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            ..ObjectMeta::default()
        }
    }
}
