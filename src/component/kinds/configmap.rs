//! Standalone ConfigMap preparation (spec §4.3 "ConfigMap / Secret:
//! Materialise from files as above"), for `ConfigMap` components declared
//! directly in the definition rather than synthesised by a pod-bearing
//! parent.

use snafu::{ResultExt, Snafu};

use crate::builder::configmap::ConfigMapBuilder;
use crate::builder::meta::ObjectMetaBuilder;
use crate::component::{ComponentArena, ComponentId};
use crate::k8s::ObjectKind;

use super::split_whitespace;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read config.fromFile entry {path:?}"))]
    ReadFile { path: String, source: std::io::Error },
    #[snafu(display("failed to build ConfigMap"))]
    Build { source: crate::builder::configmap::Error },
}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId) -> Result<()> {
    let (name, namespace, labels, from_file) = {
        let c = arena.get(id);
        (
            c.name.clone(),
            c.effective_args.get("namespace").cloned().unwrap_or_else(|| "default".to_string()),
            c.labels.clone(),
            c.effective_args.get("config.fromFile").cloned(),
        )
    };

    let mut builder = ConfigMapBuilder::new();
    builder.metadata(
        ObjectMetaBuilder::new()
            .name(name)
            .namespace(namespace)
            .with_labels(labels.into_iter())
            .build(),
    );

    if let Some(files) = from_file {
        for path in split_whitespace(&files) {
            let contents = std::fs::read(&path).context(ReadFileSnafu { path: path.clone() })?;
            let basename = std::path::Path::new(&path)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            builder.add_binary_data(basename, contents);
        }
    }

    let built = builder.build().context(BuildSnafu)?;
    arena.get_mut(id).built = Some(ObjectKind::ConfigMap(built));
    Ok(())
}
