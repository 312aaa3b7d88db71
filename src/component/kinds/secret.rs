//! Standalone Secret preparation (spec §4.3 "ConfigMap / Secret: Materialise
//! from files as above"; §4.3 "imagePullSecrets.fromDockerLogin", grounded in
//! `SecretComponent.cpp`). Shares the `fromFile`/basename-keying convention
//! with [`super::configmap`], plus the docker-login special case that
//! produces a `kubernetes.io/dockerconfigjson` secret.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use snafu::{ensure, ResultExt, Snafu};

use crate::builder::meta::ObjectMetaBuilder;
use crate::component::{ComponentArena, ComponentId};
use crate::k8s::ObjectKind;

use super::split_whitespace;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read secret.fromFile entry {path:?}"))]
    ReadFile { path: String, source: std::io::Error },
    #[snafu(display("imagePullSecrets.fromDockerLogin {path:?} is not a regular file"))]
    MissingDockerLoginFile { path: String },
    #[snafu(display("failed to read imagePullSecrets.fromDockerLogin file {path:?}"))]
    ReadDockerLoginFile { path: String, source: std::io::Error },
}

pub fn prepare(arena: &mut ComponentArena, id: ComponentId) -> Result<()> {
    let (name, namespace, labels, from_file, docker_login) = {
        let c = arena.get(id);
        (
            c.name.clone(),
            c.effective_args.get("namespace").cloned().unwrap_or_else(|| "default".to_string()),
            c.labels.clone(),
            c.effective_args.get("secret.fromFile").cloned(),
            c.effective_args.get("imagePullSecrets.fromDockerLogin").cloned(),
        )
    };

    let metadata = ObjectMetaBuilder::new()
        .name(name)
        .namespace(namespace)
        .with_labels(labels.into_iter())
        .build();

    let mut data: BTreeMap<String, ByteString> = BTreeMap::new();
    let mut type_ = None;

    if let Some(files) = from_file {
        for path in split_whitespace(&files) {
            let contents = std::fs::read(&path).context(ReadFileSnafu { path: path.clone() })?;
            let basename = std::path::Path::new(&path)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            data.insert(basename, ByteString(contents));
        }
    }

    if let Some(path) = docker_login {
        ensure!(std::path::Path::new(&path).is_file(), MissingDockerLoginFileSnafu { path: path.clone() });
        let contents = std::fs::read(&path).context(ReadDockerLoginFileSnafu { path: path.clone() })?;
        data.insert("dockerconfigjson".to_string(), ByteString(contents));
        type_ = Some("kubernetes.io/dockerconfigjson".to_string());
    }

    arena.get_mut(id).built = Some(ObjectKind::Secret(Secret {
        metadata,
        data: Some(data),
        type_,
        ..Default::default()
    }));
    Ok(())
}
