//! The definition file as consumed by the core: an already-expanded tree of
//! [`DefinitionNode`]s (see spec §6, "Definition file"). Parsing YAML off
//! disk, and expanding `${name[,default]}` tokens against the loaded
//! variables, both happen one layer up; this module only models the result
//! and exposes the two pure, independently-testable passes the core still
//! owns: [`macros`] (the expansion grammar itself) and [`variant`]
//! (variant/`--include`/`--exclude`/`--enable` pruning).

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub mod macros;
pub mod variant;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse definition JSON"))]
    Parse { source: serde_json::Error },

    #[snafu(display("macro expansion failed"))]
    Macro { source: macros::Error },
}

/// Temporal constraint of a child relative to its parent (§3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParentRelation {
    Before,
    #[default]
    Independent,
    After,
}

/// One node of the definition tree, before it has been materialised into a
/// typed [`crate::component::Component`]. `kind` is kept as a string here;
/// [`crate::component::tree`] is responsible for rejecting unknown kinds
/// (spec §4.2: "Unknown kinds fail construction").
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DefinitionNode {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
    #[serde(default)]
    pub args: IndexMap<String, String>,
    #[serde(default, rename = "defaultArgs")]
    pub default_args: IndexMap<String, String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default, rename = "parentRelation")]
    pub parent_relation: ParentRelation,
    /// Raw, kind-specific object overrides (e.g. a literal `ingress.paths`
    /// snippet, an RBAC rule set). Merged on top of the synthesised object
    /// during `prepareDeploy`.
    #[serde(default)]
    pub object: Option<serde_json::Value>,
    #[serde(default)]
    pub children: Vec<DefinitionNode>,
}

fn default_enabled() -> bool {
    true
}

/// The whole definition file: a forest of top-level nodes (normally a single
/// `App` per deployable unit, but the grammar allows more than one root).
pub type Definition = Vec<DefinitionNode>;

/// Parses an already macro-expanded JSON definition.
pub fn parse(json: &str) -> Result<Definition> {
    serde_json::from_str(json).context(ParseSnafu)
}

/// CLI/global variables available to macro expansion and argument
/// resolution (`clusterId`, `clusterIp`, `namespace`, ... per §3's Cluster
/// description, plus anything passed with `-v key=val`).
pub type Variables = BTreeMap<String, String>;
