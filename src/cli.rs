//! The CLI surface (spec §6 "CLI"): command-line parsing and process
//! bootstrap are out of scope for the core per spec §1, but the shape of
//! the contract the core is driven through still lives here so [`main`]
//! has something concrete to parse against.
//!
//! ```no_run
//! use clap::Parser;
//! use kdeploy::cli::Cli;
//!
//! let cli = Cli::parse();
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use regex::Regex;
use snafu::{ResultExt, Snafu};

use crate::definition::variant::{Filters, VariantDirective};
use crate::definition::Variables;

pub const AUTHOR: &str = "kdeploy contributors";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid -k cluster spec {spec:?}: expected kubeconfig[:var=value,...]"))]
    ClusterSpec { spec: String },
    #[snafu(display("invalid -v variable {spec:?}: expected key=val"))]
    VariableSpec { spec: String },
    #[snafu(display("invalid --variant directive {spec:?}: expected regex=name"))]
    VariantSpec { spec: String },
    #[snafu(display("invalid regex {pattern:?} in {flag}"))]
    Regex { flag: &'static str, pattern: String, source: regex::Error },
}

/// Top-level parsed CLI (spec §6: "commands `deploy` | `delete` | `depends`").
#[derive(Parser, Debug)]
#[command(name = "kdeploy", author = AUTHOR, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply the component tree to every target cluster.
    Deploy(RunArgs),
    /// Remove the component tree from every target cluster.
    Delete(RunArgs),
    /// Resolve the dependency graph without touching any cluster and, if
    /// `--dot` is given, dump it as a DOT file (spec §6 "Persisted state:
    /// none ... Side files: an optional DOT file dumped for the `depends`
    /// command").
    Depends(DependsArgs),
}

/// Options shared by `deploy` and `delete` (spec §6).
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the already-expanded JSON/YAML definition file.
    pub definition: PathBuf,

    /// One cluster target: `kubeconfig[:var=value,...]`. Repeatable; one
    /// [`crate::cluster::Cluster`] is created per occurrence, in order, so
    /// the Nth `-k` becomes `clusterN` for cross-cluster `depends` entries.
    #[arg(short = 'k', long = "kubeconfig", value_name = "PATH[:VAR=VAL,...]")]
    pub kubeconfigs: Vec<String>,

    /// A global variable available to macro expansion and argument
    /// resolution: `key=val`. Repeatable.
    #[arg(short = 'v', long = "var", value_name = "KEY=VAL")]
    pub variables: Vec<String>,

    /// Only enable components whose name matches this regex. Repeatable;
    /// a component must match at least one to stay enabled.
    #[arg(long = "include", value_name = "REGEX")]
    pub include: Vec<String>,

    /// Disable components whose name matches this regex. Repeatable;
    /// applied after `--include`.
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Force-enable a component by exact name, overriding `--include`/
    /// `--exclude` and variant pruning. Repeatable.
    #[arg(long = "enable", value_name = "NAME")]
    pub enable: Vec<String>,

    /// Select a non-default variant for every component definition whose
    /// name matches `regex`: `regex=variantName`. Repeatable.
    #[arg(long = "variant", value_name = "REGEX=NAME")]
    pub variant: Vec<String>,

    /// Remove an environment variable from every pod template's
    /// `pod.env` before it is applied. Repeatable.
    #[arg(long = "remove-env-var", value_name = "NAME")]
    pub remove_env_var: Vec<String>,

    /// The deployment name used for the default `app.kubernetes.io/instance`
    /// label and the auto-managed namespace; defaults to the definition
    /// file's stem.
    #[arg(long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Synthesise a `Namespace` component sized to each cluster's default
    /// namespace when the tree doesn't declare one explicitly.
    #[arg(long = "auto-manage-namespace")]
    pub auto_manage_namespace: bool,

    /// URL of a webhook DNS provisioner to POST host/target requests to for
    /// every Ingress with `dns.enabled=true` (spec §4.3, §4.5 scenario S6).
    /// Without this, such an Ingress's DNS-provision task always fails.
    #[arg(long = "dns-webhook", value_name = "URL")]
    pub dns_webhook: Option<String>,
}

/// Options for the `depends` command (spec §6).
#[derive(clap::Args, Debug)]
pub struct DependsArgs {
    pub definition: PathBuf,

    #[arg(short = 'k', long = "kubeconfig", value_name = "PATH[:VAR=VAL,...]")]
    pub kubeconfigs: Vec<String>,

    #[arg(short = 'v', long = "var", value_name = "KEY=VAL")]
    pub variables: Vec<String>,

    #[arg(long = "include", value_name = "REGEX")]
    pub include: Vec<String>,

    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    #[arg(long = "enable", value_name = "NAME")]
    pub enable: Vec<String>,

    #[arg(long = "variant", value_name = "REGEX=NAME")]
    pub variant: Vec<String>,

    /// Dump the resolved dependency graph as a DOT file at this path.
    #[arg(long = "dot", value_name = "PATH")]
    pub dot: Option<PathBuf>,
}

/// One `-k` cluster target, parsed but not yet connected (spec §1:
/// "Kubeconfig parsing, TLS client setup, and raw HTTP transport" are out
/// of scope; this only splits the CLI grammar apart).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub kubeconfig_path: PathBuf,
    pub variables: Variables,
}

/// Parses one `-k kubeconfig[:var=value,...]` occurrence.
pub fn parse_cluster_spec(spec: &str) -> Result<ClusterSpec> {
    let mut parts = spec.splitn(2, ':');
    let path = parts.next().filter(|p| !p.is_empty()).ok_or_else(|| Error::ClusterSpec { spec: spec.to_string() })?;

    let mut variables = Variables::new();
    if let Some(rest) = parts.next() {
        for pair in rest.split(',') {
            if pair.is_empty() {
                continue;
            }
            let (k, v) = pair.split_once('=').ok_or_else(|| Error::ClusterSpec { spec: spec.to_string() })?;
            variables.insert(k.to_string(), v.to_string());
        }
    }

    Ok(ClusterSpec {
        kubeconfig_path: PathBuf::from(path),
        variables,
    })
}

/// Parses one `-v key=val` occurrence into the global variable map.
pub fn parse_variables(entries: &[String]) -> Result<Variables> {
    let mut variables = Variables::new();
    for entry in entries {
        let (k, v) = entry.split_once('=').ok_or_else(|| Error::VariableSpec { spec: entry.clone() })?;
        variables.insert(k.to_string(), v.to_string());
    }
    Ok(variables)
}

/// Parses one `--variant regex=name` occurrence.
pub fn parse_variant_directive(entry: &str) -> Result<VariantDirective> {
    let (pattern, variant) = entry.split_once('=').ok_or_else(|| Error::VariantSpec { spec: entry.to_string() })?;
    let name_regex = Regex::new(&format!("^{pattern}$")).context(RegexSnafu {
        flag: "--variant",
        pattern: pattern.to_string(),
    })?;
    Ok(VariantDirective {
        name_regex,
        variant: variant.to_string(),
    })
}

fn compile_regexes(flag: &'static str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).context(RegexSnafu {
                flag,
                pattern: p.clone(),
            })
        })
        .collect()
}

/// Builds the [`Filters`] the definition/variant pass consumes out of a
/// `RunArgs`/`DependsArgs`-shaped set of raw CLI strings.
pub fn build_filters(variant: &[String], include: &[String], exclude: &[String], enable: &[String]) -> Result<Filters> {
    let directives = variant.iter().map(|v| parse_variant_directive(v)).collect::<Result<Vec<_>>>()?;
    Ok(Filters {
        directives,
        include: compile_regexes("--include", include)?,
        exclude: compile_regexes("--exclude", exclude)?,
        enable: enable.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn cluster_spec_without_variables_parses() {
        let spec = parse_cluster_spec("/etc/kdeploy/prod.kubeconfig").unwrap();
        assert_eq!(spec.kubeconfig_path, PathBuf::from("/etc/kdeploy/prod.kubeconfig"));
        assert!(spec.variables.is_empty());
    }

    #[test]
    fn cluster_spec_with_variables_parses() {
        let spec = parse_cluster_spec("prod.kubeconfig:namespace=prod,clusterIp=10.0.0.1").unwrap();
        assert_eq!(spec.variables.get("namespace").map(String::as_str), Some("prod"));
        assert_eq!(spec.variables.get("clusterIp").map(String::as_str), Some("10.0.0.1"));
    }

    #[test]
    fn cluster_spec_without_path_is_rejected() {
        assert!(parse_cluster_spec(":namespace=prod").is_err());
    }

    #[test]
    fn variables_parse_key_val_pairs() {
        let vars = parse_variables(&["namespace=prod".to_string(), "clusterId=1".to_string()]).unwrap();
        assert_eq!(vars.get("namespace").map(String::as_str), Some("prod"));
        assert_eq!(vars.get("clusterId").map(String::as_str), Some("1"));
    }

    #[test]
    fn variant_directive_parses_regex_and_name() {
        let directive = parse_variant_directive("foo.*=dev").unwrap();
        assert_eq!(directive.variant, "dev");
        assert!(directive.name_regex.is_match("foo-bar"));
    }

    #[test]
    fn build_filters_collects_all_four_layers() {
        let filters = build_filters(
            &["migrate=dev".to_string()],
            &["^web.*".to_string()],
            &["^web-debug$".to_string()],
            &["forced-on".to_string()],
        )
        .unwrap();
        assert_eq!(filters.directives.len(), 1);
        assert_eq!(filters.include.len(), 1);
        assert_eq!(filters.exclude.len(), 1);
        assert_eq!(filters.enable, vec!["forced-on".to_string()]);
    }
}
