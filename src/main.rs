//! The `kdeploy` binary: parses the CLI, loads and expands the definition
//! file, builds one [`Cluster`] per `-k` target and hands the whole thing
//! to [`Coordinator::run`] (spec §6).

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kdeploy::cli::{self, Cli, Command, DependsArgs, RunArgs};
use kdeploy::cluster::Cluster;
use kdeploy::component::tree;
use kdeploy::coordinator::{self, ClusterPlan, Coordinator};
use kdeploy::definition::{self, Definition};
use kdeploy::dependency;
use kdeploy::k8s::Adapter;
use kdeploy::task::Mode;

use kube::config::Kubeconfig;
use kube::{Client, Config};
use snafu::{ResultExt, Snafu};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse CLI arguments"))]
    Cli { source: cli::Error },
    #[snafu(display("failed to read definition file {path:?}"))]
    ReadDefinition { path: String, source: std::io::Error },
    #[snafu(display("failed to macro-expand definition file {path:?}"))]
    Expand { path: String, source: definition::macros::Error },
    #[snafu(display("failed to parse definition file {path:?}"))]
    ParseDefinition { path: String, source: serde_yaml::Error },
    #[snafu(display("failed to read kubeconfig {path:?}"))]
    ReadKubeconfig { path: String, source: kube::config::KubeconfigError },
    #[snafu(display("failed to build client config from kubeconfig {path:?}"))]
    BuildConfig { path: String, source: kube::config::KubeconfigError },
    #[snafu(display("failed to build a Kubernetes client for {path:?}"))]
    BuildClient { path: String, source: kube::Error },
    #[snafu(display("failed to build storage backend from {def:?}"))]
    StorageBackend { def: String, source: kdeploy::storage::Error },
    #[snafu(display("the coordinator failed"))]
    Coordinator { source: coordinator::Error },
    #[snafu(display("dependency resolution failed"))]
    Dependency { source: dependency::Error },
    #[snafu(display("failed to build component tree"))]
    Tree { source: tree::Error },
    #[snafu(display("failed to write DOT file {path:?}"))]
    WriteDot { path: String, source: std::io::Error },
}

const LOG_ENV: &str = "KDEPLOY_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    kdeploy::logging::initialize_logging(LOG_ENV, "kdeploy");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(source) => {
            tracing::error!(error = %source, "kdeploy failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Deploy(args) => run_clusters(args, Mode::Create).await,
        Command::Delete(args) => run_clusters(args, Mode::Remove).await,
        Command::Depends(args) => run_depends(args).await,
    }
}

/// Loads and macro-expands the definition file, using the global `-v`
/// variables for expansion (spec §6: "expanding `${name[,default]}` tokens
/// against the loaded variables" happens before the core ever sees the
/// tree).
fn load_definition(path: &Path, variables: &[String]) -> Result<Definition> {
    let raw = std::fs::read_to_string(path).context(ReadDefinitionSnafu {
        path: path.display().to_string(),
    })?;
    let vars = cli::parse_variables(variables).context(CliSnafu)?;
    let expanded = definition::macros::expand(&raw, &vars).context(ExpandSnafu {
        path: path.display().to_string(),
    })?;
    serde_yaml::from_str(&expanded).context(ParseDefinitionSnafu {
        path: path.display().to_string(),
    })
}

/// Builds the one [`Cluster`] a single `-k kubeconfig[:var=value,...]`
/// occurrence describes. Kubeconfig parsing, TLS setup and the raw HTTP
/// transport stay entirely inside [`kube::Client`] (spec §1 Out of scope).
async fn build_cluster(index: usize, spec: &str) -> Result<Cluster> {
    let parsed = cli::parse_cluster_spec(spec).context(CliSnafu)?;
    let path_display = parsed.kubeconfig_path.display().to_string();

    let kubeconfig = Kubeconfig::read_from(&parsed.kubeconfig_path).context(ReadKubeconfigSnafu { path: path_display.clone() })?;
    let config = Config::from_kubeconfig(&kubeconfig).await.context(BuildConfigSnafu { path: path_display.clone() })?;

    let server_url = config.cluster_url.to_string();
    let default_namespace = config.default_namespace.clone();
    let client = Client::try_from(config).context(BuildClientSnafu { path: path_display })?;

    let mut cluster = Cluster::new(index, format!("cluster{index}"), server_url, Adapter::new(client), default_namespace);
    cluster.variables = parsed.variables;
    Ok(cluster)
}

async fn build_cluster_plan(index: usize, spec: &str, definition: Definition, args_shared: &SharedRunArgs) -> Result<ClusterPlan> {
    let cluster = build_cluster(index, spec).await?;

    let storage_backend = cluster
        .variables
        .get("storage.backend")
        .map(|def| kdeploy::storage::backend_from_def(def).context(StorageBackendSnafu { def: def.clone() }))
        .transpose()?;

    let filters = cli::build_filters(&args_shared.variant, &args_shared.include, &args_shared.exclude, &args_shared.enable).context(CliSnafu)?;

    Ok(ClusterPlan {
        cluster,
        definition,
        filters,
        deployment_name: args_shared.deployment_name.clone(),
        auto_manage_namespace: args_shared.auto_manage_namespace,
        storage_backend,
    })
}

/// The parts of [`RunArgs`]/[`DependsArgs`] every `-k` target's plan needs,
/// collected once so building N plans doesn't need N separate argument
/// lists threaded through.
struct SharedRunArgs {
    variant: Vec<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    enable: Vec<String>,
    deployment_name: String,
}

fn deployment_name(explicit: Option<&str>, definition_path: &Path) -> String {
    explicit.map(str::to_string).unwrap_or_else(|| {
        definition_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("kdeploy")
            .to_string()
    })
}

async fn run_clusters(args: RunArgs, mode: Mode) -> Result<bool> {
    let definition = load_definition(&args.definition, &args.variables)?;

    let shared = SharedRunArgs {
        variant: args.variant,
        include: args.include,
        exclude: args.exclude,
        enable: args.enable,
        deployment_name: deployment_name(args.name.as_deref(), &args.definition),
    };

    let mut plans = Vec::with_capacity(args.kubeconfigs.len());
    for (index, spec) in args.kubeconfigs.iter().enumerate() {
        plans.push(build_cluster_plan(index, spec, definition.clone(), &shared).await?);
    }

    let dns_provisioner = args
        .dns_webhook
        .as_deref()
        .map(|url| Arc::new(kdeploy::dns::WebhookProvisioner::new(url)) as Arc<dyn kdeploy::dns::DnsProvisioner>);
    let coordinator = Coordinator::new(dns_provisioner);
    let outcomes = coordinator.run(plans, mode).await.context(CoordinatorSnafu)?;

    for outcome in &outcomes {
        tracing::info!(cluster = %outcome.name, outcome = ?outcome.outcome, "cluster finished");
    }

    Ok(coordinator::all_done(&outcomes))
}

/// Resolves the dependency graph without touching any cluster, optionally
/// dumping it as a DOT file (spec §6 "Side files: an optional DOT file
/// dumped for the `depends` command"). This still needs one real cluster
/// per `-k` target to resolve `clusterN:name` references, but never runs
/// an orchestrator against it.
async fn run_depends(args: DependsArgs) -> Result<bool> {
    let definition = load_definition(&args.definition, &args.variables)?;
    let filters = cli::build_filters(&args.variant, &args.include, &args.exclude, &args.enable).context(CliSnafu)?;

    let mut per_cluster = Vec::with_capacity(args.kubeconfigs.len());
    for (index, spec) in args.kubeconfigs.iter().enumerate() {
        let mut cluster = build_cluster(index, spec).await?;
        let mut tree_definition = definition.clone();
        definition::variant::select(&mut tree_definition, &filters);

        let mut roots = tree::build_forest(&mut cluster.components, &tree_definition).context(TreeSnafu)?;
        let namespace = cluster.default_namespace.clone();
        tree::init(&mut cluster.components, &mut roots, "kdeploy", &cluster.name, false, &namespace);
        dependency::resolve(&mut cluster.components, Mode::Create).context(DependencySnafu)?;

        per_cluster.push((cluster.name.clone(), cluster));
    }

    if let Some(dot_path) = &args.dot {
        let dot = render_dot(&per_cluster);
        std::fs::write(dot_path, dot).context(WriteDotSnafu {
            path: dot_path.display().to_string(),
        })?;
    }

    for (name, cluster) in &per_cluster {
        for id in cluster.components.ids() {
            let component = cluster.components.get(id);
            for &dep in &component.depends_on {
                let dep_name = &cluster.components.get(dep).name;
                println!("{name}:{} -> {name}:{dep_name}", component.name);
            }
            for dep in &component.cluster_depends_on {
                println!("{name}:{} -> cluster{}:{}", component.name, dep.cluster_index, dep.name);
            }
        }
    }

    Ok(true)
}

fn render_dot(per_cluster: &[(String, kdeploy::cluster::Cluster)]) -> String {
    let mut dot = String::from("digraph depends {\n");
    for (name, cluster) in per_cluster {
        for id in cluster.components.ids() {
            let component = cluster.components.get(id);
            for &dep in &component.depends_on {
                let dep_name = &cluster.components.get(dep).name;
                dot.push_str(&format!("  \"{name}:{}\" -> \"{name}:{dep_name}\";\n", component.name));
            }
            for dep in &component.cluster_depends_on {
                dot.push_str(&format!("  \"{name}:{}\" -> \"cluster{}:{}\";\n", component.name, dep.cluster_index, dep.name));
            }
        }
    }
    dot.push_str("}\n");
    dot
}
