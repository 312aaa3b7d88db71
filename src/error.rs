//! Crate-level error aggregate surfaced to `main`.
//!
//! Every module that can fail declares its own `#[derive(Snafu)]` error enum
//! close to the code that produces it (see [`crate::definition`],
//! [`crate::component`], [`crate::orchestrator`], ...); this type only wires
//! those leaf errors into the handful of top-level failure modes described
//! in spec §7 (configuration errors are fatal before execution, everything
//! else is scoped to a single cluster or component).

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to load definition"))]
    Definition { source: crate::definition::Error },

    #[snafu(display("failed to build component tree"))]
    ComponentTree { source: crate::component::tree::Error },

    #[snafu(display("dependency resolution failed"))]
    Dependency { source: crate::dependency::Error },

    #[snafu(display("failed to build task graph"))]
    TaskGraph { source: crate::task::graph::Error },

    #[snafu(display("cluster {cluster} failed"))]
    Cluster {
        cluster: String,
        source: crate::orchestrator::Error,
    },

    #[snafu(display("one or more clusters did not reach DONE"))]
    NotAllDone,
}
