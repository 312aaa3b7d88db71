//! Structured logging init (spec §7 policy: "errors are visible at
//! INFO/WARN/ERROR log levels, never swallowed"), built on the
//! `tracing`/`tracing-subscriber`/`tracing-appender` stack. Jaeger/
//! OpenTelemetry export and Kubernetes-controller event publishing are
//! operator-specific concerns with no counterpart here (this tool never
//! runs as an in-cluster controller) and are left out rather than carried.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initializes `tracing` with options read from the environment variable
/// named by `env` (conventionally `KDEPLOY_LOG`). Falls back to INFO if the
/// variable is unset or unparsable.
///
/// Log output can additionally be copied to a rotating file by setting
/// `{env}_DIRECTORY` to a directory path.
pub fn initialize_logging(env: &str, app_name: &str) {
    let filter = match EnvFilter::try_from_env(env) {
        Ok(env_filter) => env_filter,
        _ => EnvFilter::try_new(tracing::Level::INFO.to_string()).expect("failed to initialize default tracing level to INFO"),
    };

    let terminal_fmt = tracing_subscriber::fmt::layer();

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_fmt = file_appender_directory.as_deref().map(|log_dir| {
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::HOURLY)
            .filename_prefix(app_name.to_string())
            .filename_suffix("tracing-rs.json")
            .max_log_files(6)
            .build(log_dir)
            .expect("failed to initialize rolling file appender");
        tracing_subscriber::fmt::layer().json().with_writer(file_appender)
    });

    Registry::default().with(filter).with(terminal_fmt).with(file_fmt).init();

    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }
}

#[cfg(test)]
mod tests {
    use tracing::{debug, error, info};

    #[test]
    fn default_tracing_level_is_set_to_info() {
        super::initialize_logging("KDEPLOY_LOG_TEST_NOT_SET", "test");

        error!("ERROR level messages should be seen.");
        info!("INFO level messages should also be seen by default.");
        debug!("DEBUG level messages should be seen only if you set the env var.");
    }
}
