// Structured logging for one actuator run
//
// Every line is emitted inside the run span (see `RunContext::span`), so the
// JSON formatter's current-span output tags it with uid/root_id/node_id/version_id.

use crate::config::{LogConfig, LogMode};
use crate::context::RunContext;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// `<dir>/actuator_<uid>_<command>_<node_id>.log`
///
/// `command` is the `<group>-<subcommand>` name of the operation.
pub fn log_file_path(dir: &Path, run: &RunContext, command: &str) -> PathBuf {
    dir.join(format!(
        "actuator_{}_{}_{}.log",
        run.uid(),
        command,
        run.node_id()
    ))
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))
}

/// Initialize the global subscriber for this run
///
/// Returns the log file path in `file` mode.
pub fn init_logging(
    config: &LogConfig,
    run: &RunContext,
    command: &str,
) -> Result<Option<PathBuf>> {
    let filter = env_filter(&config.level)?;

    match config.mode {
        LogMode::Dev => {
            let layer = fmt::layer()
                .with_target(false)
                .with_writer(std::io::stdout)
                .with_filter(filter);
            tracing_subscriber::registry()
                .with(layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

            tracing::debug!(level = %config.level, "Logging initialized in dev mode");
            Ok(None)
        }
        LogMode::File => {
            std::fs::create_dir_all(&config.dir)
                .with_context(|| format!("Failed to create log dir {}", config.dir.display()))?;
            let path = log_file_path(&config.dir, run, command);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter);
            tracing_subscriber::registry()
                .with(layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

            tracing::debug!(
                level = %config.level,
                path = %path.display(),
                "Structured logging initialized with JSON formatting"
            );
            Ok(Some(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadFormat;

    #[test]
    fn test_log_file_path() {
        let run = RunContext::new("1001", "root", "node-9", "v1", PayloadFormat::Base64);
        let path = log_file_path(Path::new("/var/log/actuator"), &run, "mysql-dump");
        assert_eq!(
            path,
            PathBuf::from("/var/log/actuator/actuator_1001_mysql-dump_node-9.log")
        );
    }

    #[test]
    fn test_env_filter_accepts_levels() {
        for level in ["info", "debug", "warn,common=trace"] {
            assert!(env_filter(level).is_ok());
        }
    }

    #[test]
    fn test_init_logging_file_mode_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            level: "info".to_string(),
            mode: LogMode::File,
            dir: dir.path().join("logs"),
        };
        let run = RunContext::new("7", "r", "n", "v", PayloadFormat::Raw);

        // Only the first subscriber per process can be installed
        match init_logging(&config, &run, "sys-os-info") {
            Ok(path) => {
                let path = path.unwrap();
                assert!(path.exists());
                assert!(path.ends_with("actuator_7_sys-os-info_n.log"));
            }
            Err(e) => assert!(e.to_string().contains("Failed to initialize tracing subscriber")),
        }
    }
}
