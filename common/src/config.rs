// Configuration management with layered configuration (defaults, file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub log: LogConfig,
    pub tools: ToolConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    pub level: String,
    pub mode: LogMode,
    /// Directory of per-run log files in `file` mode
    pub dir: PathBuf,
}

/// Where log lines go
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    /// Human readable lines on stdout
    Dev,
    /// JSON lines appended to a per-run file
    #[default]
    File,
}

impl LogMode {
    /// Value of the `MODE` environment variable; anything but `dev` means file
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("dev") {
            LogMode::Dev
        } else {
            LogMode::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogMode::Dev => "dev",
            LogMode::File => "file",
        }
    }
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locations of the external database tools
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfig {
    /// Root of the bundled tool set; mongo tools live in `<db_tool_dir>/mongotools`
    pub db_tool_dir: PathBuf,
    pub mysqldump: PathBuf,
    pub mongo_install_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: f64,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let mode = std::env::var("MODE")
            .ok()
            .map(|v| LogMode::from_env_value(&v).as_str().to_string());

        let builder = Config::builder()
            // Start with built-in defaults
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("ACTUATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("log.mode", mode)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.log.level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }
        if self.log.mode == LogMode::File && self.log.dir.as_os_str().is_empty() {
            return Err("Log dir cannot be empty in file mode".to_string());
        }

        if self.tools.db_tool_dir.as_os_str().is_empty() {
            return Err("Tool dir cannot be empty".to_string());
        }
        if self.tools.mysqldump.as_os_str().is_empty() {
            return Err("mysqldump path cannot be empty".to_string());
        }

        if self.engine.retry_base_delay_ms > self.engine.retry_max_delay_ms {
            return Err("Retry base delay must not exceed the max delay".to_string());
        }
        if !(0.0..=1.0).contains(&self.engine.retry_jitter) {
            return Err("Retry jitter must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogConfig {
                level: "info".to_string(),
                mode: LogMode::File,
                dir: PathBuf::from("logs"),
            },
            tools: ToolConfig {
                db_tool_dir: PathBuf::from("/home/mysql/dbtools"),
                mysqldump: PathBuf::from("/usr/local/mysql/bin/mysqldump"),
                mongo_install_dir: PathBuf::from("/usr/local/mongodb"),
            },
            engine: EngineConfig {
                retry_base_delay_ms: 1000,
                retry_max_delay_ms: 60_000,
                retry_jitter: 0.1,
            },
        }
    }
}
