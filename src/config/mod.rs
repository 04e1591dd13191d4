//! Configuration module for the backup rotator.
//!
//! The rotator is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [backup]
//! path = "/var/backups/mongo"
//! sources = ["orders", "users"]
//!
//! [dump]
//! type = "mongodump"
//! username = "backup"
//! password = "${MONGO_BACKUP_PASSWORD}"
//! ```

mod backup;
mod dump;
mod notify;
mod observability;

use std::path::{Path, PathBuf};

pub use backup::*;
pub use dump::*;
pub use notify::*;
pub use observability::*;
use serde::{Deserialize, Serialize};

/// Root configuration for the backup rotator.
///
/// Only the `[backup]` section is required; every other section has
/// defaults good enough for an unauthenticated local database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotatorConfig {
    /// Backup root, data sources and rotation schedule.
    pub backup: BackupConfig,

    /// External dump tool invoked per source.
    #[serde(default)]
    pub dump: DumpToolConfig,

    /// Run marker persistence.
    #[serde(default)]
    pub state: StateConfig,

    /// Email reports.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl RotatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: RotatorConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.backup.validate().map_err(ConfigError::Validation)?;
        self.dump.validate().map_err(ConfigError::Validation)?;
        self.notify.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }

    /// Run marker path, resolved under the backup root when not set.
    pub fn state_path(&self) -> PathBuf {
        match &self.state.path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.backup.path).join(".dumprotate-state.json"),
        }
    }
}

/// Where the run marker is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Marker file path. Defaults to `.dumprotate-state.json` under the
    /// backup root.
    #[serde(default)]
    pub path: Option<String>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// References sitting inside a `#` comment are left alone, so commented-out
/// examples don't require the variable to exist.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut cursor = 0;

        for cap in re.captures_iter(line) {
            let reference = cap.get(0).unwrap();

            if let Some(pos) = comment_pos
                && reference.start() >= pos
            {
                continue;
            }

            result.push_str(&line[cursor..reference.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            cursor = reference.end();
        }

        result.push_str(&line[cursor..]);
        result.push('\n');
    }

    // Keep the output's trailing newline in sync with the input's.
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
