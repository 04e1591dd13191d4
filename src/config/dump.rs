//! Dump tool configuration.

use serde::{Deserialize, Serialize};

/// Which external program produces the archive for each source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DumpToolConfig {
    /// MongoDB's `mongodump`, invoked with `--archive` and `--gzip`.
    Mongodump(MongodumpConfig),

    /// Any program, with `{source}` and `{dest}` placeholders substituted
    /// into its arguments per dump.
    Command(CommandDumpConfig),
}

impl Default for DumpToolConfig {
    fn default() -> Self {
        DumpToolConfig::Mongodump(MongodumpConfig::default())
    }
}

impl DumpToolConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            DumpToolConfig::Mongodump(config) => {
                if config.binary.trim().is_empty() {
                    return Err("dump.binary must not be empty".into());
                }
                match (&config.username, &config.password) {
                    (Some(_), None) | (None, Some(_)) => {
                        Err("dump.username and dump.password must be set together".into())
                    }
                    _ => Ok(()),
                }
            }
            DumpToolConfig::Command(config) => {
                if config.program.trim().is_empty() {
                    return Err("dump.program must not be empty".into());
                }
                if !config.args.iter().any(|arg| arg.contains("{dest}")) {
                    return Err(
                        "dump.args must reference the {dest} placeholder so the archive \
                         lands in the bucket directory"
                            .into(),
                    );
                }
                Ok(())
            }
        }
    }
}

/// Settings for the mongodump tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MongodumpConfig {
    /// Binary to invoke.
    #[serde(default = "default_mongodump_binary")]
    pub binary: String,

    /// Username; must be set together with `password`.
    #[serde(default)]
    pub username: Option<String>,

    /// Password; prefer `${VAR}` interpolation over a literal value.
    #[serde(default)]
    pub password: Option<String>,

    /// Database the credentials authenticate against.
    #[serde(default = "default_auth_database")]
    pub auth_database: String,
}

impl Default for MongodumpConfig {
    fn default() -> Self {
        Self {
            binary: default_mongodump_binary(),
            username: None,
            password: None,
            auth_database: default_auth_database(),
        }
    }
}

/// Settings for a generic dump command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDumpConfig {
    /// Program to run.
    pub program: String,

    /// Arguments; `{source}` and `{dest}` are substituted per dump.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_mongodump_binary() -> String {
    "mongodump".to_string()
}

fn default_auth_database() -> String {
    "admin".to_string()
}
