//! External dump tool invocation.
//!
//! The dump tool is a black box with one contract: exit status zero means
//! the archive exists at the destination path when the call returns. Tools
//! run as child processes and the run waits for completion; bound total run
//! time in the scheduler that launches the rotator, not here.

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::{CommandDumpConfig, DumpToolConfig, MongodumpConfig};

/// Errors from a dump invocation.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The tool binary could not be started at all.
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        /// Program that failed to start.
        tool: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The tool ran and reported failure through its exit status.
    #[error("Dump of '{source_name}' failed with {status}: {stderr}")]
    Failed {
        /// Data source being dumped.
        source_name: String,
        /// Exit status of the child process.
        status: ExitStatus,
        /// Captured standard error, trimmed.
        stderr: String,
    },
}

/// Captured output from a successful dump.
#[derive(Debug)]
pub struct DumpOutput {
    /// Standard output of the tool, usually empty for mongodump.
    pub stdout: String,
}

/// An external program that produces one archive for one data source.
///
/// Implementations are called sequentially, once per source; each call
/// blocks until the child process exits.
#[async_trait]
pub trait DumpTool: Send + Sync {
    /// Dump `source` into the archive file at `dest`.
    async fn dump(&self, source: &str, dest: &Path) -> Result<DumpOutput, DumpError>;

    /// Program name for logs and status output.
    fn name(&self) -> &str;
}

/// Build the configured dump tool.
pub fn create_dump_tool(config: &DumpToolConfig) -> Arc<dyn DumpTool> {
    match config {
        DumpToolConfig::Mongodump(mongodump) => Arc::new(MongodumpTool::new(mongodump.clone())),
        DumpToolConfig::Command(command) => Arc::new(CommandTool::new(command.clone())),
    }
}

/// `mongodump` with gzipped single-archive output.
pub struct MongodumpTool {
    config: MongodumpConfig,
}

impl MongodumpTool {
    pub fn new(config: MongodumpConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, source: &str, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            cmd.arg("-u").arg(username);
            cmd.arg("-p").arg(password);
        }
        cmd.arg(format!(
            "--authenticationDatabase={}",
            self.config.auth_database
        ));
        cmd.arg(format!("--archive={}", dest.display()));
        cmd.arg("--gzip");
        cmd.arg("--db").arg(source);
        cmd
    }

    /// Command line for logging, with the password masked.
    fn display_command(&self, source: &str, dest: &Path) -> String {
        let mut parts = vec![self.config.binary.clone()];
        if let (Some(username), Some(_)) = (&self.config.username, &self.config.password) {
            parts.push("-u".into());
            parts.push(username.clone());
            parts.push("-p".into());
            parts.push("********".into());
        }
        parts.push(format!(
            "--authenticationDatabase={}",
            self.config.auth_database
        ));
        parts.push(format!("--archive={}", dest.display()));
        parts.push("--gzip".into());
        parts.push("--db".into());
        parts.push(source.to_string());
        parts.join(" ")
    }
}

#[async_trait]
impl DumpTool for MongodumpTool {
    async fn dump(&self, source: &str, dest: &Path) -> Result<DumpOutput, DumpError> {
        tracing::debug!(
            command = %self.display_command(source, dest),
            "Running mongodump"
        );
        run_tool(&self.config.binary, source, self.build_command(source, dest)).await
    }

    fn name(&self) -> &str {
        &self.config.binary
    }
}

/// Any configured program, with `{source}` and `{dest}` placeholder
/// substitution in its arguments.
pub struct CommandTool {
    config: CommandDumpConfig,
}

impl CommandTool {
    pub fn new(config: CommandDumpConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, source: &str, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        for arg in &self.config.args {
            cmd.arg(substitute(arg, source, dest));
        }
        cmd
    }
}

#[async_trait]
impl DumpTool for CommandTool {
    async fn dump(&self, source: &str, dest: &Path) -> Result<DumpOutput, DumpError> {
        tracing::debug!(
            program = %self.config.program,
            source,
            dest = %dest.display(),
            "Running dump command"
        );
        run_tool(&self.config.program, source, self.build_command(source, dest)).await
    }

    fn name(&self) -> &str {
        &self.config.program
    }
}

fn substitute(arg: &str, source: &str, dest: &Path) -> String {
    arg.replace("{source}", source)
        .replace("{dest}", &dest.display().to_string())
}

/// Run the child to completion, mapping a non-zero exit into an error that
/// carries the captured stderr.
async fn run_tool(tool: &str, source: &str, mut cmd: Command) -> Result<DumpOutput, DumpError> {
    let output = cmd.output().await.map_err(|e| DumpError::Spawn {
        tool: tool.to_string(),
        source: e,
    })?;

    if !output.status.success() {
        return Err(DumpError::Failed {
            source_name: source.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !stdout.trim().is_empty() {
        tracing::debug!(tool, source, output = %stdout.trim(), "Dump tool stdout");
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        tracing::debug!(tool, source, output = %stderr.trim(), "Dump tool stderr");
    }

    Ok(DumpOutput { stdout })
}
