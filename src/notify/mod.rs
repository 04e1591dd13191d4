//! Email reports through a local sendmail binary.
//!
//! Reports are plain-text messages piped to a sendmail-compatible program
//! with `-t`, so recipients come from the message headers. Sending is a
//! courtesy: a failed notification is logged by the caller and never fails
//! the run that produced it.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::NotifyConfig;

/// Sends run reports through the configured sendmail binary.
pub struct Mailer {
    config: NotifyConfig,
}

impl Mailer {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn notify_on_success(&self) -> bool {
        self.config.on_success
    }

    /// Send one report to the configured recipients.
    pub async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = self.format_message(subject, body);

        let mut child = Command::new(&self.config.sendmail_path)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| NotifyError::Spawn {
                path: self.config.sendmail_path.clone(),
                source: e,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(NotifyError::Write)?;
            // Closing stdin signals end of message.
            stdin.shutdown().await.map_err(NotifyError::Write)?;
        }

        let status = child.wait().await.map_err(NotifyError::Write)?;
        if !status.success() {
            return Err(NotifyError::Exit(status));
        }

        tracing::debug!(recipients = ?self.config.to, subject, "Sent report email");
        Ok(())
    }

    /// Headers, a blank line, then the body, trailing newline included.
    fn format_message(&self, subject: &str, body: &str) -> String {
        format!(
            "To: {}\nSubject: {}\nFrom: {}\n\n{}\n",
            self.config.to.join(", "),
            subject,
            self.config.from,
            body
        )
    }
}

/// Errors from sending a report.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The sendmail binary could not be started.
    #[error("Failed to start sendmail at {path}: {source}")]
    Spawn {
        /// Configured sendmail path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The message could not be written to sendmail's stdin.
    #[error("Failed to hand message to sendmail: {0}")]
    Write(std::io::Error),

    /// Sendmail exited with a non-zero status.
    #[error("sendmail exited with {0}")]
    Exit(std::process::ExitStatus),
}
