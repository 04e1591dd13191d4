//! Email notification configuration.

use serde::{Deserialize, Serialize};

/// Email reports sent through a local sendmail-compatible binary.
///
/// Disabled by default. When enabled, a failed run always produces a
/// report; successful runs only do when `on_success` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Enable email reports.
    #[serde(default)]
    pub enabled: bool,

    /// Sendmail-compatible binary the message is piped through.
    #[serde(default = "default_sendmail_path")]
    pub sendmail_path: String,

    /// From address.
    #[serde(default = "default_from")]
    pub from: String,

    /// Recipient addresses.
    #[serde(default)]
    pub to: Vec<String>,

    /// Also send a report when the run succeeds.
    #[serde(default)]
    pub on_success: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sendmail_path: default_sendmail_path(),
            from: default_from(),
            to: Vec::new(),
            on_success: false,
        }
    }
}

impl NotifyConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.to.is_empty() {
            return Err("notify.to must list at least one recipient when notify is enabled".into());
        }
        if self.from.trim().is_empty() {
            return Err("notify.from must not be empty".into());
        }
        Ok(())
    }
}

fn default_sendmail_path() -> String {
    "/usr/sbin/sendmail".to_string()
}

fn default_from() -> String {
    "dumprotate@localhost".to_string()
}
