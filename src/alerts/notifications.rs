use crate::alerts::alert::Alert;
use crate::alerts::rules::Severity;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// One line on stdout.
    Console,
    /// A tracing event.
    Log,
    /// A JSON line appended to the alert log file.
    File,
    /// JSON POST to the configured webhook URL.
    Webhook,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationChannel::Console => "console",
            NotificationChannel::Log => "log",
            NotificationChannel::File => "file",
            NotificationChannel::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    alert_id: &'a str,
    category: String,
    severity: String,
    title: &'a str,
    message: &'a str,
    threshold: f64,
    current_value: f64,
    created_at: String,
}

#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    enabled: bool,
    file_path: Option<PathBuf>,
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl NotificationDispatcher {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            file_path: None,
            webhook_url: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_webhook(mut self, url: String) -> Self {
        self.webhook_url = Some(url);
        self
    }

    /// Send to every channel. Failures are logged per channel and never
    /// propagate. Returns how many channels delivered.
    pub async fn dispatch(&self, alert: &Alert, channels: &[NotificationChannel]) -> usize {
        let mut delivered = 0;
        for channel in channels {
            match self.send(*channel, alert, None).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    alert_id = %alert.id,
                    channel = %channel,
                    "Failed to deliver alert notification: {:#}",
                    e
                ),
            }
        }
        delivered
    }

    pub async fn send(
        &self,
        channel: NotificationChannel,
        alert: &Alert,
        message: Option<&str>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let message = message.unwrap_or(&alert.description);

        match channel {
            NotificationChannel::Console => {
                println!(
                    "[{}] {} {}: {} (value {:.2}, threshold {:.2})",
                    alert.created_at.format("%Y-%m-%d %H:%M:%S"),
                    severity_marker(alert.severity),
                    alert.title,
                    message,
                    alert.current_value,
                    alert.threshold
                );
                Ok(())
            }
            NotificationChannel::Log => {
                match alert.severity {
                    Severity::Critical => error!(alert_id = %alert.id, "{}: {}", alert.title, message),
                    Severity::High => warn!(alert_id = %alert.id, "{}: {}", alert.title, message),
                    Severity::Medium | Severity::Low => {
                        info!(alert_id = %alert.id, "{}: {}", alert.title, message)
                    }
                }
                Ok(())
            }
            NotificationChannel::File => {
                let path = self
                    .file_path
                    .as_ref()
                    .context("No alert log file configured for the file channel")?;
                self.append_to_file(path, alert, message)
            }
            NotificationChannel::Webhook => {
                let url = self
                    .webhook_url
                    .as_ref()
                    .context("No webhook URL configured for the webhook channel")?;
                self.post_webhook(url, alert, message).await
            }
        }
    }

    fn append_to_file(&self, path: &Path, alert: &Alert, message: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create alert log directory: {}", parent.display())
            })?;
        }

        let line = serde_json::to_string(&payload(alert, message))
            .context("Failed to serialize alert notification")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open alert log: {}", path.display()))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write alert log: {}", path.display()))?;

        Ok(())
    }

    async fn post_webhook(&self, url: &str, alert: &Alert, message: &str) -> Result<()> {
        self.client
            .post(url)
            .timeout(Duration::from_secs(10))
            .json(&payload(alert, message))
            .send()
            .await
            .with_context(|| format!("Failed to reach webhook: {}", url))?
            .error_for_status()
            .with_context(|| format!("Webhook rejected alert notification: {}", url))?;

        Ok(())
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(true)
    }
}

fn payload<'a>(alert: &'a Alert, message: &'a str) -> NotificationPayload<'a> {
    NotificationPayload {
        alert_id: &alert.id,
        category: alert.category.to_string(),
        severity: alert.severity.to_string(),
        title: &alert.title,
        message,
        threshold: alert.threshold,
        current_value: alert.current_value,
        created_at: alert.created_at.to_rfc3339(),
    }
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "CRITICAL",
        Severity::High => "HIGH",
        Severity::Medium => "MEDIUM",
        Severity::Low => "LOW",
    }
}
