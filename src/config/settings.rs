use crate::alerts::system::EngineSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MAX_RETRY_DELAY_SECONDS: u64 = 86_400;
const MAX_ALERT_DAYS: u64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
    pub actions: ActionsConfig,
    pub notifications: NotificationsConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub state_path: String,
    pub metrics_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub check_interval_seconds: u64,
    pub retry_poll_seconds: u64,
    pub watch_metrics: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub alert_days: u32,
    pub max_persisted_alerts: usize,
    pub max_persisted_responses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    pub dry_run: bool,
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub file_path: String,
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: String, // "table" or "json"
    pub colored: bool,
    pub date_format: String, // "iso", "short", "relative"
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_path: "~/.local/share/alchm-alerts/alerting-state.json".to_string(),
            metrics_path: "~/.local/share/alchm-alerts/metrics.json".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: 120,
            retry_poll_seconds: 5,
            watch_metrics: true,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            alert_days: 30,
            max_persisted_alerts: 500,
            max_persisted_responses: 200,
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            retry_delay_seconds: 30,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_path: "~/.local/share/alchm-alerts/alerts.log".to_string(),
            webhook_url: String::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "table".to_string(),
            colored: false,
            date_format: "iso".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            scheduler: SchedulerConfig::default(),
            retention: RetentionConfig::default(),
            actions: ActionsConfig::default(),
            notifications: NotificationsConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load `path`, writing a commented default file first if it does not exist.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = self.to_commented_toml()?;

        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Generate TOML configuration with comments explaining every option
    pub fn to_commented_toml(&self) -> Result<String> {
        let mut output = String::new();

        output.push_str("# alchm-alerts Configuration File\n");
        output.push_str("#\n");
        output.push_str("# Threshold alerting, escalation and automated remediation.\n");
        output.push_str("# Paths starting with ~ are expanded to your home directory.\n");
        output.push('\n');

        section(&mut output, "GENERAL SETTINGS");
        output.push_str("[general]\n");
        output.push_str("# Where alerts, rules, responses and the retry queue are persisted (JSON)\n");
        output.push_str(&format!("state_path = {}\n", quoted(&self.general.state_path)));
        output.push('\n');
        output.push_str("# Metrics snapshot written by the monitored application (JSON)\n");
        output.push_str("# Sections: performance, errors, quality, system\n");
        output.push_str(&format!("metrics_path = {}\n", quoted(&self.general.metrics_path)));
        output.push('\n');

        section(&mut output, "SCHEDULER SETTINGS");
        output.push_str("[scheduler]\n");
        output.push_str("# Seconds between full passes (conditions, escalations, retries, cleanup)\n");
        output.push_str("# Default: 120\n");
        output.push_str(&format!("check_interval_seconds = {}\n", self.scheduler.check_interval_seconds));
        output.push('\n');
        output.push_str("# Seconds between checks of the action retry queue\n");
        output.push_str(&format!("retry_poll_seconds = {}\n", self.scheduler.retry_poll_seconds));
        output.push('\n');
        output.push_str("# Check a category's rules as soon as its metrics change on disk\n");
        output.push_str(&format!("watch_metrics = {}\n", self.scheduler.watch_metrics));
        output.push('\n');

        section(&mut output, "RETENTION SETTINGS");
        output.push_str("[retention]\n");
        output.push_str("# Alerts older than this many days are removed, resolved or not\n");
        output.push_str(&format!("alert_days = {}\n", self.retention.alert_days));
        output.push('\n');
        output.push_str("# Only the newest alerts and responses are written to the state file\n");
        output.push_str(&format!("max_persisted_alerts = {}\n", self.retention.max_persisted_alerts));
        output.push_str(&format!("max_persisted_responses = {}\n", self.retention.max_persisted_responses));
        output.push('\n');

        section(&mut output, "ACTION SETTINGS");
        output.push_str("[actions]\n");
        output.push_str("# true  - log what each response action would do (default)\n");
        output.push_str("# false - run scripts, commands and API calls for real\n");
        output.push_str(&format!("dry_run = {}\n", self.actions.dry_run));
        output.push('\n');
        output.push_str("# Delay before a failed action is retried\n");
        output.push_str(&format!("retry_delay_seconds = {}\n", self.actions.retry_delay_seconds));
        output.push('\n');

        section(&mut output, "NOTIFICATION SETTINGS");
        output.push_str("[notifications]\n");
        output.push_str("# Master switch for console, log, file and webhook notifications\n");
        output.push_str(&format!("enabled = {}\n", self.notifications.enabled));
        output.push('\n');
        output.push_str("# Alert log for the \"file\" channel (one JSON object per line)\n");
        output.push_str(&format!("file_path = {}\n", quoted(&self.notifications.file_path)));
        output.push('\n');
        output.push_str("# Endpoint for the \"webhook\" channel; empty disables it\n");
        output.push_str(&format!("webhook_url = {}\n", quoted(&self.notifications.webhook_url)));
        output.push('\n');

        section(&mut output, "OUTPUT SETTINGS");
        output.push_str("[output]\n");
        output.push_str("#   \"table\" - Human-readable tables\n");
        output.push_str("#   \"json\"  - Machine-readable JSON\n");
        output.push_str("# Can be overridden with --json flag\n");
        output.push_str(&format!("format = {}\n", quoted(&self.output.format)));
        output.push('\n');
        output.push_str("# Can be overridden with --colored flag\n");
        output.push_str(&format!("colored = {}\n", self.output.colored));
        output.push('\n');
        output.push_str("# Timestamp style in tables: \"iso\", \"short\" or \"relative\"\n");
        output.push_str(&format!("date_format = {}\n", quoted(&self.output.date_format)));
        output.push('\n');
        output.push_str("# Display timezone, e.g. \"UTC\", \"America/New_York\", \"Europe/London\"\n");
        output.push_str(&format!("timezone = {}\n", quoted(&self.output.timezone)));
        output.push('\n');

        section(&mut output, "LOGGING SETTINGS");
        output.push_str("[logging]\n");
        output.push_str("# trace, debug, info, warn or error. RUST_LOG takes precedence.\n");
        output.push_str(&format!("level = {}\n", quoted(&self.logging.level)));
        output.push('\n');

        section(&mut output, "USAGE NOTES");
        output.push_str("#\n");
        output.push_str("# To reset to defaults: alchm-alerts config init\n");
        output.push_str("# To modify values:     alchm-alerts config set actions.dry_run false\n");
        output.push_str("# To view current:      alchm-alerts config show\n");

        Ok(output)
    }

    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home.join(".config").join("alchm-alerts").join("config.toml"))
    }

    pub fn state_path(&self) -> PathBuf {
        expand_home(&self.general.state_path)
    }

    pub fn metrics_path(&self) -> PathBuf {
        expand_home(&self.general.metrics_path)
    }

    pub fn notification_file(&self) -> Option<PathBuf> {
        non_empty(&self.notifications.file_path).map(expand_home)
    }

    pub fn webhook_url(&self) -> Option<String> {
        non_empty(&self.notifications.webhook_url).map(str::to_string)
    }

    /// Reject values a hand-edited file can hold but the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        check_interval("scheduler.check_interval_seconds", self.scheduler.check_interval_seconds)?;
        check_interval("scheduler.retry_poll_seconds", self.scheduler.retry_poll_seconds)?;
        check_at_most(
            "actions.retry_delay_seconds",
            self.actions.retry_delay_seconds,
            MAX_RETRY_DELAY_SECONDS,
        )?;
        check_at_most("retention.alert_days", u64::from(self.retention.alert_days), MAX_ALERT_DAYS)?;
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        EngineSettings {
            check_interval: std::time::Duration::from_secs(self.scheduler.check_interval_seconds),
            retry_poll_interval: std::time::Duration::from_secs(self.scheduler.retry_poll_seconds),
            retry_delay: i64::try_from(self.actions.retry_delay_seconds)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(defaults.retry_delay),
            alert_retention: i64::try_from(self.retention.alert_days)
                .ok()
                .and_then(chrono::Duration::try_days)
                .unwrap_or(defaults.alert_retention),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "general.state_path" => self.general.state_path = value.to_string(),
            "general.metrics_path" => self.general.metrics_path = value.to_string(),
            "scheduler.check_interval_seconds" => {
                let seconds: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid interval value: {}", value))?;
                check_interval(key, seconds)?;
                self.scheduler.check_interval_seconds = seconds;
            }
            "scheduler.retry_poll_seconds" => {
                let seconds: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid interval value: {}", value))?;
                check_interval(key, seconds)?;
                self.scheduler.retry_poll_seconds = seconds;
            }
            "scheduler.watch_metrics" => {
                self.scheduler.watch_metrics = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "retention.alert_days" => {
                let days: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid day count: {}", value))?;
                check_at_most(key, days, MAX_ALERT_DAYS)?;
                self.retention.alert_days = days as u32;
            }
            "retention.max_persisted_alerts" => {
                self.retention.max_persisted_alerts = value
                    .parse()
                    .with_context(|| format!("Invalid limit: {}", value))?;
            }
            "retention.max_persisted_responses" => {
                self.retention.max_persisted_responses = value
                    .parse()
                    .with_context(|| format!("Invalid limit: {}", value))?;
            }
            "actions.dry_run" => {
                self.actions.dry_run = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "actions.retry_delay_seconds" => {
                let seconds: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid delay value: {}", value))?;
                check_at_most(key, seconds, MAX_RETRY_DELAY_SECONDS)?;
                self.actions.retry_delay_seconds = seconds;
            }
            "notifications.enabled" => {
                self.notifications.enabled = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "notifications.file_path" => self.notifications.file_path = value.to_string(),
            "notifications.webhook_url" => {
                if !value.is_empty() && !value.starts_with("http://") && !value.starts_with("https://") {
                    anyhow::bail!("Invalid webhook_url: {}. Must start with http:// or https://", value);
                }
                self.notifications.webhook_url = value.to_string();
            }
            "output.format" => {
                if !["table", "json"].contains(&value) {
                    anyhow::bail!("Invalid output format: {}. Must be 'table' or 'json'", value);
                }
                self.output.format = value.to_string();
            }
            "output.colored" => {
                self.output.colored = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "output.date_format" => {
                if !["iso", "short", "relative"].contains(&value) {
                    anyhow::bail!(
                        "Invalid date_format: {}. Must be 'iso', 'short' or 'relative'",
                        value
                    );
                }
                self.output.date_format = value.to_string();
            }
            "output.timezone" => {
                value
                    .parse::<chrono_tz::Tz>()
                    .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", value, e))?;
                self.output.timezone = value.to_string();
            }
            "logging.level" => {
                if !["trace", "debug", "info", "warn", "error"].contains(&value) {
                    anyhow::bail!("Invalid log level: {}", value);
                }
                self.logging.level = value.to_string();
            }
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }
        Ok(())
    }
}

fn check_interval(key: &str, seconds: u64) -> Result<()> {
    if seconds == 0 {
        anyhow::bail!("{} must be at least 1 second", key);
    }
    Ok(())
}

fn check_at_most(key: &str, value: u64, max: u64) -> Result<()> {
    if value > max {
        anyhow::bail!("{} must be at most {}, got {}", key, max, value);
    }
    Ok(())
}

fn section(output: &mut String, title: &str) {
    output.push_str("# =============================================================================\n");
    output.push_str(&format!("# {}\n", title));
    output.push_str("# =============================================================================\n");
    output.push('\n');
}

fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
