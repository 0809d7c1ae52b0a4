use crate::alerts::{
    ActionExecutor, AlertStore, AlertingSystem, DaemonLock, LiveRunner, NotificationDispatcher,
};
use crate::config::Config;
use crate::metrics::{MetricAdapters, SnapshotMetrics, SysinfoProbe, SystemStatsSource};
use crate::output::OutputFormat;
use crate::utils::DateFormatter;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolved output settings shared by every command handler
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub json: bool,
    pub colored: bool,
    pub dates: DateFormatter,
}

impl CommandContext {
    pub fn new(config: Config, config_path: PathBuf, json_flag: bool, colored_flag: bool) -> Result<Self> {
        let dates = DateFormatter::new(&config.output.date_format, &config.output.timezone)
            .context("Invalid output configuration")?;
        Ok(Self {
            json: json_flag || config.output.format == "json",
            colored: colored_flag || config.output.colored,
            dates,
            config,
            config_path,
        })
    }

    pub fn print<T: OutputFormat>(&self, item: &T) {
        if self.json {
            match item.to_json() {
                Ok(json) => println!("{}", json),
                Err(e) => self.fail(format!("Failed to serialize output to JSON: {}", e)),
            }
        } else {
            println!("{}", item.to_table(&self.dates, self.colored));
        }
    }

    pub fn success(&self, message: impl Display) {
        if self.json {
            println!("{}", json!({ "status": "success", "message": message.to_string() }));
        } else {
            println!("{}", message);
        }
    }

    /// Report an error the way the rest of the CLI does and exit non-zero.
    pub fn fail(&self, message: impl Display) -> ! {
        report_error(self.json, message)
    }
}

pub fn report_error(json_output: bool, message: impl Display) -> ! {
    if json_output {
        println!("{}", json!({ "status": "error", "message": message.to_string() }));
    } else {
        eprintln!("Error: {}", message);
    }
    std::process::exit(1);
}

/// Composition root: wires metric sources, notifier, executor and store into an engine.
pub fn build_engine(config: &Config) -> Result<AlertingSystem> {
    let snapshot = Arc::new(SnapshotMetrics::from_file(config.metrics_path()));

    let system: Arc<dyn SystemStatsSource> = match SysinfoProbe::new() {
        Ok(probe) => Arc::new(probe),
        Err(e) => {
            warn!("System probe unavailable, reading system stats from snapshot: {:#}", e);
            snapshot.clone()
        }
    };
    let metrics = MetricAdapters::new(snapshot.clone(), snapshot.clone(), snapshot, system);

    let mut notifier = NotificationDispatcher::new(config.notifications.enabled);
    if let Some(path) = config.notification_file() {
        notifier = notifier.with_file(path);
    }
    if let Some(url) = config.webhook_url() {
        notifier = notifier.with_webhook(url);
    }

    let executor = if config.actions.dry_run {
        debug!("Response actions run in dry-run mode");
        ActionExecutor::dry_run()
    } else {
        ActionExecutor::new(Arc::new(LiveRunner::new(notifier.clone())))
    };

    let store = AlertStore::new(config.state_path()).with_limits(
        config.retention.max_persisted_alerts,
        config.retention.max_persisted_responses,
    );

    Ok(AlertingSystem::new(metrics, store)
        .with_executor(executor)
        .with_notifier(notifier)
        .with_settings(config.engine_settings()))
}

/// Commands that rewrite rules or run passes would be overwritten by the
/// scheduler's next save, so they refuse while `run` holds the state file.
pub fn ensure_no_scheduler(config: &Config) -> Result<()> {
    if let Some(pid) = DaemonLock::holder(&config.state_path()) {
        anyhow::bail!(
            "alchm-alerts run is active (pid {}); stop it first. ack and resolve work while it runs",
            pid
        );
    }
    Ok(())
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}
