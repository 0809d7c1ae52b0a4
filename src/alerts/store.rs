use crate::alerts::alert::{Alert, AlertResponse, PendingRetry};
use crate::alerts::rules::{AlertRule, EscalationRule};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_PERSISTED_ALERTS: usize = 500;
pub const MAX_PERSISTED_RESPONSES: usize = 200;

/// On-disk snapshot of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub alert_rules: Vec<AlertRule>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub alert_responses: Vec<AlertResponse>,
    #[serde(default)]
    pub pending_retries: Vec<PendingRetry>,
    /// Last time each rule fired, keyed by rule id. Keeps cooldowns across restarts.
    #[serde(default)]
    pub last_fired: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AlertStore {
    path: PathBuf,
    max_alerts: usize,
    max_responses: usize,
}

impl AlertStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_alerts: MAX_PERSISTED_ALERTS,
            max_responses: MAX_PERSISTED_RESPONSES,
        }
    }

    pub fn with_limits(mut self, max_alerts: usize, max_responses: usize) -> Self {
        self.max_alerts = max_alerts;
        self.max_responses = max_responses;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. `Ok(None)` when no file exists yet.
    pub fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read alerting state: {}", self.path.display()))?;
        let state: PersistedState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse alerting state: {}", self.path.display()))?;

        Ok(Some(state))
    }

    /// Write the snapshot, keeping only the newest alerts and responses.
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create alerting state directory: {}", parent.display())
            })?;
        }

        let trimmed = PersistedState {
            alert_rules: state.alert_rules.clone(),
            escalation_rules: state.escalation_rules.clone(),
            alerts: newest(&state.alerts, self.max_alerts),
            alert_responses: newest(&state.alert_responses, self.max_responses),
            pending_retries: state.pending_retries.clone(),
            last_fired: state.last_fired.clone(),
        };

        let contents = serde_json::to_string_pretty(&trimmed)
            .context("Failed to serialize alerting state")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write alerting state: {}", self.path.display()))?;

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove alerting state: {}", self.path.display())
            })?;
        }
        Ok(())
    }
}

/// Items are kept in insertion order, so the newest are at the tail.
fn newest<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    let start = items.len().saturating_sub(limit);
    items[start..].to_vec()
}
