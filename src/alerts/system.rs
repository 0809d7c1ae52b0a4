use crate::alerts::{
    actions::{AlertAction, AlertTransition},
    alert::{Alert, AlertResponse, PendingRetry},
    conditions::{cooldown_elapsed, minutes_elapsed},
    executor::ActionExecutor,
    notifications::NotificationDispatcher,
    query::{AlertFilter, AlertSummary},
    rules::{
        AlertCategory, AlertRule, AlertRuleUpdate, EscalationRule, default_alert_rules,
        default_escalation_rules,
    },
    store::{AlertStore, PersistedState},
};
use crate::metrics::MetricAdapters;
use crate::watch::events::MetricUpdate;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type AlertSubscriber = Arc<dyn Fn(&Alert) -> Result<()> + Send + Sync>;
pub type SubscriptionId = u64;

/// Floor for scheduler periods. `tokio::time::interval` panics on zero.
const MIN_SCHEDULER_PERIOD: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub check_interval: std::time::Duration,
    pub retry_poll_interval: std::time::Duration,
    pub retry_delay: Duration,
    pub alert_retention: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            check_interval: std::time::Duration::from_secs(120),
            retry_poll_interval: std::time::Duration::from_secs(5),
            retry_delay: Duration::seconds(30),
            alert_retention: Duration::days(30),
        }
    }
}

/// What one scheduler pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Another pass was still running, nothing was done.
    pub skipped: bool,
    pub alerts_created: usize,
    pub alerts_escalated: usize,
    pub retries_run: usize,
    pub alerts_pruned: usize,
}

#[derive(Debug, Default)]
struct EngineState {
    rules: Vec<AlertRule>,
    escalation_rules: Vec<EscalationRule>,
    alerts: Vec<Alert>,
    responses: Vec<AlertResponse>,
    pending_retries: Vec<PendingRetry>,
    last_fired: HashMap<String, DateTime<Utc>>,
}

impl EngineState {
    fn seeded() -> Self {
        Self {
            rules: default_alert_rules(),
            escalation_rules: default_escalation_rules(),
            ..Default::default()
        }
    }

    fn from_persisted(persisted: PersistedState) -> Self {
        let mut state = Self {
            rules: persisted.alert_rules,
            escalation_rules: persisted.escalation_rules,
            alerts: persisted.alerts,
            responses: persisted.alert_responses,
            pending_retries: persisted.pending_retries,
            last_fired: persisted.last_fired,
        };
        if state.rules.is_empty() {
            state.rules = default_alert_rules();
        }
        if state.escalation_rules.is_empty() {
            state.escalation_rules = default_escalation_rules();
        }
        state
    }

    fn to_persisted(&self) -> PersistedState {
        PersistedState {
            alert_rules: self.rules.clone(),
            escalation_rules: self.escalation_rules.clone(),
            alerts: self.alerts.clone(),
            alert_responses: self.responses.clone(),
            pending_retries: self.pending_retries.clone(),
            last_fired: self.last_fired.clone(),
        }
    }

    fn alert_mut(&mut self, id: &str) -> Option<&mut Alert> {
        self.alerts.iter_mut().find(|a| a.id == id)
    }

    /// Take acknowledged and resolved flags set by another writer of the
    /// state file. Returns how many alerts changed.
    fn adopt_operator_flags(&mut self, persisted: &PersistedState) -> usize {
        let mut adopted = 0;
        for on_disk in persisted.alerts.iter().filter(|a| a.acknowledged || a.resolved) {
            if let Some(alert) = self.alert_mut(&on_disk.id) {
                if alert.merge_operator_flags(on_disk) {
                    adopted += 1;
                }
            }
        }
        adopted
    }
}

/// Clears the in-flight flag when a pass ends, even on early return.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The alerting engine. Built once by the composition root and shared by `Arc`.
pub struct AlertingSystem {
    state: RwLock<EngineState>,
    metrics: MetricAdapters,
    executor: ActionExecutor,
    notifier: NotificationDispatcher,
    store: AlertStore,
    settings: EngineSettings,
    subscribers: Mutex<Vec<(SubscriptionId, AlertSubscriber)>>,
    next_subscription: AtomicU64,
    tick_in_flight: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl AlertingSystem {
    /// Load persisted state from `store`, falling back to the default rule
    /// sets when the file is missing or unreadable.
    pub fn new(metrics: MetricAdapters, store: AlertStore) -> Self {
        let state = match store.load() {
            Ok(Some(persisted)) => {
                debug!(path = %store.path().display(), "Loaded alerting state");
                EngineState::from_persisted(persisted)
            }
            Ok(None) => {
                info!("No alerting state found, seeding default rules");
                EngineState::seeded()
            }
            Err(e) => {
                warn!("Failed to load alerting state, using defaults: {:#}", e);
                EngineState::seeded()
            }
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            state: RwLock::new(state),
            metrics,
            executor: ActionExecutor::dry_run(),
            notifier: NotificationDispatcher::default(),
            store,
            settings: EngineSettings::default(),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            tick_in_flight: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn with_executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_notifier(mut self, notifier: NotificationDispatcher) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ---------------------------------------------------------------------
    // Scheduler
    // ---------------------------------------------------------------------

    /// Spawn the scheduler. Metric updates, when given, trigger a check of the
    /// updated category between ticks. Runs until [`AlertingSystem::stop`].
    pub fn start(
        self: &Arc<Self>,
        updates: Option<mpsc::UnboundedReceiver<MetricUpdate>>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let check_period = engine.settings.check_interval.max(MIN_SCHEDULER_PERIOD);
            let retry_period = engine.settings.retry_poll_interval.max(MIN_SCHEDULER_PERIOD);
            if check_period != engine.settings.check_interval
                || retry_period != engine.settings.retry_poll_interval
            {
                warn!("Scheduler intervals below 1s raised to 1s");
            }

            let mut check = tokio::time::interval(check_period);
            check.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut retry = tokio::time::interval(retry_period);
            retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut updates = updates;

            info!(
                interval_secs = check_period.as_secs(),
                "Alerting scheduler started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        debug!("Alerting scheduler received shutdown signal");
                        break;
                    }

                    _ = check.tick() => {
                        let report = engine.run_tick_at(Utc::now()).await;
                        debug!(?report, "Scheduler tick finished");
                    }

                    _ = retry.tick() => {
                        let ran = engine.process_due_retries_at(Utc::now()).await;
                        if ran > 0 {
                            engine.save().await;
                        }
                    }

                    Some(update) = next_update(&mut updates) => {
                        engine.handle_metric_update(update).await;
                    }
                }
            }

            engine.save().await;
            info!("Alerting scheduler stopped");
        })
    }

    pub fn stop(&self) {
        // No receivers means the scheduler is not running.
        let _ = self.shutdown_tx.send(());
    }

    fn try_begin_tick(&self) -> Option<TickGuard<'_>> {
        self.tick_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(&self.tick_in_flight))
    }

    /// One full pass: conditions, escalations, due retries, cleanup, save.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let Some(_guard) = self.try_begin_tick() else {
            warn!("Previous alerting pass still running, skipping this tick");
            return TickReport {
                skipped: true,
                ..Default::default()
            };
        };

        self.sync_operator_changes().await;

        let report = TickReport {
            skipped: false,
            alerts_created: self.check_alert_conditions_for(None, now).await,
            alerts_escalated: self.process_escalations_at(now).await,
            retries_run: self.process_due_retries_at(now).await,
            alerts_pruned: self.cleanup_old_alerts_at(now).await,
        };

        self.save().await;
        report
    }

    pub async fn run_tick(&self) -> TickReport {
        self.run_tick_at(Utc::now()).await
    }

    /// Check only the updated category, under the same in-flight guard as ticks.
    /// Alerts are stamped with the update's observation time.
    pub async fn handle_metric_update(&self, update: MetricUpdate) -> usize {
        let now = update.observed_at;
        let Some(_guard) = self.try_begin_tick() else {
            debug!(category = %update.category, "Pass in flight, metric update deferred to next tick");
            return 0;
        };

        let created = self.check_alert_conditions_for(Some(update.category), now).await;
        if created > 0 {
            self.save().await;
        }
        created
    }

    // ---------------------------------------------------------------------
    // Condition checks and alert creation
    // ---------------------------------------------------------------------

    pub async fn check_alert_conditions_at(&self, now: DateTime<Utc>) -> usize {
        self.check_alert_conditions_for(None, now).await
    }

    async fn check_alert_conditions_for(
        &self,
        category: Option<AlertCategory>,
        now: DateTime<Utc>,
    ) -> usize {
        let candidates: Vec<AlertRule> = {
            let state = self.state.read().await;
            state
                .rules
                .iter()
                .filter(|rule| rule.enabled)
                .filter(|rule| category.is_none_or(|c| rule.category == c))
                .filter(|rule| {
                    cooldown_elapsed(
                        state.last_fired.get(&rule.id).copied(),
                        rule.cooldown_minutes,
                        now,
                    )
                })
                .cloned()
                .collect()
        };

        let mut created = 0;
        for rule in candidates {
            // Each rule stands alone: a failing adapter only skips its own rules.
            let value = match self.metrics.sample(rule.category, &rule.metric) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        metric = %rule.metric,
                        "Failed to sample metric, skipping rule: {:#}",
                        e
                    );
                    continue;
                }
            };

            if rule.should_fire(value) {
                self.create_alert(&rule, value, now).await;
                created += 1;
            }
        }

        created
    }

    async fn create_alert(&self, rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Alert {
        let alert = Alert::from_rule(rule, value, now);

        {
            let mut state = self.state.write().await;
            state.alerts.push(alert.clone());
            state.last_fired.insert(rule.id.clone(), now);
        }

        warn!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            severity = %alert.severity,
            value,
            threshold = rule.threshold,
            "Alert created: {}",
            alert.title
        );

        self.notify_subscribers(&alert);

        if rule.auto_response {
            for action in &rule.response_actions {
                self.run_action(&alert, action, 0, now).await;
            }
        }

        self.notifier.dispatch(&alert, &rule.notification_channels).await;

        alert
    }

    /// Fire `rule_id` at `threshold + 1`, bypassing the cooldown gate.
    pub async fn test_alert(&self, rule_id: &str) -> Result<Alert> {
        let rule = {
            let state = self.state.read().await;
            state
                .rules
                .iter()
                .find(|r| r.id == rule_id)
                .cloned()
                .with_context(|| format!("Unknown alert rule: {}", rule_id))?
        };

        let alert = self.create_alert(&rule, rule.threshold + 1.0, Utc::now()).await;
        self.save().await;
        Ok(alert)
    }

    // ---------------------------------------------------------------------
    // Action execution
    // ---------------------------------------------------------------------

    /// Run one attempt of `action` for `alert` and record it. Failed attempts
    /// queue a single retry while attempts remain.
    async fn run_action(
        &self,
        alert: &Alert,
        action: &AlertAction,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> AlertResponse {
        let mut response = AlertResponse::pending(&alert.id, &action.name, attempt, now);

        if !action.should_run(alert.current_value) {
            let unmet: Vec<String> = action
                .conditions
                .iter()
                .filter(|c| !c.holds(alert.current_value))
                .map(|c| c.to_string())
                .collect();
            info!(
                alert_id = %alert.id,
                action = %action.name,
                "Skipping action, conditions not met: {}",
                unmet.join(", ")
            );
            response.skip(format!("conditions not met: {}", unmet.join(", ")), now);
            self.state.write().await.responses.push(response.clone());
            return response;
        }

        response.mark_running();
        self.state.write().await.responses.push(response.clone());

        // The state lock is not held while the action runs.
        let started = Instant::now();
        let outcome = self.executor.execute(action, alert).await;
        let finished = now + Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());

        let mut state = self.state.write().await;
        match outcome {
            Ok(result) => {
                info!(alert_id = %alert.id, action = %action.name, attempt, "Action completed");
                response.complete(result, finished);

                if let Some(transition) = action.on_success {
                    if let Some(target) = state.alert_mut(&alert.id) {
                        match transition {
                            AlertTransition::Acknowledge => target.acknowledge(finished),
                            AlertTransition::Resolve => target.resolve(finished),
                        }
                    }
                }
            }
            Err(e) => {
                error!(alert_id = %alert.id, action = %action.name, attempt, "Action failed: {}", e);
                response.fail(e.to_string(), finished);

                if attempt < action.retry_count {
                    let due_at = finished + self.settings.retry_delay;
                    debug!(action = %action.name, next_attempt = attempt + 1, %due_at, "Queued action retry");
                    state.pending_retries.push(PendingRetry {
                        alert_id: alert.id.clone(),
                        action: action.clone(),
                        attempt: attempt + 1,
                        due_at,
                    });
                } else if action.retry_count > 0 {
                    warn!(action = %action.name, "Action retries exhausted");
                }
            }
        }

        if let Some(slot) = state.responses.iter_mut().find(|r| r.id == response.id) {
            *slot = response.clone();
        } else {
            state.responses.push(response.clone());
        }

        response
    }

    /// Run every queued retry whose due time has passed.
    pub async fn process_due_retries_at(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<(PendingRetry, Option<Alert>)> = {
            let mut state = self.state.write().await;
            let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending_retries)
                .into_iter()
                .partition(|retry| retry.due_at <= now);
            state.pending_retries = waiting;
            due.into_iter()
                .map(|retry| {
                    let alert = state.alerts.iter().find(|a| a.id == retry.alert_id).cloned();
                    (retry, alert)
                })
                .collect()
        };

        let mut ran = 0;
        for (retry, alert) in due {
            match alert {
                Some(alert) if !alert.resolved => {
                    self.run_action(&alert, &retry.action, retry.attempt, now).await;
                    ran += 1;
                }
                Some(_) => debug!(alert_id = %retry.alert_id, "Alert resolved, dropping retry"),
                None => debug!(alert_id = %retry.alert_id, "Alert no longer exists, dropping retry"),
            }
        }
        ran
    }

    // ---------------------------------------------------------------------
    // Escalation and cleanup
    // ---------------------------------------------------------------------

    /// Escalate unresolved alerts whose first matching escalation rule's delay
    /// has elapsed. Each alert escalates at most once.
    pub async fn process_escalations_at(&self, now: DateTime<Utc>) -> usize {
        let escalations: Vec<(Alert, EscalationRule)> = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let mut escalations = Vec::new();

            for alert in state.alerts.iter_mut().filter(|a| !a.resolved && !a.escalated) {
                let rule = state.escalation_rules.iter().find(|rule| {
                    rule.matches(alert.category, alert.severity)
                        && minutes_elapsed(alert.created_at, rule.escalation_delay_minutes, now)
                });
                if let Some(rule) = rule {
                    alert.escalate(now);
                    escalations.push((alert.clone(), rule.clone()));
                }
            }
            escalations
        };

        for (alert, rule) in &escalations {
            warn!(
                alert_id = %alert.id,
                escalation_rule = %rule.id,
                "Escalating unresolved alert: {}",
                alert.title
            );
            for action in &rule.escalation_actions {
                self.run_action(alert, action, 0, now).await;
            }
        }

        escalations.len()
    }

    /// Drop alerts older than the retention window regardless of state,
    /// together with their responses and queued retries.
    pub async fn cleanup_old_alerts_at(&self, now: DateTime<Utc>) -> usize {
        let retention = self.settings.alert_retention;
        let mut state = self.state.write().await;

        let before = state.alerts.len();
        state.alerts.retain(|a| now - a.created_at <= retention);
        let removed = before - state.alerts.len();

        if removed > 0 {
            let remaining: std::collections::HashSet<String> =
                state.alerts.iter().map(|a| a.id.clone()).collect();
            state.responses.retain(|r| remaining.contains(&r.alert_id));
            state.pending_retries.retain(|r| remaining.contains(&r.alert_id));
            info!(removed, "Pruned old alerts");
        }

        removed
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Write the full state snapshot. Failures are logged, never returned.
    ///
    /// Operator flags written to the file by another process since the last
    /// save are merged in first.
    pub async fn save(&self) {
        let mut state = self.state.write().await;
        self.adopt_persisted_flags(&mut state);
        if let Err(e) = self.store.save(&state.to_persisted()) {
            warn!("Failed to save alerting state: {:#}", e);
        }
    }

    /// Pick up `ack`/`resolve` made by another process since the last save.
    pub async fn sync_operator_changes(&self) -> usize {
        let mut state = self.state.write().await;
        self.adopt_persisted_flags(&mut state)
    }

    fn adopt_persisted_flags(&self, state: &mut EngineState) -> usize {
        let persisted = match self.store.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return 0,
            Err(e) => {
                debug!("Not merging operator changes from state file: {:#}", e);
                return 0;
            }
        };

        let adopted = state.adopt_operator_flags(&persisted);
        if adopted > 0 {
            info!(adopted, "Merged acknowledged/resolved alerts from state file");
        }
        adopted
    }

    /// Drop all alerts, responses, retries and cooldowns, restore the default
    /// rule sets and delete the state file.
    pub async fn reset(&self) {
        *self.state.write().await = EngineState::seeded();
        if let Err(e) = self.store.clear() {
            warn!("Failed to remove alerting state: {:#}", e);
        }
        info!("Alerting system reset");
    }

    // ---------------------------------------------------------------------
    // Rules
    // ---------------------------------------------------------------------

    pub async fn alert_rules(&self) -> Vec<AlertRule> {
        self.state.read().await.rules.clone()
    }

    pub async fn escalation_rules(&self) -> Vec<EscalationRule> {
        self.state.read().await.escalation_rules.clone()
    }

    /// Add a rule, generating an id when none is given. Returns the id.
    pub async fn add_alert_rule(&self, mut rule: AlertRule) -> Result<String> {
        {
            let mut state = self.state.write().await;
            if rule.id.trim().is_empty() {
                rule.id = format!("rule-{}", Uuid::new_v4().simple());
            } else if state.rules.iter().any(|r| r.id == rule.id) {
                anyhow::bail!("Alert rule already exists: {}", rule.id);
            }
            state.rules.push(rule.clone());
        }

        info!(rule_id = %rule.id, "Added alert rule");
        self.save().await;
        Ok(rule.id)
    }

    pub async fn update_alert_rule(&self, id: &str, update: AlertRuleUpdate) -> bool {
        let updated = {
            let mut state = self.state.write().await;
            match state.rules.iter_mut().find(|r| r.id == id) {
                Some(rule) => {
                    rule.apply_update(update);
                    true
                }
                None => false,
            }
        };

        if updated {
            info!(rule_id = %id, "Updated alert rule");
            self.save().await;
        }
        updated
    }

    pub async fn delete_alert_rule(&self, id: &str) -> bool {
        let deleted = {
            let mut state = self.state.write().await;
            let before = state.rules.len();
            state.rules.retain(|r| r.id != id);
            state.last_fired.remove(id);
            state.rules.len() != before
        };

        if deleted {
            info!(rule_id = %id, "Deleted alert rule");
            self.save().await;
        }
        deleted
    }

    // ---------------------------------------------------------------------
    // Alerts
    // ---------------------------------------------------------------------

    pub async fn alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        filter.apply(&self.state.read().await.alerts)
    }

    pub async fn alert(&self, id: &str) -> Option<Alert> {
        self.state.read().await.alerts.iter().find(|a| a.id == id).cloned()
    }

    pub async fn acknowledge_alert(&self, id: &str) -> bool {
        let found = match self.state.write().await.alert_mut(id) {
            Some(alert) => {
                alert.acknowledge(Utc::now());
                true
            }
            None => false,
        };

        if found {
            info!(alert_id = %id, "Alert acknowledged");
            self.save().await;
        }
        found
    }

    pub async fn resolve_alert(&self, id: &str) -> bool {
        let found = match self.state.write().await.alert_mut(id) {
            Some(alert) => {
                alert.resolve(Utc::now());
                true
            }
            None => false,
        };

        if found {
            info!(alert_id = %id, "Alert resolved");
            self.save().await;
        }
        found
    }

    pub async fn responses_for(&self, alert_id: &str) -> Vec<AlertResponse> {
        self.state
            .read()
            .await
            .responses
            .iter()
            .filter(|r| r.alert_id == alert_id)
            .cloned()
            .collect()
    }

    pub async fn pending_retries(&self) -> Vec<PendingRetry> {
        self.state.read().await.pending_retries.clone()
    }

    pub async fn alert_summary(&self) -> AlertSummary {
        let state = self.state.read().await;
        AlertSummary::compute(&state.alerts, &state.responses)
    }

    // ---------------------------------------------------------------------
    // Subscribers
    // ---------------------------------------------------------------------

    pub fn subscribe(&self, callback: AlertSubscriber) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push((id, callback)),
            Err(poisoned) => poisoned.into_inner().push((id, callback)),
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    fn notify_subscribers(&self, alert: &Alert) {
        let callbacks: Vec<(SubscriptionId, AlertSubscriber)> = match self.subscribers.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| (callback.as_ref())(alert))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(subscriber = id, alert_id = %alert.id, "Alert subscriber failed: {:#}", e),
                Err(_) => error!(subscriber = id, alert_id = %alert.id, "Alert subscriber panicked"),
            }
        }
    }
}

async fn next_update(updates: &mut Option<mpsc::UnboundedReceiver<MetricUpdate>>) -> Option<MetricUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl std::fmt::Debug for AlertingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertingSystem")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::actions::ActionKind;
    use crate::alerts::alert::ResponseStatus;
    use crate::alerts::conditions::{ActionCondition, Comparator, ConditionOperator};
    use crate::alerts::executor::{ActionResult, ActionRunner};
    use crate::alerts::rules::Severity;
    use crate::metrics::{MetricsSnapshot, SnapshotMetrics};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        metrics: Arc<SnapshotMetrics>,
        engine: AlertingSystem,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let metrics = Arc::new(SnapshotMetrics::in_memory(MetricsSnapshot::default()));
        let adapters = MetricAdapters::new(
            metrics.clone(),
            metrics.clone(),
            metrics.clone(),
            metrics.clone(),
        );
        let engine = AlertingSystem::new(adapters, AlertStore::new(dir.path().join("state.json")))
            .with_notifier(NotificationDispatcher::new(false));
        Harness {
            _dir: dir,
            metrics,
            engine,
        }
    }

    fn build_time_rule(threshold: f64, cooldown_minutes: u64) -> AlertRule {
        AlertRule {
            id: "build-slow".to_string(),
            name: "Slow build".to_string(),
            description: "Build is slow".to_string(),
            category: AlertCategory::Performance,
            metric: "build_time".to_string(),
            condition: Comparator::GreaterThan,
            threshold,
            severity: Severity::High,
            enabled: true,
            cooldown_minutes,
            escalation_delay_minutes: 0,
            auto_response: false,
            response_actions: vec![],
            notification_channels: vec![],
        }
    }

    /// Only the given rules, no defaults.
    async fn only_rules(engine: &AlertingSystem, rules: Vec<AlertRule>) {
        engine.state.write().await.rules = rules;
    }

    struct FlakyRunner {
        calls: AtomicUsize,
        succeed_after: usize,
    }

    #[async_trait]
    impl ActionRunner for FlakyRunner {
        async fn run(&self, _action: &AlertAction, _alert: &Alert) -> ActionResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.succeed_after {
                Ok(serde_json::json!({"call": call}))
            } else {
                Err(crate::alerts::executor::ActionError::Failed("flaky".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_fresh_engine_seeds_defaults() {
        let h = harness();
        let rules = h.engine.alert_rules().await;
        assert_eq!(rules.len(), 5);
        assert!(!h.engine.escalation_rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_rule_never_alerts() {
        let h = harness();
        let mut rule = build_time_rule(10.0, 0);
        rule.enabled = false;
        only_rules(&h.engine, vec![rule]).await;
        h.metrics.update(|s| s.performance.average_build_time = 10_000.0);

        let now = Utc::now();
        for minute in 0..5 {
            h.engine.check_alert_conditions_at(now + Duration::minutes(minute)).await;
        }
        assert!(h.engine.alerts(&AlertFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_boundary_does_not_alert() {
        let h = harness();
        only_rules(&h.engine, vec![build_time_rule(100.0, 0)]).await;

        h.metrics.update(|s| s.performance.average_build_time = 100.0);
        assert_eq!(h.engine.check_alert_conditions_at(Utc::now()).await, 0);

        h.metrics.update(|s| s.performance.average_build_time = 100.5);
        assert_eq!(h.engine.check_alert_conditions_at(Utc::now()).await, 1);
    }

    #[tokio::test]
    async fn test_cooldown_scenario_inclusive_boundary() {
        let h = harness();
        only_rules(&h.engine, vec![build_time_rule(100.0, 15)]).await;
        let t0 = Utc::now();

        h.metrics.update(|s| s.performance.average_build_time = 50.0);
        assert_eq!(h.engine.check_alert_conditions_at(t0).await, 0);

        h.metrics.update(|s| s.performance.average_build_time = 150.0);
        assert_eq!(h.engine.check_alert_conditions_at(t0 + Duration::minutes(5)).await, 1);

        // One second short of the cooldown: suppressed
        let almost = t0 + Duration::minutes(20) - Duration::seconds(1);
        assert_eq!(h.engine.check_alert_conditions_at(almost).await, 0);

        // Exactly at the cooldown: eligible again
        assert_eq!(h.engine.check_alert_conditions_at(t0 + Duration::minutes(20)).await, 1);
        assert_eq!(h.engine.alerts(&AlertFilter::default()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_two_fires_within_cooldown_produce_one_alert() {
        let h = harness();
        only_rules(&h.engine, vec![build_time_rule(1.0, 30)]).await;
        h.metrics.update(|s| s.performance.average_build_time = 5.0);

        let now = Utc::now();
        h.engine.check_alert_conditions_at(now).await;
        h.engine.check_alert_conditions_at(now + Duration::minutes(29)).await;
        assert_eq!(h.engine.alerts(&AlertFilter::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_test_alert_uses_threshold_plus_one() {
        let h = harness();
        let alert = h.engine.test_alert("build-time-critical").await.unwrap();
        let rule = h
            .engine
            .alert_rules()
            .await
            .into_iter()
            .find(|r| r.id == "build-time-critical")
            .unwrap();

        assert_eq!(alert.current_value, rule.threshold + 1.0);
        assert_eq!(alert.severity, rule.severity);
        // Auto-response ran both actions through the dry-run executor
        let responses = h.engine.responses_for(&alert.id).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.status == ResponseStatus::Completed));

        assert!(h.engine.test_alert("no-such-rule").await.is_err());
    }

    #[tokio::test]
    async fn test_acknowledge_and_resolve() {
        let h = harness();
        let alert = h.engine.test_alert("code-quality-low").await.unwrap();

        assert!(h.engine.acknowledge_alert(&alert.id).await);
        let acked = h.engine.alert(&alert.id).await.unwrap();
        assert!(acked.acknowledged && !acked.resolved);

        assert!(h.engine.resolve_alert(&alert.id).await);
        let resolved = h.engine.alert(&alert.id).await.unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());

        assert!(!h.engine.resolve_alert("alert-missing").await);
    }

    #[tokio::test]
    async fn test_escalates_exactly_once() {
        let h = harness();
        let alert = h.engine.test_alert("build-time-critical").await.unwrap();
        let created = alert.created_at;

        // Default critical escalation delay is 30 minutes
        assert_eq!(h.engine.process_escalations_at(created + Duration::minutes(29)).await, 0);
        assert_eq!(h.engine.process_escalations_at(created + Duration::minutes(30)).await, 1);
        assert_eq!(h.engine.process_escalations_at(created + Duration::minutes(90)).await, 0);

        let escalated = h.engine.alert(&alert.id).await.unwrap();
        assert!(escalated.escalated);
        assert_eq!(escalated.escalated_at, Some(created + Duration::minutes(30)));
    }

    #[tokio::test]
    async fn test_resolved_alerts_do_not_escalate() {
        let h = harness();
        let alert = h.engine.test_alert("build-time-critical").await.unwrap();
        h.engine.resolve_alert(&alert.id).await;
        assert_eq!(
            h.engine.process_escalations_at(alert.created_at + Duration::days(1)).await,
            0
        );
    }

    #[tokio::test]
    async fn test_cleanup_ignores_resolution_state() {
        let h = harness();
        only_rules(&h.engine, vec![build_time_rule(1.0, 0)]).await;
        h.metrics.update(|s| s.performance.average_build_time = 5.0);

        let now = Utc::now();
        h.engine.check_alert_conditions_at(now - Duration::days(31)).await;
        h.engine.check_alert_conditions_at(now - Duration::days(29)).await;

        let old_resolved = h.engine.alerts(&AlertFilter::default()).await;
        h.engine.resolve_alert(&old_resolved[0].id).await;
        h.engine.resolve_alert(&old_resolved[1].id).await;

        assert_eq!(h.engine.cleanup_old_alerts_at(now).await, 1);
        let remaining = h.engine.alerts(&AlertFilter::default()).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].created_at, now - Duration::days(29));
    }

    #[tokio::test]
    async fn test_failed_action_queues_single_retry() {
        let h = harness();
        let runner = Arc::new(FlakyRunner {
            calls: AtomicUsize::new(0),
            succeed_after: 10,
        });
        let engine = h.engine.with_executor(ActionExecutor::new(runner.clone()));

        let mut rule = build_time_rule(1.0, 0);
        rule.auto_response = true;
        rule.response_actions = vec![
            AlertAction::new(
                "restart",
                ActionKind::Command {
                    command: "true".to_string(),
                    args: vec![],
                },
            )
            .with_retries(2),
        ];
        only_rules(&engine, vec![rule]).await;
        h.metrics.update(|s| s.performance.average_build_time = 5.0);

        let t0 = Utc::now();
        engine.check_alert_conditions_at(t0).await;
        let retries = engine.pending_retries().await;
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].attempt, 1);

        // Not due yet
        assert_eq!(engine.process_due_retries_at(t0 + Duration::seconds(10)).await, 0);
        // Due: second failure queues the final retry
        assert_eq!(engine.process_due_retries_at(t0 + Duration::seconds(31)).await, 1);
        assert_eq!(engine.pending_retries().await[0].attempt, 2);
        // Final failure: nothing left
        assert_eq!(engine.process_due_retries_at(t0 + Duration::seconds(62)).await, 1);
        assert!(engine.pending_retries().await.is_empty());

        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        let alert_id = engine.alerts(&AlertFilter::default()).await[0].id.clone();
        let attempts: Vec<u32> = engine
            .responses_for(&alert_id)
            .await
            .iter()
            .map(|r| r.retry_count)
            .collect();
        assert_eq!(attempts, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unmet_condition_skips_action() {
        let h = harness();
        let mut rule = build_time_rule(1.0, 0);
        rule.auto_response = true;
        rule.response_actions = vec![
            AlertAction::new(
                "only-when-huge",
                ActionKind::Campaign {
                    campaign: "build-optimization".to_string(),
                    parameters: Default::default(),
                },
            )
            .with_condition(ActionCondition::new("build_time", ConditionOperator::GreaterThan, 500.0))
            .with_retries(3),
        ];
        only_rules(&h.engine, vec![rule]).await;
        h.metrics.update(|s| s.performance.average_build_time = 5.0);

        h.engine.check_alert_conditions_at(Utc::now()).await;
        let alert = &h.engine.alerts(&AlertFilter::default()).await[0];
        let responses = h.engine.responses_for(&alert.id).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, ResponseStatus::Skipped);
        assert!(h.engine.pending_retries().await.is_empty());
    }

    #[tokio::test]
    async fn test_successful_action_can_resolve_alert() {
        let h = harness();
        let mut rule = build_time_rule(1.0, 0);
        rule.auto_response = true;
        rule.response_actions = vec![
            AlertAction::new(
                "manual-override",
                ActionKind::Campaign {
                    campaign: "override".to_string(),
                    parameters: Default::default(),
                },
            )
            .on_success(AlertTransition::Resolve),
        ];
        only_rules(&h.engine, vec![rule]).await;
        h.metrics.update(|s| s.performance.average_build_time = 5.0);

        h.engine.check_alert_conditions_at(Utc::now()).await;
        let alert = &h.engine.alerts(&AlertFilter::default()).await[0];
        assert!(alert.resolved);
    }

    #[tokio::test]
    async fn test_subscribers_are_isolated() {
        let h = harness();
        let seen = Arc::new(AtomicUsize::new(0));

        let failing = h.engine.subscribe(Arc::new(|_alert: &Alert| anyhow::bail!("subscriber down")));
        h.engine.subscribe(Arc::new(|_alert: &Alert| panic!("subscriber exploded")));
        let counter = seen.clone();
        let counting = h.engine.subscribe(Arc::new(move |_alert: &Alert| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        h.engine.test_alert("code-quality-low").await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(h.engine.unsubscribe(counting));
        assert!(!h.engine.unsubscribe(counting));
        h.engine.test_alert("code-quality-low").await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(h.engine.unsubscribe(failing));
    }

    #[tokio::test]
    async fn test_metric_adapter_failure_only_skips_its_rules() {
        struct BrokenErrors;
        impl crate::metrics::ErrorTracker for BrokenErrors {
            fn error_summary(&self) -> Result<crate::metrics::ErrorSummary> {
                anyhow::bail!("error tracker offline")
            }
        }

        let dir = TempDir::new().unwrap();
        let metrics = Arc::new(SnapshotMetrics::in_memory(MetricsSnapshot::default()));
        metrics.update(|s| s.performance.average_build_time = 5.0);
        let adapters = MetricAdapters::new(
            metrics.clone(),
            Arc::new(BrokenErrors),
            metrics.clone(),
            metrics.clone(),
        );
        let engine = AlertingSystem::new(adapters, AlertStore::new(dir.path().join("state.json")))
            .with_notifier(NotificationDispatcher::new(false));

        let mut error_rule = build_time_rule(1.0, 0);
        error_rule.id = "errors".to_string();
        error_rule.category = AlertCategory::Error;
        error_rule.metric = "typescript_errors".to_string();
        only_rules(&engine, vec![error_rule, build_time_rule(1.0, 0)]).await;

        assert_eq!(engine.check_alert_conditions_at(Utc::now()).await, 1);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let h = harness();
        let _held = h.engine.try_begin_tick().unwrap();
        let report = h.engine.run_tick_at(Utc::now()).await;
        assert!(report.skipped);
        drop(_held);

        let report = h.engine.run_tick_at(Utc::now()).await;
        assert!(!report.skipped);
    }

    #[tokio::test]
    async fn test_metric_update_checks_only_that_category() {
        let h = harness();
        let mut quality_rule = build_time_rule(1.0, 0);
        quality_rule.id = "quality".to_string();
        quality_rule.category = AlertCategory::Quality;
        quality_rule.metric = "technical_debt_score".to_string();
        only_rules(&h.engine, vec![build_time_rule(1.0, 0), quality_rule]).await;
        h.metrics.update(|s| {
            s.performance.average_build_time = 5.0;
            s.quality.technical_debt_score = 5.0;
        });

        let observed_at = Utc::now() - Duration::seconds(30);
        let created = h
            .engine
            .handle_metric_update(MetricUpdate {
                category: AlertCategory::Quality,
                observed_at,
            })
            .await;
        assert_eq!(created, 1);
        let alerts = h.engine.alerts(&AlertFilter::default()).await;
        assert_eq!(alerts[0].category, AlertCategory::Quality);
        assert_eq!(alerts[0].created_at, observed_at);
    }

    #[tokio::test]
    async fn test_rule_crud() {
        let h = harness();

        let mut rule = build_time_rule(5.0, 0);
        rule.id = String::new();
        let id = h.engine.add_alert_rule(rule.clone()).await.unwrap();
        assert!(id.starts_with("rule-"));

        rule.id = id.clone();
        assert!(h.engine.add_alert_rule(rule).await.is_err());

        assert!(h.engine.update_alert_rule(&id, AlertRuleUpdate::enabled(false)).await);
        let stored = h.engine.alert_rules().await.into_iter().find(|r| r.id == id).unwrap();
        assert!(!stored.enabled);
        assert!(!h.engine.update_alert_rule("missing", AlertRuleUpdate::default()).await);

        assert!(h.engine.delete_alert_rule(&id).await);
        assert!(!h.engine.delete_alert_rule(&id).await);
        assert_eq!(h.engine.alert_rules().await.len(), 5);
    }

    #[tokio::test]
    async fn test_reset_clears_state_and_file() {
        let h = harness();
        h.engine.test_alert("build-time-critical").await.unwrap();
        h.engine.delete_alert_rule("code-quality-low").await;
        assert!(h.engine.store.path().exists());

        h.engine.reset().await;
        assert!(h.engine.alerts(&AlertFilter::default()).await.is_empty());
        assert_eq!(h.engine.alert_rules().await.len(), 5);
        assert!(!h.engine.store.path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_start_and_stop() {
        let h = harness();
        let engine = Arc::new(h.engine);
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = engine.start(Some(rx));
        tx.send(MetricUpdate::now(AlertCategory::Quality)).unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        engine.stop();
        handle.await.unwrap();
        assert!(engine.store.path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_survives_zero_intervals() {
        let h = harness();
        let engine = Arc::new(h.engine.with_settings(EngineSettings {
            check_interval: std::time::Duration::ZERO,
            retry_poll_interval: std::time::Duration::ZERO,
            ..EngineSettings::default()
        }));

        let handle = engine.start(None);
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        engine.stop();

        assert!(handle.await.is_ok());
        assert!(engine.store.path().exists());
    }

    #[tokio::test]
    async fn test_huge_escalation_delay_never_escalates() {
        let h = harness();
        for rule in h.engine.state.write().await.escalation_rules.iter_mut() {
            rule.escalation_delay_minutes = u64::MAX;
        }
        let alert = h.engine.test_alert("build-time-critical").await.unwrap();

        let later = alert.created_at + Duration::days(36_500);
        assert_eq!(h.engine.process_escalations_at(later).await, 0);
    }

    #[tokio::test]
    async fn test_resolve_from_another_process_survives_next_tick() {
        let h = harness();
        let alert = h.engine.test_alert("build-time-critical").await.unwrap();

        // A second engine over the same file, as `alchm-alerts resolve` builds
        let cli = AlertingSystem::new(
            MetricAdapters::new(
                h.metrics.clone(),
                h.metrics.clone(),
                h.metrics.clone(),
                h.metrics.clone(),
            ),
            AlertStore::new(h.engine.store.path().to_path_buf()),
        )
        .with_notifier(NotificationDispatcher::new(false));
        assert!(cli.acknowledge_alert(&alert.id).await);
        assert!(cli.resolve_alert(&alert.id).await);

        let report = h.engine.run_tick_at(alert.created_at + Duration::hours(2)).await;
        assert_eq!(report.alerts_escalated, 0);

        let in_memory = h.engine.alert(&alert.id).await.unwrap();
        assert!(in_memory.resolved && in_memory.acknowledged);

        let persisted = h.engine.store.load().unwrap().unwrap();
        let on_disk = persisted.alerts.iter().find(|a| a.id == alert.id).unwrap();
        assert!(on_disk.resolved);
        assert_eq!(on_disk.resolved_at, in_memory.resolved_at);
    }
}
