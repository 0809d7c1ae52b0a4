use crate::alerts::actions::AlertAction;
use crate::alerts::rules::{AlertCategory, AlertRule, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A triggered rule at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub category: AlertCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub threshold: f64,
    pub current_value: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub escalated: bool,
    #[serde(default)]
    pub escalated_at: Option<DateTime<Utc>>,
    /// Names of the rule's response actions, for auditing.
    #[serde(default)]
    pub response_actions: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    pub fn from_rule(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("ruleId".to_string(), serde_json::json!(rule.id));
        metadata.insert("metric".to_string(), serde_json::json!(rule.metric));
        metadata.insert("condition".to_string(), serde_json::json!(rule.condition.as_str()));

        Self {
            id: format!("alert-{}", Uuid::new_v4().simple()),
            category: rule.category,
            severity: rule.severity,
            title: rule.name.clone(),
            description: format!(
                "{} ({} {} {}, observed {})",
                rule.description, rule.metric, rule.condition, rule.threshold, value
            ),
            threshold: rule.threshold,
            current_value: value,
            created_at: now,
            acknowledged: false,
            acknowledged_at: None,
            resolved: false,
            resolved_at: None,
            escalated: false,
            escalated_at: None,
            response_actions: rule.action_names(),
            metadata,
        }
    }

    pub fn rule_id(&self) -> Option<&str> {
        self.metadata.get("ruleId").and_then(|v| v.as_str())
    }

    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        self.acknowledged = true;
        self.acknowledged_at = Some(now);
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(now);
    }

    pub fn escalate(&mut self, now: DateTime<Utc>) {
        self.escalated = true;
        self.escalated_at = Some(now);
    }

    /// Take acknowledged and resolved flags set on another copy of this alert.
    /// Flags only go from unset to set. Returns whether anything changed.
    pub fn merge_operator_flags(&mut self, other: &Alert) -> bool {
        let mut changed = false;
        if other.acknowledged && !self.acknowledged {
            self.acknowledged = true;
            self.acknowledged_at = other.acknowledged_at;
            changed = true;
        }
        if other.resolved && !self.resolved {
            self.resolved = true;
            self.resolved_at = other.resolved_at;
            changed = true;
        }
        changed
    }

    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    pub fn resolution_minutes(&self) -> Option<f64> {
        self.resolved_at
            .map(|resolved| (resolved - self.created_at).num_milliseconds() as f64 / 60_000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Preconditions did not hold; the action never ran.
    Skipped,
}

impl ResponseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseStatus::Completed | ResponseStatus::Failed | ResponseStatus::Skipped
        )
    }
}

/// Record of one execution attempt of one action against one alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResponse {
    pub id: String,
    pub alert_id: String,
    pub action_name: String,
    pub status: ResponseStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// 0 for the first attempt, n for the n-th retry.
    #[serde(default)]
    pub retry_count: u32,
}

impl AlertResponse {
    pub fn pending(alert_id: &str, action_name: &str, attempt: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("response-{}", Uuid::new_v4().simple()),
            alert_id: alert_id.to_string(),
            action_name: action_name.to_string(),
            status: ResponseStatus::Pending,
            started_at: now,
            completed_at: None,
            result: None,
            error: None,
            retry_count: attempt,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ResponseStatus::Running;
    }

    pub fn complete(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.status = ResponseStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, error: String, now: DateTime<Utc>) {
        self.status = ResponseStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
    }

    pub fn skip(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = ResponseStatus::Skipped;
        self.error = Some(reason);
        self.completed_at = Some(now);
    }
}

/// A failed action waiting for its next attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRetry {
    pub alert_id: String,
    pub action: AlertAction,
    pub attempt: u32,
    pub due_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerts::rules::default_alert_rules;
    use chrono::Duration;

    pub(crate) fn sample_alert() -> Alert {
        let rule = default_alert_rules().remove(0);
        Alert::from_rule(&rule, 75.0, Utc::now())
    }

    #[test]
    fn test_alert_from_rule_snapshot() {
        let rule = default_alert_rules().remove(0);
        let now = Utc::now();
        let alert = Alert::from_rule(&rule, 75.0, now);

        assert!(alert.id.starts_with("alert-"));
        assert_eq!(alert.category, AlertCategory::Performance);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.threshold, 60.0);
        assert_eq!(alert.current_value, 75.0);
        assert_eq!(alert.created_at, now);
        assert!(!alert.acknowledged && !alert.resolved && !alert.escalated);
        assert_eq!(alert.response_actions, vec!["clear-build-cache", "optimize-build"]);
        assert_eq!(alert.rule_id(), Some("build-time-critical"));
        assert_eq!(alert.metadata["metric"], "build_time");
    }

    #[test]
    fn test_merge_operator_flags_only_sets() {
        let mut local = sample_alert();
        let mut other = local.clone();
        let at = local.created_at + Duration::minutes(4);
        other.resolve(at);

        assert!(local.merge_operator_flags(&other));
        assert!(local.resolved && !local.acknowledged);
        assert_eq!(local.resolved_at, Some(at));
        assert!(!local.merge_operator_flags(&other));

        // An unresolved copy never clears the flag
        let stale = sample_alert();
        assert!(!local.merge_operator_flags(&stale));
        assert!(local.resolved);
    }

    #[test]
    fn test_acknowledge_does_not_resolve() {
        let mut alert = sample_alert();
        alert.acknowledge(Utc::now());
        assert!(alert.acknowledged);
        assert!(alert.acknowledged_at.is_some());
        assert!(!alert.resolved);
        assert!(alert.resolved_at.is_none());
    }

    #[test]
    fn test_resolution_minutes() {
        let mut alert = sample_alert();
        assert_eq!(alert.resolution_minutes(), None);
        alert.resolve(alert.created_at + Duration::minutes(45));
        assert!(alert.resolved);
        assert_eq!(alert.resolution_minutes(), Some(45.0));
    }

    #[test]
    fn test_response_transitions() {
        let now = Utc::now();
        let mut response = AlertResponse::pending("alert-1", "notify", 0, now);
        assert_eq!(response.status, ResponseStatus::Pending);
        assert!(!response.status.is_terminal());

        response.mark_running();
        assert_eq!(response.status, ResponseStatus::Running);

        response.fail("exit status 1".to_string(), now);
        assert!(response.status.is_terminal());
        assert_eq!(response.error.as_deref(), Some("exit status 1"));
        assert!(response.completed_at.is_some());
    }
}
