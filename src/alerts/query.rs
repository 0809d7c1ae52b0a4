use crate::alerts::alert::{Alert, AlertResponse, ResponseStatus};
use crate::alerts::rules::{AlertCategory, Severity};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub category: Option<AlertCategory>,
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        self.category.is_none_or(|c| alert.category == c)
            && self.severity.is_none_or(|s| alert.severity == s)
            && self.resolved.is_none_or(|r| alert.resolved == r)
    }

    /// Matching alerts, newest first, truncated to `limit`.
    pub fn apply(&self, alerts: &[Alert]) -> Vec<Alert> {
        let mut matching: Vec<Alert> = alerts.iter().filter(|a| self.matches(a)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = self.limit {
            matching.truncate(limit);
        }
        matching
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub active_alerts: usize,
    pub acknowledged_alerts: usize,
    pub resolved_alerts: usize,
    pub escalated_alerts: usize,
    pub alerts_by_category: BTreeMap<AlertCategory, usize>,
    pub alerts_by_severity: BTreeMap<Severity, usize>,
    pub total_responses: usize,
    /// Completed responses as a percentage of finished (completed or failed) ones.
    pub response_success_rate: f64,
    pub average_resolution_minutes: f64,
}

impl AlertSummary {
    pub fn compute(alerts: &[Alert], responses: &[AlertResponse]) -> Self {
        let mut alerts_by_category: BTreeMap<AlertCategory, usize> =
            AlertCategory::ALL.iter().map(|c| (*c, 0)).collect();
        let mut alerts_by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();

        for alert in alerts {
            *alerts_by_category.entry(alert.category).or_insert(0) += 1;
            *alerts_by_severity.entry(alert.severity).or_insert(0) += 1;
        }

        let completed = responses
            .iter()
            .filter(|r| r.status == ResponseStatus::Completed)
            .count();
        let failed = responses
            .iter()
            .filter(|r| r.status == ResponseStatus::Failed)
            .count();
        let response_success_rate = if completed + failed > 0 {
            completed as f64 / (completed + failed) as f64 * 100.0
        } else {
            0.0
        };

        let resolution_times: Vec<f64> = alerts.iter().filter_map(Alert::resolution_minutes).collect();
        let average_resolution_minutes = if resolution_times.is_empty() {
            0.0
        } else {
            resolution_times.iter().sum::<f64>() / resolution_times.len() as f64
        };

        Self {
            total_alerts: alerts.len(),
            active_alerts: alerts.iter().filter(|a| a.is_active()).count(),
            acknowledged_alerts: alerts.iter().filter(|a| a.acknowledged).count(),
            resolved_alerts: alerts.iter().filter(|a| a.resolved).count(),
            escalated_alerts: alerts.iter().filter(|a| a.escalated).count(),
            alerts_by_category,
            alerts_by_severity,
            total_responses: responses.len(),
            response_success_rate,
            average_resolution_minutes,
        }
    }
}
