use crate::alerts::{
    Alert, AlertResponse, AlertRule, AlertSummary, EscalationRule, ResponseStatus, Severity,
    TickReport,
};
use crate::utils::{DateFormatter, format_minutes};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Trait for items that can be displayed as tables or JSON
pub trait OutputFormat {
    fn to_table(&self, dates: &DateFormatter, colored: bool) -> String;
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

/// Row for the alert list
#[derive(Tabled, Serialize, Debug)]
pub struct AlertRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Type")]
    pub category: String,
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Threshold")]
    pub threshold: String,
    #[tabled(rename = "Created")]
    pub created: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

/// Row for the alert rule list
#[derive(Tabled, Serialize, Debug)]
pub struct RuleRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Type")]
    pub category: String,
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Condition")]
    pub condition: String,
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[tabled(rename = "Cooldown")]
    pub cooldown: String,
    #[tabled(rename = "Escalate After")]
    pub escalate_after: String,
    #[tabled(rename = "Auto")]
    pub auto_response: String,
    #[tabled(rename = "Enabled")]
    pub enabled: String,
    #[tabled(rename = "Actions")]
    pub actions: String,
}

/// Row for the escalation rule list
#[derive(Tabled, Serialize, Debug)]
pub struct EscalationRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Type")]
    pub category: String,
    #[tabled(rename = "Severities")]
    pub severities: String,
    #[tabled(rename = "Delay")]
    pub delay: String,
    #[tabled(rename = "Actions")]
    pub actions: String,
}

/// Row for an alert's action attempts
#[derive(Tabled, Serialize, Debug)]
pub struct ResponseRow {
    #[tabled(rename = "Action")]
    pub action: String,
    #[tabled(rename = "Attempt")]
    pub attempt: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Started")]
    pub started: String,
    #[tabled(rename = "Completed")]
    pub completed: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

/// Two-column key/value row used for summaries and reports
#[derive(Tabled, Serialize, Debug)]
pub struct StatRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl StatRow {
    fn new(metric: impl Into<String>, value: impl ToString) -> Self {
        Self {
            metric: metric.into(),
            value: value.to_string(),
        }
    }
}

impl AlertRow {
    pub fn from_alert(alert: &Alert, dates: &DateFormatter, colored: bool) -> Self {
        Self {
            id: alert.id.clone(),
            category: alert.category.to_string(),
            severity: paint_severity(alert.severity, colored),
            title: alert.title.clone(),
            value: format_value(alert.current_value),
            threshold: format_value(alert.threshold),
            created: dates.format(&alert.created_at),
            status: alert_status(alert).to_string(),
        }
    }
}

impl RuleRow {
    pub fn from_rule(rule: &AlertRule, colored: bool) -> Self {
        Self {
            id: rule.id.clone(),
            category: rule.category.to_string(),
            metric: rule.metric.clone(),
            condition: format!("{} {}", rule.condition, format_value(rule.threshold)),
            severity: paint_severity(rule.severity, colored),
            cooldown: format_minutes(rule.cooldown_minutes as f64),
            escalate_after: format_minutes(rule.escalation_delay_minutes as f64),
            auto_response: yes_no(rule.auto_response),
            enabled: yes_no(rule.enabled),
            actions: join_or_dash(rule.action_names()),
        }
    }
}

impl EscalationRow {
    pub fn from_rule(rule: &EscalationRule) -> Self {
        Self {
            id: rule.id.clone(),
            category: rule.category.to_string(),
            severities: rule
                .severities
                .iter()
                .map(Severity::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            delay: format_minutes(rule.escalation_delay_minutes as f64),
            actions: join_or_dash(rule.escalation_actions.iter().map(|a| a.name.clone()).collect()),
        }
    }
}

impl ResponseRow {
    pub fn from_response(response: &AlertResponse, dates: &DateFormatter, colored: bool) -> Self {
        let detail = match (&response.error, &response.result) {
            (Some(error), _) => error.clone(),
            (None, Some(result)) => result.to_string(),
            (None, None) => "-".to_string(),
        };

        Self {
            action: response.action_name.clone(),
            attempt: (response.retry_count + 1).to_string(),
            status: paint_status(response.status, colored),
            started: dates.format(&response.started_at),
            completed: dates.format_optional(response.completed_at.as_ref()),
            detail: truncate(&detail, 60),
        }
    }
}

impl OutputFormat for Vec<Alert> {
    fn to_table(&self, dates: &DateFormatter, colored: bool) -> String {
        if self.is_empty() {
            return "No alerts found.".to_string();
        }

        let rows: Vec<AlertRow> = self
            .iter()
            .map(|alert| AlertRow::from_alert(alert, dates, colored))
            .collect();

        styled(Table::new(rows), colored)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl OutputFormat for Vec<AlertRule> {
    fn to_table(&self, _dates: &DateFormatter, colored: bool) -> String {
        if self.is_empty() {
            return "No alert rules configured.".to_string();
        }

        let rows: Vec<RuleRow> = self.iter().map(|rule| RuleRow::from_rule(rule, colored)).collect();

        styled(Table::new(rows), colored)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl OutputFormat for Vec<EscalationRule> {
    fn to_table(&self, _dates: &DateFormatter, colored: bool) -> String {
        if self.is_empty() {
            return "No escalation rules configured.".to_string();
        }

        let rows: Vec<EscalationRow> = self.iter().map(EscalationRow::from_rule).collect();

        styled(Table::new(rows), colored)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl OutputFormat for Vec<AlertResponse> {
    fn to_table(&self, dates: &DateFormatter, colored: bool) -> String {
        if self.is_empty() {
            return "No responses recorded for this alert.".to_string();
        }

        let rows: Vec<ResponseRow> = self
            .iter()
            .map(|response| ResponseRow::from_response(response, dates, colored))
            .collect();

        styled(Table::new(rows), colored)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl OutputFormat for AlertSummary {
    fn to_table(&self, _dates: &DateFormatter, colored: bool) -> String {
        let mut rows = vec![
            StatRow::new("Total alerts", self.total_alerts),
            StatRow::new("Active", self.active_alerts),
            StatRow::new("Acknowledged", self.acknowledged_alerts),
            StatRow::new("Resolved", self.resolved_alerts),
            StatRow::new("Escalated", self.escalated_alerts),
        ];
        rows.extend(
            self.alerts_by_category
                .iter()
                .map(|(category, count)| StatRow::new(format!("Type: {}", category), count)),
        );
        rows.extend(
            self.alerts_by_severity
                .iter()
                .map(|(severity, count)| StatRow::new(format!("Severity: {}", severity), count)),
        );
        rows.push(StatRow::new("Responses", self.total_responses));
        rows.push(StatRow::new(
            "Response success rate",
            format!("{:.1}%", self.response_success_rate),
        ));
        rows.push(StatRow::new(
            "Average resolution",
            format_minutes(self.average_resolution_minutes),
        ));

        styled(Table::new(rows), colored)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl OutputFormat for TickReport {
    fn to_table(&self, _dates: &DateFormatter, colored: bool) -> String {
        if self.skipped {
            return "Skipped: another alerting pass is still running.".to_string();
        }

        let rows = vec![
            StatRow::new("Alerts created", self.alerts_created),
            StatRow::new("Alerts escalated", self.alerts_escalated),
            StatRow::new("Retries run", self.retries_run),
            StatRow::new("Alerts pruned", self.alerts_pruned),
        ];

        styled(Table::new(rows), colored)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn styled(mut table: Table, colored: bool) -> String {
    if colored {
        table.with(Style::rounded());
    } else {
        table.with(Style::ascii());
    }
    table.to_string()
}

fn alert_status(alert: &Alert) -> &'static str {
    if alert.resolved {
        "resolved"
    } else if alert.escalated {
        "escalated"
    } else if alert.acknowledged {
        "acknowledged"
    } else {
        "active"
    }
}

fn paint_severity(severity: Severity, colored: bool) -> String {
    if !colored {
        return severity.to_string();
    }
    let code = match severity {
        Severity::Critical => "1;31",
        Severity::High => "31",
        Severity::Medium => "33",
        Severity::Low => "36",
    };
    format!("\x1b[{}m{}\x1b[0m", code, severity)
}

fn paint_status(status: ResponseStatus, colored: bool) -> String {
    let label = serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    if !colored {
        return label;
    }
    let code = match status {
        ResponseStatus::Completed => "32",
        ResponseStatus::Failed => "31",
        ResponseStatus::Skipped => "90",
        ResponseStatus::Pending | ResponseStatus::Running => "33",
    };
    format!("\x1b[{}m{}\x1b[0m", code, label)
}

/// Format a metric value, dropping the fraction for whole numbers
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

fn yes_no(flag: bool) -> String {
    let label = if flag { "yes" } else { "no" };
    label.to_string()
}

fn join_or_dash(items: Vec<String>) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    shortened.push_str("...");
    shortened
}
