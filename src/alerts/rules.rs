use crate::alerts::actions::{ActionKind, AlertAction, AlertTransition};
use crate::alerts::conditions::{ActionCondition, Comparator, ConditionOperator};
use crate::alerts::notifications::NotificationChannel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Performance,
    Error,
    Quality,
    System,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 4] = [
        AlertCategory::Performance,
        AlertCategory::Error,
        AlertCategory::Quality,
        AlertCategory::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Performance => "performance",
            AlertCategory::Error => "error",
            AlertCategory::Quality => "quality",
            AlertCategory::System => "system",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "performance" => Ok(AlertCategory::Performance),
            "error" => Ok(AlertCategory::Error),
            "quality" => Ok(AlertCategory::Quality),
            "system" => Ok(AlertCategory::System),
            _ => anyhow::bail!(
                "Unknown alert category: {}. Must be performance, error, quality or system",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => anyhow::bail!(
                "Unknown severity: {}. Must be low, medium, high or critical",
                s
            ),
        }
    }
}

/// A named threshold policy over one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub category: AlertCategory,
    pub metric: String,
    pub condition: Comparator,
    pub threshold: f64,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub cooldown_minutes: u64,
    /// Advisory, shown in rule listings. Escalation timing comes from the
    /// matching [`EscalationRule`].
    #[serde(default)]
    pub escalation_delay_minutes: u64,
    #[serde(default)]
    pub auto_response: bool,
    #[serde(default)]
    pub response_actions: Vec<AlertAction>,
    #[serde(default)]
    pub notification_channels: Vec<NotificationChannel>,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    pub fn should_fire(&self, value: f64) -> bool {
        self.enabled && self.condition.evaluate(value, self.threshold)
    }

    pub fn action_names(&self) -> Vec<String> {
        self.response_actions.iter().map(|a| a.name.clone()).collect()
    }

    /// Merge a partial update into this rule. The id never changes.
    pub fn apply_update(&mut self, update: AlertRuleUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(metric) = update.metric {
            self.metric = metric;
        }
        if let Some(condition) = update.condition {
            self.condition = condition;
        }
        if let Some(threshold) = update.threshold {
            self.threshold = threshold;
        }
        if let Some(severity) = update.severity {
            self.severity = severity;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(cooldown) = update.cooldown_minutes {
            self.cooldown_minutes = cooldown;
        }
        if let Some(delay) = update.escalation_delay_minutes {
            self.escalation_delay_minutes = delay;
        }
        if let Some(auto_response) = update.auto_response {
            self.auto_response = auto_response;
        }
        if let Some(actions) = update.response_actions {
            self.response_actions = actions;
        }
        if let Some(channels) = update.notification_channels {
            self.notification_channels = channels;
        }
    }
}

/// Partial rule used by `update_alert_rule`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub category: Option<AlertCategory>,
    pub metric: Option<String>,
    pub condition: Option<Comparator>,
    pub threshold: Option<f64>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    pub cooldown_minutes: Option<u64>,
    pub escalation_delay_minutes: Option<u64>,
    pub auto_response: Option<bool>,
    pub response_actions: Option<Vec<AlertAction>>,
    pub notification_channels: Option<Vec<NotificationChannel>>,
}

impl AlertRuleUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }
}

/// Maps a category and a set of severities to delayed escalation actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRule {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: AlertCategory,
    pub severities: Vec<Severity>,
    pub escalation_delay_minutes: u64,
    #[serde(default)]
    pub escalation_actions: Vec<AlertAction>,
    #[serde(default = "default_max_escalations")]
    pub max_escalations: u32,
}

fn default_max_escalations() -> u32 {
    1
}

impl EscalationRule {
    pub fn matches(&self, category: AlertCategory, severity: Severity) -> bool {
        self.category == category && self.severities.contains(&severity)
    }
}

fn script(name: &str, path: &str) -> AlertAction {
    AlertAction::new(
        name,
        ActionKind::Script {
            path: PathBuf::from(path),
            interpreter: Some("sh".to_string()),
            args: Vec::new(),
        },
    )
}

fn campaign(name: &str, campaign: &str) -> AlertAction {
    AlertAction::new(
        name,
        ActionKind::Campaign {
            campaign: campaign.to_string(),
            parameters: BTreeMap::new(),
        },
    )
}

fn notify(name: &str, channels: Vec<NotificationChannel>, message: &str) -> AlertAction {
    AlertAction::new(
        name,
        ActionKind::Notification {
            channels,
            message: Some(message.to_string()),
        },
    )
}

/// Rules seeded on first run when no persisted rules exist.
pub fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            id: "build-time-critical".to_string(),
            name: "Critical Build Time".to_string(),
            description: "Build time exceeds the critical threshold".to_string(),
            category: AlertCategory::Performance,
            metric: "build_time".to_string(),
            condition: Comparator::GreaterThan,
            threshold: 60.0, // seconds
            severity: Severity::Critical,
            enabled: true,
            cooldown_minutes: 15,
            escalation_delay_minutes: 30,
            auto_response: true,
            response_actions: vec![
                script("clear-build-cache", "scripts/clear-build-cache.sh")
                    .with_retries(2)
                    .with_timeout(120),
                campaign("optimize-build", "build-optimization").with_timeout(300),
            ],
            notification_channels: vec![NotificationChannel::Console, NotificationChannel::File],
        },
        AlertRule {
            id: "typescript-errors-high".to_string(),
            name: "High TypeScript Error Count".to_string(),
            description: "TypeScript error count exceeds the acceptable threshold".to_string(),
            category: AlertCategory::Error,
            metric: "typescript_errors".to_string(),
            condition: Comparator::GreaterThan,
            threshold: 100.0,
            severity: Severity::High,
            enabled: true,
            cooldown_minutes: 30,
            escalation_delay_minutes: 60,
            auto_response: true,
            response_actions: vec![
                campaign("typescript-error-reduction", "typescript-error-elimination")
                    .with_condition(ActionCondition::new(
                        "typescript_errors",
                        ConditionOperator::GreaterThan,
                        500.0,
                    ))
                    .with_retries(1)
                    .with_timeout(600),
            ],
            notification_channels: vec![NotificationChannel::Console, NotificationChannel::File],
        },
        AlertRule {
            id: "code-quality-low".to_string(),
            name: "Low Code Quality Score".to_string(),
            description: "Code quality score dropped below the acceptable level".to_string(),
            category: AlertCategory::Quality,
            metric: "code_quality_score".to_string(),
            condition: Comparator::LessThan,
            threshold: 70.0,
            severity: Severity::Medium,
            enabled: true,
            cooldown_minutes: 60,
            escalation_delay_minutes: 120,
            auto_response: false,
            response_actions: vec![campaign("lint-cleanup", "linting-excellence")],
            notification_channels: vec![NotificationChannel::Console],
        },
        AlertRule {
            id: "memory-usage-high".to_string(),
            name: "High Memory Usage".to_string(),
            description: "Process memory usage is above the safe limit".to_string(),
            category: AlertCategory::System,
            metric: "memory_usage".to_string(),
            condition: Comparator::GreaterThan,
            threshold: 1024.0, // MB
            severity: Severity::High,
            enabled: true,
            cooldown_minutes: 10,
            escalation_delay_minutes: 20,
            auto_response: true,
            response_actions: vec![
                notify(
                    "memory-warning",
                    vec![NotificationChannel::Log],
                    "Memory usage is high, consider restarting the service",
                )
                .with_timeout(30),
            ],
            notification_channels: vec![NotificationChannel::Console, NotificationChannel::File],
        },
        AlertRule {
            id: "technical-debt-critical".to_string(),
            name: "Critical Technical Debt".to_string(),
            description: "Technical debt score has reached a critical level".to_string(),
            category: AlertCategory::Quality,
            metric: "technical_debt_score".to_string(),
            condition: Comparator::GreaterThan,
            threshold: 80.0,
            severity: Severity::Critical,
            enabled: true,
            cooldown_minutes: 240,
            escalation_delay_minutes: 480,
            auto_response: false,
            response_actions: vec![
                campaign("debt-reduction", "technical-debt-reduction")
                    .on_success(AlertTransition::Acknowledge),
            ],
            notification_channels: vec![NotificationChannel::Console, NotificationChannel::File],
        },
    ]
}

pub fn default_escalation_rules() -> Vec<EscalationRule> {
    let mut rules: Vec<EscalationRule> = AlertCategory::ALL
        .iter()
        .map(|category| EscalationRule {
            id: format!("{}-critical-escalation", category),
            name: format!("Critical {} escalation", category),
            category: *category,
            severities: vec![Severity::Critical],
            escalation_delay_minutes: 30,
            escalation_actions: vec![notify(
                "escalation-notice",
                vec![NotificationChannel::Console, NotificationChannel::Log],
                "Critical alert unresolved past its escalation delay",
            )],
            max_escalations: 3,
        })
        .collect();

    rules.push(EscalationRule {
        id: "error-high-escalation".to_string(),
        name: "High error escalation".to_string(),
        category: AlertCategory::Error,
        severities: vec![Severity::High],
        escalation_delay_minutes: 60,
        escalation_actions: vec![
            campaign("emergency-error-campaign", "emergency-error-reduction").with_timeout(900),
        ],
        max_escalations: 2,
    });

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(condition: Comparator, threshold: f64) -> AlertRule {
        let mut rule = default_alert_rules().remove(0);
        rule.condition = condition;
        rule.threshold = threshold;
        rule
    }

    #[test]
    fn test_default_rule_ids() {
        let ids: Vec<String> = default_alert_rules().into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                "build-time-critical",
                "typescript-errors-high",
                "code-quality-low",
                "memory-usage-high",
                "technical-debt-critical",
            ]
        );
    }

    #[test]
    fn test_should_fire_respects_enabled() {
        let mut rule = rule(Comparator::GreaterThan, 100.0);
        assert!(rule.should_fire(150.0));
        assert!(!rule.should_fire(100.0));

        rule.enabled = false;
        assert!(!rule.should_fire(1_000_000.0));
    }

    #[test]
    fn test_apply_update_keeps_id() {
        let mut rule = rule(Comparator::GreaterThan, 100.0);
        rule.apply_update(AlertRuleUpdate {
            threshold: Some(250.0),
            severity: Some(Severity::Low),
            ..Default::default()
        });
        assert_eq!(rule.id, "build-time-critical");
        assert_eq!(rule.threshold, 250.0);
        assert_eq!(rule.severity, Severity::Low);
        assert_eq!(rule.cooldown_minutes, 15);
    }

    #[test]
    fn test_escalation_rule_matching() {
        let rules = default_escalation_rules();
        let critical_perf = rules
            .iter()
            .find(|r| r.matches(AlertCategory::Performance, Severity::Critical));
        assert!(critical_perf.is_some());
        assert!(
            !rules
                .iter()
                .any(|r| r.matches(AlertCategory::Quality, Severity::Medium))
        );
        assert!(
            rules
                .iter()
                .any(|r| r.matches(AlertCategory::Error, Severity::High))
        );
    }

    #[test]
    fn test_category_and_severity_parsing() {
        assert_eq!("Quality".parse::<AlertCategory>().unwrap(), AlertCategory::Quality);
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("urgent".parse::<Severity>().is_err());
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn test_rule_json_uses_type_key() {
        let json = serde_json::to_string(&default_alert_rules()[2]).unwrap();
        assert!(json.contains(r#""type":"quality""#));
        assert!(json.contains(r#""condition":"less_than""#));
        assert!(json.contains(r#""cooldownMinutes":60"#));
    }
}
