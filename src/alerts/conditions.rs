use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::warn;

/// Comparison applied between a sampled metric and a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    GreaterThan,
    LessThan,
    Equals,
    NotEquals,
    /// Needs historical samples, which the engine does not keep yet.
    /// Never fires.
    PercentageChange,
}

impl Comparator {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold,
            Comparator::LessThan => value < threshold,
            Comparator::Equals => value == threshold,
            Comparator::NotEquals => value != threshold,
            Comparator::PercentageChange => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::GreaterThan => "greater_than",
            Comparator::LessThan => "less_than",
            Comparator::Equals => "equals",
            Comparator::NotEquals => "not_equals",
            Comparator::PercentageChange => "percentage_change",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `None` when the span does not fit a `chrono::Duration`.
pub fn minutes_span(minutes: u64) -> Option<Duration> {
    i64::try_from(minutes).ok().and_then(Duration::try_minutes)
}

/// True once `since + minutes` has been reached. Spans too large to represent
/// never elapse.
pub fn minutes_elapsed(since: DateTime<Utc>, minutes: u64, now: DateTime<Utc>) -> bool {
    minutes_span(minutes).is_some_and(|span| now - since >= span)
}

/// Cooldown gate for a rule. Eligible again at exactly `last_fired + cooldown`.
pub fn cooldown_elapsed(
    last_fired: Option<DateTime<Utc>>,
    cooldown_minutes: u64,
    now: DateTime<Utc>,
) -> bool {
    match last_fired {
        Some(last) => minutes_elapsed(last, cooldown_minutes, now),
        None => true,
    }
}

/// Operators accepted by action preconditions. A superset of [`Comparator`]
/// without the historical variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equals,
    NotEquals,
}

impl ConditionOperator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterOrEqual),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessOrEqual),
            "==" | "=" => Some(Self::Equals),
            "!=" => Some(Self::NotEquals),
            _ => None,
        }
    }

    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            Self::GreaterThan => left > right,
            Self::GreaterOrEqual => left >= right,
            Self::LessThan => left < right,
            Self::LessOrEqual => left <= right,
            Self::Equals => left == right,
            Self::NotEquals => left != right,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Equals => "==",
            Self::NotEquals => "!=",
        }
    }
}

/// Precondition gating an action: `metric operator value`.
///
/// The metric is a label for the alert's observed value; the predicate is
/// checked against `Alert::current_value`. Deserializes from either the
/// structured form or a legacy string such as `"error_count > 500"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConditionRepr", into = "ConditionRepr")]
pub enum ActionCondition {
    Compare {
        metric: String,
        operator: ConditionOperator,
        value: f64,
    },
    /// Legacy text that does not parse. Never holds, and is written back as-is.
    Unparsed(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ConditionRepr {
    Legacy(String),
    Structured {
        metric: String,
        operator: ConditionOperator,
        value: f64,
    },
}

impl From<ConditionRepr> for ActionCondition {
    fn from(repr: ConditionRepr) -> Self {
        match repr {
            ConditionRepr::Legacy(text) => text.parse().unwrap_or_else(|e| {
                warn!("Keeping unparseable action condition, its action will be skipped: {:#}", e);
                Self::Unparsed(text)
            }),
            ConditionRepr::Structured { metric, operator, value } => Self::Compare {
                metric,
                operator,
                value,
            },
        }
    }
}

impl From<ActionCondition> for ConditionRepr {
    fn from(condition: ActionCondition) -> Self {
        match condition {
            ActionCondition::Compare { metric, operator, value } => {
                ConditionRepr::Structured { metric, operator, value }
            }
            ActionCondition::Unparsed(text) => ConditionRepr::Legacy(text),
        }
    }
}

impl ActionCondition {
    pub fn new(metric: &str, operator: ConditionOperator, value: f64) -> Self {
        Self::Compare {
            metric: metric.to_string(),
            operator,
            value,
        }
    }

    pub fn holds(&self, observed: f64) -> bool {
        match self {
            Self::Compare { operator, value, .. } => operator.apply(observed, *value),
            Self::Unparsed(_) => false,
        }
    }
}

static LEGACY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(>=|<=|==|!=|=|>|<)\s*(-?[0-9]+(?:\.[0-9]+)?)\s*$").ok()
});

impl FromStr for ActionCondition {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self> {
        let captures = LEGACY_PATTERN
            .as_ref()
            .and_then(|pattern| pattern.captures(text))
            .ok_or_else(|| anyhow!("Unrecognised action condition: '{}'", text))?;

        let operator = ConditionOperator::from_symbol(&captures[2])
            .ok_or_else(|| anyhow!("Unsupported operator in condition: '{}'", text))?;
        let value: f64 = captures[3]
            .parse()
            .map_err(|e| anyhow!("Invalid number in condition '{}': {}", text, e))?;

        Ok(Self::Compare {
            metric: captures[1].to_string(),
            operator,
            value,
        })
    }
}

impl fmt::Display for ActionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { metric, operator, value } => {
                write!(f, "{} {} {}", metric, operator.symbol(), value)
            }
            Self::Unparsed(text) => write!(f, "unparsed '{}'", text),
        }
    }
}

/// True when every condition holds for the observed value. No conditions means run.
pub fn conditions_met(conditions: &[ActionCondition], observed: f64) -> bool {
    conditions.iter().all(|condition| condition.holds(observed))
}
