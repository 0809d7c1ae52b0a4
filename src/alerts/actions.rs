use crate::alerts::conditions::{ActionCondition, conditions_met};
use crate::alerts::notifications::NotificationChannel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A unit of automated response to an alert. Stateless: the same action is
/// executed against many alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertAction {
    pub name: String,
    pub kind: ActionKind,
    #[serde(default)]
    pub conditions: Vec<ActionCondition>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Lifecycle transition applied to the alert when the action succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<AlertTransition>,
}

fn default_timeout_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTransition {
    Acknowledge,
    Resolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Run a script file, optionally through an interpreter (`sh`, `node`, ...).
    Script {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interpreter: Option<String>,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Run a shell command line.
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    ApiCall {
        url: String,
        #[serde(default = "default_method")]
        method: HttpMethod,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
    },
    /// Ask the campaign system to start a remediation campaign.
    Campaign {
        campaign: String,
        #[serde(default)]
        parameters: BTreeMap<String, serde_json::Value>,
    },
    Notification {
        channels: Vec<NotificationChannel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

fn default_method() -> HttpMethod {
    HttpMethod::Post
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Script { .. } => "script",
            ActionKind::Command { .. } => "command",
            ActionKind::ApiCall { .. } => "api_call",
            ActionKind::Campaign { .. } => "campaign",
            ActionKind::Notification { .. } => "notification",
        }
    }
}

impl AlertAction {
    pub fn new(name: &str, kind: ActionKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            conditions: Vec::new(),
            retry_count: 0,
            timeout_seconds: default_timeout_seconds(),
            on_success: None,
        }
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_condition(mut self, condition: ActionCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn on_success(mut self, transition: AlertTransition) -> Self {
        self.on_success = Some(transition);
        self
    }

    pub fn should_run(&self, observed: f64) -> bool {
        conditions_met(&self.conditions, observed)
    }
}
