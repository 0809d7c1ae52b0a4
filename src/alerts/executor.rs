use crate::alerts::actions::{ActionKind, AlertAction, HttpMethod};
use crate::alerts::alert::Alert;
use crate::alerts::notifications::NotificationDispatcher;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action '{action}' timed out after {seconds}s")]
    Timeout { action: String, seconds: u64 },

    #[error("action '{action}' exited with status {code:?}: {stderr}")]
    NonZeroExit {
        action: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn action process: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Failed(String),
}

pub type ActionResult = Result<serde_json::Value, ActionError>;

/// Integration seam: performs the side effect an action describes.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &AlertAction, alert: &Alert) -> ActionResult;
}

/// Logs each action and reports success without touching anything.
#[derive(Debug, Default)]
pub struct DryRunRunner;

#[async_trait]
impl ActionRunner for DryRunRunner {
    async fn run(&self, action: &AlertAction, alert: &Alert) -> ActionResult {
        let target = match &action.kind {
            ActionKind::Script { path, .. } => path.display().to_string(),
            ActionKind::Command { command, .. } => command.clone(),
            ActionKind::ApiCall { url, .. } => url.clone(),
            ActionKind::Campaign { campaign, .. } => campaign.clone(),
            ActionKind::Notification { channels, .. } => channels
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(","),
        };

        info!(
            alert_id = %alert.id,
            action = %action.name,
            kind = action.kind.label(),
            "Dry run: would execute {}",
            target
        );

        Ok(json!({ "dryRun": true, "kind": action.kind.label(), "target": target }))
    }
}

/// Executes actions for real: processes, HTTP calls and notifications.
pub struct LiveRunner {
    client: reqwest::Client,
    notifier: NotificationDispatcher,
}

impl LiveRunner {
    pub fn new(notifier: NotificationDispatcher) -> Self {
        Self {
            client: reqwest::Client::new(),
            notifier,
        }
    }

    async fn run_process(&self, action: &AlertAction, alert: &Alert, mut command: Command) -> ActionResult {
        command
            .env("ALERT_ID", &alert.id)
            .env("ALERT_TYPE", alert.category.as_str())
            .env("ALERT_SEVERITY", alert.severity.as_str())
            .env("ALERT_THRESHOLD", alert.threshold.to_string())
            .env("ALERT_VALUE", alert.current_value.to_string())
            .kill_on_drop(true);

        let output = command.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() {
            return Err(ActionError::NonZeroExit {
                action: action.name.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(json!({ "exitCode": output.status.code(), "stdout": stdout }))
    }
}

#[async_trait]
impl ActionRunner for LiveRunner {
    async fn run(&self, action: &AlertAction, alert: &Alert) -> ActionResult {
        match &action.kind {
            ActionKind::Script { path, interpreter, args } => {
                let mut command = match interpreter {
                    Some(interpreter) => {
                        let mut command = Command::new(interpreter);
                        command.arg(path);
                        command
                    }
                    None => Command::new(path),
                };
                command.args(args);
                self.run_process(action, alert, command).await
            }
            ActionKind::Command { command: line, args } => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(line).arg("sh").args(args);
                self.run_process(action, alert, command).await
            }
            ActionKind::ApiCall { url, method, body } => {
                let request = match method {
                    HttpMethod::Get => self.client.get(url),
                    HttpMethod::Post => self.client.post(url),
                    HttpMethod::Put => self.client.put(url),
                };
                let payload = body.clone().unwrap_or_else(|| {
                    json!({
                        "alertId": alert.id,
                        "type": alert.category,
                        "severity": alert.severity,
                        "currentValue": alert.current_value,
                    })
                });
                let request = if matches!(method, HttpMethod::Get) {
                    request
                } else {
                    request.json(&payload)
                };

                let response = request.send().await?.error_for_status()?;
                let status = response.status().as_u16();
                Ok(json!({ "status": status }))
            }
            ActionKind::Campaign { campaign, parameters } => {
                // Campaigns run in a separate system; the request is the effect.
                info!(
                    alert_id = %alert.id,
                    campaign = %campaign,
                    "Requesting remediation campaign"
                );
                Ok(json!({ "campaign": campaign, "parameters": parameters, "status": "requested" }))
            }
            ActionKind::Notification { channels, message } => {
                let mut failures = Vec::new();
                for channel in channels {
                    if let Err(e) = self.notifier.send(*channel, alert, message.as_deref()).await {
                        failures.push(format!("{}: {:#}", channel, e));
                    }
                }
                if failures.is_empty() {
                    Ok(json!({ "channels": channels }))
                } else {
                    Err(ActionError::Failed(failures.join("; ")))
                }
            }
        }
    }
}

/// Races a runner against each action's timeout.
#[derive(Clone)]
pub struct ActionExecutor {
    runner: Arc<dyn ActionRunner>,
}

impl ActionExecutor {
    pub fn new(runner: Arc<dyn ActionRunner>) -> Self {
        Self { runner }
    }

    pub fn dry_run() -> Self {
        Self::new(Arc::new(DryRunRunner))
    }

    /// The runner's future is dropped (and child processes killed) on timeout.
    pub async fn execute(&self, action: &AlertAction, alert: &Alert) -> ActionResult {
        debug!(action = %action.name, alert_id = %alert.id, "Executing action");

        let limit = Duration::from_secs(action.timeout_seconds);
        match tokio::time::timeout(limit, self.runner.run(action, alert)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout {
                action: action.name.clone(),
                seconds: action.timeout_seconds,
            }),
        }
    }
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::alert::tests::sample_alert;
    use crate::alerts::notifications::NotificationChannel;

    struct SlowRunner;

    #[async_trait]
    impl ActionRunner for SlowRunner {
        async fn run(&self, _action: &AlertAction, _alert: &Alert) -> ActionResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!(null))
        }
    }

    fn command(line: &str) -> AlertAction {
        AlertAction::new(
            "cmd",
            ActionKind::Command {
                command: line.to_string(),
                args: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_dry_run_reports_success() {
        let executor = ActionExecutor::dry_run();
        let result = executor.execute(&command("exit 1"), &sample_alert()).await.unwrap();
        assert_eq!(result["dryRun"], true);
        assert_eq!(result["kind"], "command");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_error() {
        let executor = ActionExecutor::new(Arc::new(SlowRunner));
        let action = command("sleep 1").with_timeout(5);

        let err = executor.execute(&action, &sample_alert()).await.unwrap_err();
        assert!(matches!(err, ActionError::Timeout { seconds: 5, .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_live_command_success_and_failure() {
        let executor = ActionExecutor::new(Arc::new(LiveRunner::new(NotificationDispatcher::new(false))));
        let alert = sample_alert();

        let ok = executor
            .execute(&command("echo \"$ALERT_SEVERITY\""), &alert)
            .await
            .unwrap();
        assert_eq!(ok["stdout"], "critical");

        let err = executor.execute(&command("echo nope >&2; exit 3"), &alert).await.unwrap_err();
        match err {
            ActionError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_live_notification_reports_channel_failures() {
        // Enabled dispatcher without a webhook URL
        let runner = LiveRunner::new(NotificationDispatcher::new(true));
        let action = AlertAction::new(
            "notify",
            ActionKind::Notification {
                channels: vec![NotificationChannel::Log, NotificationChannel::Webhook],
                message: None,
            },
        );

        let err = runner.run(&action, &sample_alert()).await.unwrap_err();
        assert!(err.to_string().contains("webhook"));
    }
}
