use crate::alerts::{AlertCategory, AlertFilter, Severity};
use crate::commands::context::{CommandContext, build_engine, ensure_no_scheduler};
use std::io::{self, BufRead, Write};
use std::str::FromStr;

pub struct AlertListOptions {
    pub category: Option<String>,
    pub severity: Option<String>,
    pub active: bool,
    pub resolved: bool,
    pub limit: Option<usize>,
}

impl AlertListOptions {
    pub fn to_filter(&self) -> anyhow::Result<AlertFilter> {
        Ok(AlertFilter {
            category: self.category.as_deref().map(AlertCategory::from_str).transpose()?,
            severity: self.severity.as_deref().map(Severity::from_str).transpose()?,
            resolved: match (self.active, self.resolved) {
                (true, _) => Some(false),
                (false, true) => Some(true),
                (false, false) => None,
            },
            limit: self.limit,
        })
    }
}

pub async fn handle_alerts_command(ctx: &CommandContext, options: AlertListOptions) -> anyhow::Result<()> {
    let filter = match options.to_filter() {
        Ok(filter) => filter,
        Err(e) => ctx.fail(e),
    };

    let engine = build_engine(&ctx.config)?;
    let alerts = engine.alerts(&filter).await;
    ctx.print(&alerts);
    Ok(())
}

pub async fn handle_ack_command(ctx: &CommandContext, id: &str) -> anyhow::Result<()> {
    let engine = build_engine(&ctx.config)?;
    if engine.acknowledge_alert(id).await {
        ctx.success(format!("Alert acknowledged: {}", id));
        Ok(())
    } else {
        ctx.fail(format!("Alert not found: {}", id))
    }
}

pub async fn handle_resolve_command(ctx: &CommandContext, id: &str) -> anyhow::Result<()> {
    let engine = build_engine(&ctx.config)?;
    if engine.resolve_alert(id).await {
        ctx.success(format!("Alert resolved: {}", id));
        Ok(())
    } else {
        ctx.fail(format!("Alert not found: {}", id))
    }
}

pub async fn handle_responses_command(ctx: &CommandContext, alert_id: &str) -> anyhow::Result<()> {
    let engine = build_engine(&ctx.config)?;
    if engine.alert(alert_id).await.is_none() {
        ctx.fail(format!("Alert not found: {}", alert_id));
    }
    let responses = engine.responses_for(alert_id).await;
    ctx.print(&responses);
    Ok(())
}

pub async fn handle_summary_command(ctx: &CommandContext) -> anyhow::Result<()> {
    let engine = build_engine(&ctx.config)?;
    ctx.print(&engine.alert_summary().await);
    Ok(())
}

pub async fn handle_test_command(ctx: &CommandContext, rule_id: &str) -> anyhow::Result<()> {
    if let Err(e) = ensure_no_scheduler(&ctx.config) {
        ctx.fail(e);
    }
    let engine = build_engine(&ctx.config)?;
    match engine.test_alert(rule_id).await {
        Ok(alert) => {
            ctx.print(&vec![alert]);
            Ok(())
        }
        Err(e) => ctx.fail(e),
    }
}

pub async fn handle_reset_command(ctx: &CommandContext, assume_yes: bool) -> anyhow::Result<()> {
    if let Err(e) = ensure_no_scheduler(&ctx.config) {
        ctx.fail(e);
    }
    if !assume_yes && !confirm("Delete all alerts and responses and restore default rules?")? {
        ctx.success("Reset cancelled");
        return Ok(());
    }

    let engine = build_engine(&ctx.config)?;
    engine.reset().await;
    ctx.success("Alerting state reset to defaults");
    Ok(())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
