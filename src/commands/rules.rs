use crate::alerts::{AlertRule, AlertRuleUpdate};
use crate::cli::RulesAction;
use crate::commands::context::{CommandContext, build_engine, ensure_no_scheduler, read_json_file};

pub async fn handle_rules_action(ctx: &CommandContext, action: RulesAction) -> anyhow::Result<()> {
    if !matches!(action, RulesAction::List) {
        if let Err(e) = ensure_no_scheduler(&ctx.config) {
            ctx.fail(e);
        }
    }
    let engine = build_engine(&ctx.config)?;

    match action {
        RulesAction::List => ctx.print(&engine.alert_rules().await),
        RulesAction::Add { file } => {
            let rule: AlertRule = match read_json_file(&file) {
                Ok(rule) => rule,
                Err(e) => ctx.fail(format!("{:#}", e)),
            };
            match engine.add_alert_rule(rule).await {
                Ok(id) => ctx.success(format!("Alert rule added: {}", id)),
                Err(e) => ctx.fail(e),
            }
        }
        RulesAction::Update { id, file } => {
            let update: AlertRuleUpdate = match read_json_file(&file) {
                Ok(update) => update,
                Err(e) => ctx.fail(format!("{:#}", e)),
            };
            if engine.update_alert_rule(&id, update).await {
                ctx.success(format!("Alert rule updated: {}", id));
            } else {
                ctx.fail(format!("Alert rule not found: {}", id));
            }
        }
        RulesAction::Delete { id } => {
            if engine.delete_alert_rule(&id).await {
                ctx.success(format!("Alert rule deleted: {}", id));
            } else {
                ctx.fail(format!("Alert rule not found: {}", id));
            }
        }
        RulesAction::Enable { id } => set_enabled(ctx, &engine, &id, true).await,
        RulesAction::Disable { id } => set_enabled(ctx, &engine, &id, false).await,
    }

    Ok(())
}

async fn set_enabled(
    ctx: &CommandContext,
    engine: &crate::alerts::AlertingSystem,
    id: &str,
    enabled: bool,
) {
    if engine.update_alert_rule(id, AlertRuleUpdate::enabled(enabled)).await {
        let verb = if enabled { "enabled" } else { "disabled" };
        ctx.success(format!("Alert rule {}: {}", verb, id));
    } else {
        ctx.fail(format!("Alert rule not found: {}", id));
    }
}

pub async fn handle_escalations_command(ctx: &CommandContext) -> anyhow::Result<()> {
    let engine = build_engine(&ctx.config)?;
    ctx.print(&engine.escalation_rules().await);
    Ok(())
}
