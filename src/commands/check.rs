use crate::commands::context::{CommandContext, build_engine, ensure_no_scheduler};

/// Run one full alerting pass against the current metrics.
pub async fn handle_check_command(ctx: &CommandContext) -> anyhow::Result<()> {
    if let Err(e) = ensure_no_scheduler(&ctx.config) {
        ctx.fail(e);
    }
    let engine = build_engine(&ctx.config)?;
    let report = engine.run_tick().await;
    ctx.print(&report);
    Ok(())
}
