use crate::alerts::DaemonLock;
use crate::commands::context::{CommandContext, build_engine};
use crate::watch::MetricsFileWatcher;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn handle_run_command(ctx: &CommandContext) -> anyhow::Result<()> {
    let _lock = DaemonLock::acquire(&ctx.config.state_path())?;
    let engine = Arc::new(build_engine(&ctx.config)?);

    let mut watcher_task = None;
    let mut updates = None;
    if ctx.config.scheduler.watch_metrics {
        let (tx, rx) = mpsc::unbounded_channel();
        match MetricsFileWatcher::new(ctx.config.metrics_path(), tx) {
            Ok((mut watcher, file_receiver)) => {
                watcher_task = Some(tokio::spawn(async move {
                    if let Err(e) = watcher.run_with_receiver(file_receiver).await {
                        warn!("Metrics watcher stopped: {:#}", e);
                    }
                }));
                updates = Some(rx);
            }
            Err(e) => warn!("Metrics watcher unavailable, relying on the scheduler: {:#}", e),
        }
    }

    let scheduler = engine.start(updates);

    if !ctx.json {
        println!(
            "Alerting started (every {}s, metrics: {}). Press Ctrl-C to stop.",
            engine.settings().check_interval.as_secs(),
            ctx.config.metrics_path().display()
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    engine.stop();
    scheduler.await.context("Scheduler task failed")?;
    if let Some(task) = watcher_task {
        task.abort();
    }

    ctx.success("Alerting stopped");
    Ok(())
}
