// alchm-alerts: threshold alerting, escalation and automated remediation
use alchm_alerts::cli::{Cli, Commands};
use alchm_alerts::commands::{
    AlertListOptions, CommandContext, handle_ack_command, handle_alerts_command,
    handle_check_command, handle_config_action, handle_escalations_command, handle_reset_command,
    handle_resolve_command, handle_responses_command, handle_rules_action, handle_run_command,
    handle_summary_command, handle_test_command,
};
use alchm_alerts::commands::context::report_error;
use alchm_alerts::config::Config;
use alchm_alerts::utils::init_logging;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => match Config::default_path() {
            Ok(path) => path,
            Err(e) => report_error(cli.json, format!("{:#}", e)),
        },
    };

    // Config commands must work even when the current file is broken
    if let Commands::Config { action } = cli.command {
        handle_config_action(action, &config_path, cli.json);
        return Ok(());
    }

    let config = match Config::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => report_error(cli.json, format!("Failed to load configuration: {:#}", e)),
    };

    init_logging(&config.logging.level, cli.verbose);

    let ctx = match CommandContext::new(config, config_path, cli.json, cli.colored) {
        Ok(ctx) => ctx,
        Err(e) => report_error(cli.json, format!("{:#}", e)),
    };

    match cli.command {
        Commands::Run => handle_run_command(&ctx).await?,
        Commands::Check => handle_check_command(&ctx).await?,
        Commands::Alerts {
            category,
            severity,
            active,
            resolved,
            limit,
        } => {
            let options = AlertListOptions {
                category,
                severity,
                active,
                resolved,
                limit,
            };
            handle_alerts_command(&ctx, options).await?
        }
        Commands::Ack { id } => handle_ack_command(&ctx, &id).await?,
        Commands::Resolve { id } => handle_resolve_command(&ctx, &id).await?,
        Commands::Responses { alert_id } => handle_responses_command(&ctx, &alert_id).await?,
        Commands::Rules { action } => handle_rules_action(&ctx, action).await?,
        Commands::Escalations => handle_escalations_command(&ctx).await?,
        Commands::Summary => handle_summary_command(&ctx).await?,
        Commands::Test { rule_id } => handle_test_command(&ctx, &rule_id).await?,
        Commands::Reset { yes } => handle_reset_command(&ctx, yes).await?,
        Commands::Config { .. } => unreachable!("handled before configuration load"),
    }

    Ok(())
}
