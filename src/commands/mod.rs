// Command handlers module
pub mod alerts;
pub mod check;
pub mod config;
pub mod context;
pub mod rules;
pub mod run;

// Re-export command handlers for easy access
pub use alerts::{
    AlertListOptions, handle_ack_command, handle_alerts_command, handle_reset_command,
    handle_resolve_command, handle_responses_command, handle_summary_command,
    handle_test_command,
};
pub use check::handle_check_command;
pub use config::handle_config_action;
pub use context::{CommandContext, build_engine};
pub use rules::{handle_escalations_command, handle_rules_action};
pub use run::handle_run_command;
