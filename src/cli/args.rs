use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "alchm-alerts")]
#[command(about = "Threshold alerting, escalation and automated remediation")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON output format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable colorized table output
    #[arg(long, global = true)]
    pub colored: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize fresh configuration
    Init,
    /// Set configuration value
    Set {
        /// Configuration key (e.g., actions.dry_run)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List alert rules
    List,
    /// Add a rule from a JSON file
    Add {
        /// Path to a JSON alert rule
        file: PathBuf,
    },
    /// Update a rule with the fields from a JSON file
    Update {
        /// Rule ID
        id: String,
        /// Path to a JSON object with the fields to change
        file: PathBuf,
    },
    /// Delete a rule
    Delete {
        /// Rule ID
        id: String,
    },
    /// Enable a rule
    Enable {
        /// Rule ID
        id: String,
    },
    /// Disable a rule
    Disable {
        /// Rule ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler and metrics watcher until Ctrl-C
    Run,

    /// Run one alerting pass now and print what it did
    Check,

    /// List alerts, newest first
    Alerts {
        /// Filter by type (performance, error, quality, system)
        #[arg(long)]
        category: Option<String>,

        /// Filter by severity (low, medium, high, critical)
        #[arg(long)]
        severity: Option<String>,

        /// Only unresolved alerts
        #[arg(long, conflicts_with = "resolved")]
        active: bool,

        /// Only resolved alerts
        #[arg(long)]
        resolved: bool,

        /// Maximum number of alerts to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Acknowledge an alert
    Ack {
        /// Alert ID
        id: String,
    },

    /// Resolve an alert
    Resolve {
        /// Alert ID
        id: String,
    },

    /// Show action attempts recorded for an alert
    Responses {
        /// Alert ID
        alert_id: String,
    },

    /// Manage alert rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// List escalation rules
    Escalations,

    /// Show alert and response statistics
    Summary,

    /// Fire a rule once at threshold + 1, ignoring its cooldown
    Test {
        /// Rule ID
        rule_id: String,
    },

    /// Clear alerts, responses and retries and restore the default rules
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}
