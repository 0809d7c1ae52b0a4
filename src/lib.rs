// alchm-alerts library crate
// Exposes modules for integration testing

pub mod alerts;
pub mod cli;
pub mod commands;
pub mod config;
pub mod metrics;
pub mod output;
pub mod utils;
pub mod watch;
