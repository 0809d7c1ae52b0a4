use crate::cli::ConfigAction;
use crate::commands::context::report_error;
use crate::config::Config;
use serde_json::json;
use std::path::Path;

pub fn handle_config_action(action: ConfigAction, config_path: &Path, json_output: bool) {
    match action {
        ConfigAction::Init => match Config::default().save_to(config_path) {
            Ok(()) => {
                if json_output {
                    println!(
                        "{}",
                        json!({
                            "status": "success",
                            "message": "Configuration initialized successfully",
                            "path": config_path.display().to_string(),
                        })
                    );
                } else {
                    println!("Configuration initialized at: {}", config_path.display());
                }
            }
            Err(e) => report_error(json_output, format!("Failed to initialize config: {:#}", e)),
        },
        ConfigAction::Show => match Config::load_from(config_path) {
            Ok(config) => {
                if json_output {
                    match serde_json::to_string_pretty(&config) {
                        Ok(json) => println!("{}", json),
                        Err(e) => report_error(
                            json_output,
                            format!("Failed to serialize config to JSON: {}", e),
                        ),
                    }
                } else {
                    match toml::to_string_pretty(&config) {
                        Ok(toml_str) => {
                            println!("Configuration ({})", config_path.display());
                            println!("{}", toml_str);
                        }
                        Err(e) => {
                            report_error(json_output, format!("Failed to serialize config: {}", e))
                        }
                    }
                }
            }
            Err(e) => report_error(json_output, format!("Failed to load config: {:#}", e)),
        },
        ConfigAction::Set { key, value } => match Config::load_from(config_path) {
            Ok(mut config) => match config.set_value(&key, &value) {
                Ok(()) => match config.save_to(config_path) {
                    Ok(()) => {
                        if json_output {
                            println!(
                                "{}",
                                json!({
                                    "status": "success",
                                    "message": format!("Configuration updated: {} = {}", key, value),
                                })
                            );
                        } else {
                            println!("Configuration updated: {} = {}", key, value);
                        }
                    }
                    Err(e) => report_error(json_output, format!("Failed to save config: {:#}", e)),
                },
                Err(e) => report_error(json_output, format!("Invalid configuration: {}", e)),
            },
            Err(e) => report_error(json_output, format!("Failed to load config: {:#}", e)),
        },
    }
}
