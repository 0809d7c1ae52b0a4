use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Supported timestamp styles for table output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateFormat {
    Iso,      // 2024-03-15 14:30:00 UTC
    Short,    // 03-15 14:30
    Relative, // 5m ago
}

impl DateFormat {
    /// Parse a date format string from config
    pub fn from_config_str(format_str: &str) -> Result<Self> {
        match format_str.to_lowercase().as_str() {
            "iso" => Ok(DateFormat::Iso),
            "short" => Ok(DateFormat::Short),
            "relative" => Ok(DateFormat::Relative),
            _ => Err(anyhow!(
                "Invalid date format '{}'. Supported formats: iso, short, relative",
                format_str
            )),
        }
    }
}

/// Formats timestamps in the configured style and display timezone
#[derive(Debug, Clone)]
pub struct DateFormatter {
    format: DateFormat,
    timezone: Tz,
}

impl DateFormatter {
    pub fn new(config_format: &str, timezone: &str) -> Result<Self> {
        let format = DateFormat::from_config_str(config_format)?;
        let timezone = Tz::from_str(timezone)
            .map_err(|e| anyhow!("Invalid timezone '{}': {}", timezone, e))?;
        Ok(Self { format, timezone })
    }

    pub fn utc() -> Self {
        Self {
            format: DateFormat::Iso,
            timezone: Tz::UTC,
        }
    }

    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        self.format_at(datetime, Utc::now())
    }

    pub fn format_at(&self, datetime: &DateTime<Utc>, now: DateTime<Utc>) -> String {
        let local = datetime.with_timezone(&self.timezone);
        match self.format {
            DateFormat::Iso => local.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            DateFormat::Short => local.format("%m-%d %H:%M").to_string(),
            DateFormat::Relative => format_relative(now - *datetime),
        }
    }

    pub fn format_optional(&self, datetime: Option<&DateTime<Utc>>) -> String {
        datetime.map(|dt| self.format(dt)).unwrap_or_else(|| "-".to_string())
    }
}

fn format_relative(elapsed: chrono::Duration) -> String {
    let seconds = elapsed.num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }
    match seconds {
        0..=59 => format!("{}s ago", seconds),
        60..=3599 => format!("{}m ago", seconds / 60),
        3600..=86_399 => format!("{}h ago", seconds / 3600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}

/// Human-readable minutes, e.g. `95.0` -> `1h 35m`
pub fn format_minutes(minutes: f64) -> String {
    let total = minutes.round() as i64;
    if total < 60 {
        format!("{}m", total)
    } else {
        format!("{}h {}m", total / 60, total % 60)
    }
}
