use crate::alerts::rules::AlertCategory;
use crate::metrics::MetricsSnapshot;
use chrono::{DateTime, Utc};

/// A category's metrics changed and its rules should be checked now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricUpdate {
    pub category: AlertCategory,
    pub observed_at: DateTime<Utc>,
}

impl MetricUpdate {
    pub fn now(category: AlertCategory) -> Self {
        Self {
            category,
            observed_at: Utc::now(),
        }
    }
}

/// Categories whose section differs between two snapshots.
pub fn changed_categories(previous: &MetricsSnapshot, next: &MetricsSnapshot) -> Vec<AlertCategory> {
    AlertCategory::ALL
        .into_iter()
        .filter(|category| match category {
            AlertCategory::Performance => previous.performance != next.performance,
            AlertCategory::Error => previous.errors != next.errors,
            AlertCategory::Quality => previous.quality != next.quality,
            AlertCategory::System => previous.system != next.system,
        })
        .collect()
}
