use crate::alerts::rules::AlertCategory;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformanceSummary {
    /// Seconds.
    pub average_build_time: f64,
    /// Bytes.
    pub average_bundle_size: f64,
    /// MB used by the build.
    pub average_memory_usage: f64,
    /// 0-100.
    pub cache_hit_rate: f64,
    pub regression_count: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total_active_errors: f64,
    pub typescript_errors: f64,
    pub lint_warnings: f64,
    pub critical_issues: f64,
    pub automation_opportunities: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QualityMetrics {
    pub code_quality_score: f64,
    pub technical_debt_score: f64,
    pub maintainability_index: f64,
    pub test_coverage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemStats {
    /// Resident memory of this process in MB.
    pub memory_usage_mb: f64,
    pub system_memory_percent: f64,
    pub cpu_usage: f64,
    pub uptime_seconds: f64,
}

pub trait PerformanceMonitor: Send + Sync {
    fn performance_summary(&self) -> Result<PerformanceSummary>;
}

pub trait ErrorTracker: Send + Sync {
    fn error_summary(&self) -> Result<ErrorSummary>;
}

pub trait QualityMetricsSource: Send + Sync {
    fn current_quality_metrics(&self) -> Result<QualityMetrics>;
}

pub trait SystemStatsSource: Send + Sync {
    fn system_stats(&self) -> Result<SystemStats>;
}

pub fn performance_metric(summary: &PerformanceSummary, metric: &str) -> f64 {
    match metric {
        "build_time" => summary.average_build_time,
        "bundle_size" => summary.average_bundle_size,
        "memory_usage" => summary.average_memory_usage,
        "cache_hit_rate" => summary.cache_hit_rate,
        "regressions" => summary.regression_count,
        _ => 0.0,
    }
}

pub fn error_metric(summary: &ErrorSummary, metric: &str) -> f64 {
    match metric {
        "total_errors" => summary.total_active_errors,
        "typescript_errors" => summary.typescript_errors,
        "lint_warnings" => summary.lint_warnings,
        "critical_errors" => summary.critical_issues,
        "automation_opportunities" => summary.automation_opportunities,
        _ => 0.0,
    }
}

pub fn quality_metric(metrics: &QualityMetrics, metric: &str) -> f64 {
    match metric {
        "code_quality_score" => metrics.code_quality_score,
        "technical_debt_score" => metrics.technical_debt_score,
        "maintainability_index" => metrics.maintainability_index,
        "test_coverage" => metrics.test_coverage,
        _ => 0.0,
    }
}

pub fn system_metric(stats: &SystemStats, metric: &str) -> f64 {
    match metric {
        "memory_usage" => stats.memory_usage_mb,
        "system_memory_percent" => stats.system_memory_percent,
        "cpu_usage" => stats.cpu_usage,
        "uptime" => stats.uptime_seconds,
        _ => 0.0,
    }
}

/// Read-only bridge from the engine to the monitored subsystems.
#[derive(Clone)]
pub struct MetricAdapters {
    performance: Arc<dyn PerformanceMonitor>,
    errors: Arc<dyn ErrorTracker>,
    quality: Arc<dyn QualityMetricsSource>,
    system: Arc<dyn SystemStatsSource>,
}

impl MetricAdapters {
    pub fn new(
        performance: Arc<dyn PerformanceMonitor>,
        errors: Arc<dyn ErrorTracker>,
        quality: Arc<dyn QualityMetricsSource>,
        system: Arc<dyn SystemStatsSource>,
    ) -> Self {
        Self {
            performance,
            errors,
            quality,
            system,
        }
    }

    /// Current value of `metric` in `category`. Unknown metrics read as 0;
    /// collaborator failures are returned to the caller.
    pub fn sample(&self, category: AlertCategory, metric: &str) -> Result<f64> {
        let value = match category {
            AlertCategory::Performance => {
                performance_metric(&self.performance.performance_summary()?, metric)
            }
            AlertCategory::Error => error_metric(&self.errors.error_summary()?, metric),
            AlertCategory::Quality => {
                quality_metric(&self.quality.current_quality_metrics()?, metric)
            }
            AlertCategory::System => system_metric(&self.system.system_stats()?, metric),
        };
        Ok(value)
    }
}

impl std::fmt::Debug for MetricAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricAdapters").finish_non_exhaustive()
    }
}
