use crate::metrics::sources::{
    ErrorSummary, ErrorTracker, PerformanceMonitor, PerformanceSummary, QualityMetrics,
    QualityMetricsSource, SystemStats, SystemStatsSource,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Metrics published by the host application's monitors.
///
/// ```json
/// { "performance": { "averageBuildTime": 48.2 },
///   "errors": { "typescriptErrors": 130 },
///   "quality": { "codeQualityScore": 81 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub performance: PerformanceSummary,
    pub errors: ErrorSummary,
    pub quality: QualityMetrics,
    /// Only used when no live system probe is wired in.
    pub system: SystemStats,
}

/// Snapshot-backed metric source. File-backed sources re-read the file on every
/// sample; in-memory sources serve whatever was last set.
#[derive(Debug)]
pub struct SnapshotMetrics {
    path: Option<PathBuf>,
    current: RwLock<MetricsSnapshot>,
}

impl SnapshotMetrics {
    pub fn from_file(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            current: RwLock::new(MetricsSnapshot::default()),
        }
    }

    pub fn in_memory(snapshot: MetricsSnapshot) -> Self {
        Self {
            path: None,
            current: RwLock::new(snapshot),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the in-memory snapshot. File-backed sources overwrite it on the next read.
    pub fn set(&self, snapshot: MetricsSnapshot) {
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    pub fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        let mut snapshot = self.snapshot().unwrap_or_default();
        apply(&mut snapshot);
        self.set(snapshot);
    }

    pub fn snapshot(&self) -> Result<MetricsSnapshot> {
        if let Some(path) = &self.path {
            let snapshot = read_snapshot(path)?;
            self.set(snapshot.clone());
            return Ok(snapshot);
        }

        let guard = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.clone())
    }
}

fn read_snapshot(path: &Path) -> Result<MetricsSnapshot> {
    if !path.exists() {
        debug!(path = %path.display(), "No metrics snapshot yet, reading zeros");
        return Ok(MetricsSnapshot::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics snapshot: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse metrics snapshot: {}", path.display()))
}

impl PerformanceMonitor for SnapshotMetrics {
    fn performance_summary(&self) -> Result<PerformanceSummary> {
        Ok(self.snapshot()?.performance)
    }
}

impl ErrorTracker for SnapshotMetrics {
    fn error_summary(&self) -> Result<ErrorSummary> {
        Ok(self.snapshot()?.errors)
    }
}

impl QualityMetricsSource for SnapshotMetrics {
    fn current_quality_metrics(&self) -> Result<QualityMetrics> {
        Ok(self.snapshot()?.quality)
    }
}

impl SystemStatsSource for SnapshotMetrics {
    fn system_stats(&self) -> Result<SystemStats> {
        Ok(self.snapshot()?.system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_zeros() {
        let temp_dir = TempDir::new().unwrap();
        let source = SnapshotMetrics::from_file(temp_dir.path().join("metrics.json"));
        assert_eq!(source.performance_summary().unwrap(), PerformanceSummary::default());
    }

    #[test]
    fn test_file_is_reloaded_on_every_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metrics.json");
        let source = SnapshotMetrics::from_file(path.clone());

        fs::write(&path, r#"{"errors": {"typescriptErrors": 10}}"#).unwrap();
        assert_eq!(source.error_summary().unwrap().typescript_errors, 10.0);

        fs::write(&path, r#"{"errors": {"typescriptErrors": 250}}"#).unwrap();
        assert_eq!(source.error_summary().unwrap().typescript_errors, 250.0);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metrics.json");
        fs::write(&path, "not json").unwrap();
        assert!(SnapshotMetrics::from_file(path).current_quality_metrics().is_err());
    }

    #[test]
    fn test_in_memory_update() {
        let source = SnapshotMetrics::in_memory(MetricsSnapshot::default());
        source.update(|s| s.quality.code_quality_score = 55.0);
        assert_eq!(source.current_quality_metrics().unwrap().code_quality_score, 55.0);
        assert!(source.path().is_none());
    }
}
