pub mod snapshot;
pub mod sources;
pub mod system;

pub use snapshot::{MetricsSnapshot, SnapshotMetrics};
pub use sources::{
    ErrorSummary, ErrorTracker, MetricAdapters, PerformanceMonitor, PerformanceSummary,
    QualityMetrics, QualityMetricsSource, SystemStats, SystemStatsSource,
};
pub use system::SysinfoProbe;
