// Push-based metric updates from the snapshot file
pub mod events;
pub mod file_watcher;

pub use events::{MetricUpdate, changed_categories};
pub use file_watcher::MetricsFileWatcher;
