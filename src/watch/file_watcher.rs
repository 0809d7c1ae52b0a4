// Watches the metrics snapshot file and turns writes into metric updates
use crate::metrics::{MetricsSnapshot, SnapshotMetrics};
use crate::watch::events::{MetricUpdate, changed_categories};
use anyhow::{Context, Result};
use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, warn};

pub struct MetricsFileWatcher {
    _watcher: RecommendedWatcher,
    source: SnapshotMetrics,
    last_seen: MetricsSnapshot,
    update_sender: tokio_mpsc::UnboundedSender<MetricUpdate>,
}

impl MetricsFileWatcher {
    pub fn new(
        metrics_path: PathBuf,
        update_sender: tokio_mpsc::UnboundedSender<MetricUpdate>,
    ) -> Result<(Self, mpsc::Receiver<notify::Result<Event>>)> {
        let (tx, file_receiver) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    warn!("Failed to forward metrics file event: {}", e);
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create metrics file watcher")?;

        // Watch the directory so the file may be created or replaced atomically
        let watch_dir = metrics_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&watch_dir).with_context(|| {
            format!("Failed to create metrics directory: {}", watch_dir.display())
        })?;
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .context("Failed to watch metrics directory")?;

        let source = SnapshotMetrics::from_file(metrics_path);
        let last_seen = source.snapshot().unwrap_or_default();

        let file_watcher = MetricsFileWatcher {
            _watcher: watcher,
            source,
            last_seen,
            update_sender,
        };

        Ok((file_watcher, file_receiver))
    }

    pub async fn run_with_receiver(
        &mut self,
        file_receiver: mpsc::Receiver<notify::Result<Event>>,
    ) -> Result<()> {
        loop {
            match file_receiver.try_recv() {
                Ok(Ok(event)) => self.handle_file_event(event),
                Ok(Err(e)) => warn!("Metrics file watch error: {}", e),
                Err(mpsc::TryRecvError::Empty) => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    return Err(anyhow::anyhow!("Metrics file watcher disconnected"));
                }
            }
        }
    }

    fn handle_file_event(&mut self, event: Event) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        if !event.paths.iter().any(|p| self.is_metrics_file(p)) {
            return;
        }

        let snapshot = match self.source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Usually a half-written file; the next write event retries
                debug!("Skipping unreadable metrics snapshot: {:#}", e);
                return;
            }
        };

        let observed_at = Utc::now();
        for category in changed_categories(&self.last_seen, &snapshot) {
            debug!(%category, "Metrics changed");
            let _ = self.update_sender.send(MetricUpdate {
                category,
                observed_at,
            });
        }
        self.last_seen = snapshot;
    }

    fn is_metrics_file(&self, path: &Path) -> bool {
        match (self.source.path().and_then(Path::file_name), path.file_name()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}
