use anyhow::{Context, Result, bail};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// Marks a state file as owned by a running scheduler. The lock file sits
/// next to the state file, holds the owner's pid and is removed on drop.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
}

impl DaemonLock {
    pub fn path_for(state_path: &Path) -> PathBuf {
        state_path.with_extension("lock")
    }

    /// Fails while a live process holds the lock. A lock left behind by a
    /// process that no longer exists is replaced.
    pub fn acquire(state_path: &Path) -> Result<Self> {
        let path = Self::path_for(state_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create lock directory: {}", parent.display())
            })?;
        }

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())
                        .with_context(|| format!("Failed to write lock file: {}", path.display()))?;
                    debug!(path = %path.display(), "Acquired scheduler lock");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(pid) = Self::holder(state_path) {
                        bail!(
                            "Alerting scheduler already running (pid {}), lock file: {}",
                            pid,
                            path.display()
                        );
                    }
                    warn!(path = %path.display(), "Removing stale scheduler lock");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(e).with_context(|| {
                                format!("Failed to remove stale lock: {}", path.display())
                            });
                        }
                    }
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create lock file: {}", path.display()));
                }
            }
        }

        bail!("Could not acquire scheduler lock: {}", path.display())
    }

    /// Pid of the live process holding the lock for `state_path`.
    pub fn holder(state_path: &Path) -> Option<u32> {
        let contents = fs::read_to_string(Self::path_for(state_path)).ok()?;
        let pid: u32 = contents.trim().parse().ok()?;
        process_alive(pid).then_some(pid)
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "Failed to remove scheduler lock: {}", e);
        }
    }
}

fn process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_process(Pid::from_u32(pid))
}
