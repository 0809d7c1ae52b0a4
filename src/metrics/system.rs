use crate::metrics::sources::{SystemStats, SystemStatsSource};
use anyhow::{Result, anyhow};
use std::sync::Mutex;
use sysinfo::{Pid, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Live process and host statistics via `sysinfo`.
pub struct SysinfoProbe {
    pid: Pid,
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("Cannot determine own pid: {}", e))?;
        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
        })
    }
}

impl SystemStatsSource for SysinfoProbe {
    fn system_stats(&self) -> Result<SystemStats> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow!("System probe lock poisoned"))?;

        system.refresh_memory();
        system.refresh_process(self.pid);

        let process = system
            .process(self.pid)
            .ok_or_else(|| anyhow!("Process {} not found in process table", self.pid))?;

        let total_memory = system.total_memory() as f64;
        let system_memory_percent = if total_memory > 0.0 {
            system.used_memory() as f64 / total_memory * 100.0
        } else {
            0.0
        };

        Ok(SystemStats {
            memory_usage_mb: process.memory() as f64 / BYTES_PER_MB,
            system_memory_percent,
            cpu_usage: process.cpu_usage() as f64,
            uptime_seconds: process.run_time() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_reads_own_process() {
        let probe = SysinfoProbe::new().unwrap();
        let stats = probe.system_stats().unwrap();
        assert!(stats.memory_usage_mb > 0.0);
        assert!(stats.system_memory_percent >= 0.0 && stats.system_memory_percent <= 100.0);
    }
}
