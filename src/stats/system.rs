//! Host resource snapshot
//!
//! Memory, disk, CPU core and live task figures sent alongside the counters.

use std::path::Path;

use log::{debug, warn};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DiskStats {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CpuStats {
    pub cores: usize,
    /// Tasks alive on the async runtime.
    pub tasks: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SystemStats {
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub cpu: CpuStats,
}

/// Collect a point-in-time snapshot. Figures that cannot be read are zero.
pub fn collect(shared_dir: &Path) -> SystemStats {
    SystemStats {
        memory: memory_stats(),
        disk: disk_stats(shared_dir),
        cpu: cpu_stats(),
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn memory_stats() -> MemoryStats {
    let Some((total, available)) = read_meminfo() else {
        debug!("Host memory figures unavailable");
        return MemoryStats::default();
    };
    let used = total.saturating_sub(available);
    MemoryStats {
        total,
        available,
        used,
        percent: percent(used, total),
    }
}

#[cfg(target_os = "linux")]
fn read_meminfo() -> Option<(u64, u64)> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&contents)
}

#[cfg(not(target_os = "linux"))]
fn read_meminfo() -> Option<(u64, u64)> {
    None
}

/// `MemTotal` and `MemAvailable` from /proc/meminfo, in bytes.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(contents: &str) -> Option<(u64, u64)> {
    let field = |key: &str| -> Option<u64> {
        let line = contents.lines().find(|l| l.starts_with(key))?;
        let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kib * 1024)
    };
    Some((field("MemTotal:")?, field("MemAvailable:")?))
}

fn disk_stats(shared_dir: &Path) -> DiskStats {
    let total = fs2::total_space(shared_dir);
    let free = fs2::available_space(shared_dir);
    match (total, free) {
        (Ok(total), Ok(free)) => {
            let used = total.saturating_sub(free);
            DiskStats {
                total,
                free,
                used,
                percent: percent(used, total),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to get disk stats for {}: {e}", shared_dir.display());
            DiskStats::default()
        }
    }
}

fn cpu_stats() -> CpuStats {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let tasks = tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks())
        .unwrap_or(0);
    CpuStats { cores, tasks }
}
