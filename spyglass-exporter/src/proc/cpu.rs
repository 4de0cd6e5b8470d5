//! CPU utilization sampling from `/proc/stat`
//!
//! The aggregate `cpu ` line is a set of monotonic jiffy counters. Usage is
//! derived from two consecutive snapshots, so this is the one reader that
//! carries state between cycles: the previous snapshot, guarded by a lock
//! held only for the read-modify-store of the baseline.

use parking_lot::Mutex;
use prometheus::{Gauge, Registry};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub const PROC_STAT: &str = "/proc/stat";

/// Aggregated CPU jiffies from the `cpu ` line of `/proc/stat`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

fn field(parts: &[&str], i: usize) -> u64 {
    parts.get(i).and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Parse the aggregate `cpu ` line. Per-CPU lines (`cpu0`, `cpu1`, ...) do
/// not match the prefix and are ignored.
pub(crate) fn parse_cpu_times(content: &str) -> Option<CpuTimes> {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("cpu ") {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            return Some(CpuTimes {
                user: field(&parts, 0),
                nice: field(&parts, 1),
                system: field(&parts, 2),
                idle: field(&parts, 3),
                iowait: field(&parts, 4),
                irq: field(&parts, 5),
                softirq: field(&parts, 6),
                steal: field(&parts, 7),
            });
        }
    }
    None
}

pub(crate) fn read_cpu_times(path: &Path) -> io::Result<CpuTimes> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_cpu_times(&content).unwrap_or_default())
}

/// Usage percent between two snapshots. A non-positive total delta (counter
/// reset after reboot, or no elapsed jiffies) publishes exactly 0.
pub(crate) fn usage_between(prev: &CpuTimes, next: &CpuTimes) -> f64 {
    let total_delta = next.total() as i64 - prev.total() as i64;
    if total_delta <= 0 {
        return 0.0;
    }
    let idle_delta = next.idle_total() as i64 - prev.idle_total() as i64;
    let usage = (1.0 - idle_delta as f64 / total_delta as f64) * 100.0;
    usage.clamp(0.0, 100.0)
}

/// Computes `cpu_usage_percent` from consecutive `/proc/stat` snapshots on a
/// fixed interval. Scrapes read only the published gauge and never wait on a
/// sampling tick.
pub struct CpuSampler {
    usage: Gauge,
    baseline: Mutex<CpuTimes>,
    source: PathBuf,
}

impl CpuSampler {
    pub fn new(source: impl Into<PathBuf>) -> prometheus::Result<Self> {
        let usage = Gauge::new(
            "cpu_usage_percent",
            "Instantaneous CPU utilization percent, all CPUs aggregated.",
        )?;
        let source = source.into();
        // Best-effort initial snapshot; an unreadable source leaves a zero
        // baseline rather than aborting startup.
        let baseline = read_cpu_times(&source).unwrap_or_default();
        Ok(Self {
            usage,
            baseline: Mutex::new(baseline),
            source,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.usage.clone()))
    }

    /// One sampling tick. A failed read skips the tick entirely: the
    /// baseline and the published rate both stay as they were.
    pub fn sample_once(&self) {
        let next = match read_cpu_times(&self.source) {
            Ok(t) => t,
            Err(e) => {
                debug!("cpu snapshot read failed: {e}");
                return;
            }
        };
        let usage = {
            let mut baseline = self.baseline.lock();
            let usage = usage_between(&baseline, &next);
            // New baseline regardless of what the delta looked like.
            *baseline = next;
            usage
        };
        self.usage.set(usage);
    }

    /// Spawn the periodic sampling task. It runs until `shutdown` changes,
    /// so the owner can signal exit and join the returned handle.
    pub fn spawn(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // interval's first tick completes immediately; consume it so
            // every sample spans a full interval.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.sample_once(),
                    _ = shutdown.changed() => break,
                }
            }
            debug!("cpu sampler stopped");
        })
    }

    #[cfg(test)]
    pub(crate) fn usage_value(&self) -> f64 {
        self.usage.get()
    }
}
