//! Memory sizing from `/proc/meminfo`.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::Gauge;
use std::path::PathBuf;

pub const PROC_MEMINFO: &str = "/proc/meminfo";

fn parse_kb(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Returns (total, available) in bytes. Missing fields parse as 0.
pub(crate) fn parse_meminfo(content: &str) -> (u64, u64) {
    let mut total_kb = 0;
    let mut avail_kb = 0;
    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            total_kb = parse_kb(line);
        }
        if line.starts_with("MemAvailable:") {
            avail_kb = parse_kb(line);
        }
    }
    (total_kb * 1024, avail_kb * 1024)
}

/// Re-reads the source on every scrape. On failure the previously published
/// values stand; a never-set gauge just reports zero.
pub struct MemReader {
    total: Gauge,
    avail: Gauge,
    source: PathBuf,
}

impl MemReader {
    pub fn new(source: impl Into<PathBuf>) -> prometheus::Result<Self> {
        Ok(Self {
            total: Gauge::new("mem_total_bytes", "Total host memory in bytes.")?,
            avail: Gauge::new("mem_available_bytes", "Available host memory in bytes.")?,
            source: source.into(),
        })
    }
}

impl Collector for MemReader {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.total.desc();
        descs.extend(self.avail.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if let Ok(content) = std::fs::read_to_string(&self.source) {
            let (total, avail) = parse_meminfo(&content);
            if total > 0 {
                self.total.set(total as f64);
                self.avail.set(avail as f64);
            }
        }
        let mut mfs = self.total.collect();
        mfs.extend(self.avail.collect());
        mfs
    }
}
