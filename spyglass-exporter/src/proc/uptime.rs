//! Host uptime from `/proc/uptime`.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::Gauge;
use std::path::PathBuf;

pub const PROC_UPTIME: &str = "/proc/uptime";

pub(crate) fn parse_uptime_seconds(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

pub struct UptimeReader {
    uptime: Gauge,
    source: PathBuf,
}

impl UptimeReader {
    pub fn new(source: impl Into<PathBuf>) -> prometheus::Result<Self> {
        Ok(Self {
            uptime: Gauge::new("uptime_seconds", "Host uptime in seconds.")?,
            source: source.into(),
        })
    }
}

impl Collector for UptimeReader {
    fn desc(&self) -> Vec<&Desc> {
        self.uptime.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if let Ok(content) = std::fs::read_to_string(&self.source) {
            if let Some(v) = parse_uptime_seconds(&content) {
                self.uptime.set(v);
            }
        }
        self.uptime.collect()
    }
}
