//! Per-interface byte counters from `/proc/net/dev`.
//!
//! The counters are exposed raw (not as rates); rate derivation is the
//! scraper's job.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use std::path::PathBuf;

pub const PROC_NET_DEV: &str = "/proc/net/dev";

/// One `(iface, rx_bytes, tx_bytes)` entry per interface line. Header and
/// separator lines are skipped, as is any entry with fewer fields than the
/// tx-bytes column.
pub(crate) fn parse_net_dev(content: &str) -> Vec<(String, f64, f64)> {
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if !line.contains(':') || line.starts_with("Inter-") || line.starts_with("face") {
            continue;
        }
        let cleaned = line.replace(':', " ");
        let parts: Vec<&str> = cleaned.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let rx = parts[1].parse().unwrap_or(0.0);
        let tx = parts[9].parse().unwrap_or(0.0);
        out.push((parts[0].to_string(), rx, tx));
    }
    out
}

pub struct NetReader {
    rx: GaugeVec,
    tx: GaugeVec,
    source: PathBuf,
}

impl NetReader {
    pub fn new(source: impl Into<PathBuf>) -> prometheus::Result<Self> {
        Ok(Self {
            rx: GaugeVec::new(
                Opts::new(
                    "net_rx_bytes_total",
                    "Bytes received per interface (raw counter value).",
                ),
                &["iface"],
            )?,
            tx: GaugeVec::new(
                Opts::new(
                    "net_tx_bytes_total",
                    "Bytes transmitted per interface (raw counter value).",
                ),
                &["iface"],
            )?,
            source: source.into(),
        })
    }
}

impl Collector for NetReader {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.rx.desc();
        descs.extend(self.tx.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if let Ok(content) = std::fs::read_to_string(&self.source) {
            for (iface, rx, tx) in parse_net_dev(&content) {
                self.rx.with_label_values(&[&iface]).set(rx);
                self.tx.with_label_values(&[&iface]).set(tx);
            }
        }
        let mut mfs = self.rx.collect();
        mfs.extend(self.tx.collect());
        mfs
    }
}
