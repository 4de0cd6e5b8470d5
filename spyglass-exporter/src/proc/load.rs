//! 1-minute load average from `/proc/loadavg`.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::Gauge;
use std::path::PathBuf;

pub const PROC_LOADAVG: &str = "/proc/loadavg";

pub(crate) fn parse_load1(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

pub struct LoadReader {
    load1: Gauge,
    source: PathBuf,
}

impl LoadReader {
    pub fn new(source: impl Into<PathBuf>) -> prometheus::Result<Self> {
        Ok(Self {
            load1: Gauge::new("load1", "1-minute load average.")?,
            source: source.into(),
        })
    }
}

impl Collector for LoadReader {
    fn desc(&self) -> Vec<&Desc> {
        self.load1.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        if let Ok(content) = std::fs::read_to_string(&self.source) {
            if let Some(v) = parse_load1(&content) {
                self.load1.set(v);
            }
        }
        self.load1.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load1() {
        assert_eq!(parse_load1("0.52 0.58 0.59 1/973 12345\n"), Some(0.52));
        assert_eq!(parse_load1(""), None);
        assert_eq!(parse_load1("not-a-number 0.5"), None);
    }
}
