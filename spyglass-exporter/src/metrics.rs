//! Metric registry composition
//!
//! Every component owns its instruments and is registered here, once, into
//! one explicit registry at startup. Nothing registers itself globally.

use crate::cluster::{RoleVerifier, TopologyDiscovery};
use crate::config::ExporterConfig;
use crate::proc::{self, CpuSampler, LoadReader, MemReader, NetReader, UptimeReader};
use prometheus::{Gauge, GaugeVec, Opts, Registry};
use std::sync::Arc;

pub struct ExporterMetrics {
    pub registry: Registry,
    pub cpu: Arc<CpuSampler>,
    pub topology: TopologyDiscovery,
    pub roles: RoleVerifier,
}

pub fn build_metrics(cfg: &ExporterConfig) -> anyhow::Result<ExporterMetrics> {
    let registry = Registry::new();

    let up = Gauge::new("exporter_up", "1 while the exporter is serving scrapes.")?;
    up.set(1.0);
    registry.register(Box::new(up))?;

    let build_info = GaugeVec::new(
        Opts::new("exporter_build_info", "Build information."),
        &["version"],
    )?;
    build_info
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);
    registry.register(Box::new(build_info))?;

    let cpu = Arc::new(CpuSampler::new(proc::PROC_STAT)?);
    cpu.register(&registry)?;

    registry.register(Box::new(MemReader::new(proc::PROC_MEMINFO)?))?;
    registry.register(Box::new(LoadReader::new(proc::PROC_LOADAVG)?))?;
    registry.register(Box::new(UptimeReader::new(proc::PROC_UPTIME)?))?;
    registry.register(Box::new(NetReader::new(proc::PROC_NET_DEV)?))?;

    let topology = TopologyDiscovery::new(&cfg.topology)?;
    topology.register(&registry)?;

    let roles = RoleVerifier::new(&cfg.topology)?;
    roles.register(&registry)?;

    Ok(ExporterMetrics {
        registry,
        cpu,
        topology,
        roles,
    })
}
