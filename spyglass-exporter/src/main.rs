//! Spyglass Exporter - pull-based host & cluster telemetry
//!
//! Samples host OS resource counters and the replication topology of a
//! key-value store cluster (reached through its discovery brokers) and
//! exposes the derived measurements on `/metrics`:
//! - CPU utilization from periodic counter snapshots
//! - Memory, load, uptime and per-interface network gauges, read on scrape
//! - Primary discovery across the configured brokers, first answer wins
//! - Replication role verification against the discovered primary

mod cluster;
mod config;
mod http;
mod metrics;
mod proc;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let cfg = config::load_config().await;
    info!("spyglass-exporter v{} starting", env!("CARGO_PKG_VERSION"));

    let metrics = Arc::new(
        metrics::build_metrics(&cfg).context("failed to build metric registry")?,
    );

    // The one background task: the CPU sampler owns the counter baseline.
    // It is stopped and joined on the way out.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler = metrics.cpu.clone().spawn(
        Duration::from_secs(cfg.cpu_sample_interval_secs.max(1)),
        shutdown_rx,
    );

    let app = http::build_router(http::AppState {
        metrics: metrics.clone(),
    });
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    info!("listening on http://{}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("http server failed")?;

    let _ = shutdown_tx.send(true);
    sampler.await.context("cpu sampler task panicked")?;
    info!("spyglass-exporter stopped");
    Ok(())
}
