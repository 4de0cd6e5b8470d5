//! Primary discovery through the configured broker endpoints
//!
//! Each cycle asks every broker for the current primary address of the
//! cluster. Probes run concurrently, each bounded by its own timeout, but
//! outcomes are folded in configured order: the first well-formed answer is
//! the cycle's authoritative descriptor, later answers only update
//! per-endpoint reachability. No quorum is taken; the reachable-count gauge
//! surfaces an under-quorum broker set to the operator.

use crate::config::TopologyConfig;
use futures::future::join_all;
use prometheus::{Gauge, GaugeVec, Opts, Registry};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Address of the cluster primary as reported by a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryDescriptor {
    pub host: String,
    pub port: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("reply is not an address array")]
    NotAnArray,
    #[error("address array has {0} elements, expected 2")]
    WrongArity(usize),
    #[error("address element is empty")]
    EmptyField,
}

/// Validate the fixed reply shape up front: a two-element array of
/// non-empty strings. Anything else is a decode failure, never a partially
/// filled descriptor.
pub(crate) fn decode_primary_reply(
    reply: Option<&[String]>,
) -> Result<PrimaryDescriptor, DecodeError> {
    let arr = reply.ok_or(DecodeError::NotAnArray)?;
    if arr.len() < 2 {
        return Err(DecodeError::WrongArity(arr.len()));
    }
    if arr[0].is_empty() || arr[1].is_empty() {
        return Err(DecodeError::EmptyField);
    }
    Ok(PrimaryDescriptor {
        host: arr[0].clone(),
        port: arr[1].clone(),
    })
}

/// Result of one discovery cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub reachable_count: usize,
    /// Per-endpoint reachability, in configured order.
    pub endpoints: Vec<(String, bool)>,
    pub primary: Option<PrimaryDescriptor>,
}

/// Fold per-endpoint outcomes in configured order. The first well-formed
/// answer wins; a different answer from a later endpoint never overrides it.
pub(crate) fn fold_probes(
    brokers: &[String],
    outcomes: Vec<Option<PrimaryDescriptor>>,
) -> TopologySnapshot {
    let mut snap = TopologySnapshot::default();
    for (addr, outcome) in brokers.iter().zip(outcomes) {
        let up = outcome.is_some();
        if up {
            snap.reachable_count += 1;
        }
        if snap.primary.is_none() {
            snap.primary = outcome;
        }
        snap.endpoints.push((addr.clone(), up));
    }
    snap
}

pub struct TopologyDiscovery {
    brokers: Vec<String>,
    cluster_name: String,
    timeout: Duration,

    up: Gauge,
    endpoint_up: GaugeVec,
    reachable: Gauge,
    master_info: GaugeVec,
}

impl TopologyDiscovery {
    pub fn new(cfg: &TopologyConfig) -> prometheus::Result<Self> {
        Ok(Self {
            brokers: cfg.broker_list(),
            cluster_name: cfg.cluster_name.clone(),
            timeout: cfg.discovery_timeout(),
            up: Gauge::new(
                "topology_up",
                "1 if at least one discovery broker is reachable, else 0.",
            )?,
            endpoint_up: GaugeVec::new(
                Opts::new(
                    "topology_endpoint_up",
                    "1 if this discovery broker answered the last cycle, else 0.",
                ),
                &["endpoint"],
            )?,
            reachable: Gauge::new(
                "topology_reachable_count",
                "Number of reachable discovery brokers.",
            )?,
            master_info: GaugeVec::new(
                Opts::new(
                    "topology_master_info",
                    "Primary address discovered via the brokers. 1 for the current primary labels.",
                ),
                &["primary_host", "primary_port"],
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.up.clone()))?;
        registry.register(Box::new(self.endpoint_up.clone()))?;
        registry.register(Box::new(self.reachable.clone()))?;
        registry.register(Box::new(self.master_info.clone()))?;
        Ok(())
    }

    async fn query_primary(&self, addr: &str) -> redis::RedisResult<Option<Vec<String>>> {
        let client = redis::Client::open(format!("redis://{addr}"))?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(&self.cluster_name)
            .query_async(&mut conn)
            .await
    }

    /// Probe one broker. Error, timeout, or a malformed reply all mean the
    /// endpoint is down for this cycle.
    async fn probe_endpoint(&self, addr: &str) -> Option<PrimaryDescriptor> {
        let reply = match tokio::time::timeout(self.timeout, self.query_primary(addr)).await {
            Err(_) => {
                debug!("broker {addr}: query timed out");
                return None;
            }
            Ok(Err(e)) => {
                debug!("broker {addr}: {e}");
                return None;
            }
            Ok(Ok(reply)) => reply,
        };
        match decode_primary_reply(reply.as_deref()) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                debug!("broker {addr}: malformed reply: {e}");
                None
            }
        }
    }

    /// Run one discovery cycle and publish the topology gauges.
    pub async fn discover(&self) -> TopologySnapshot {
        let outcomes = join_all(self.brokers.iter().map(|a| self.probe_endpoint(a))).await;
        let snap = fold_probes(&self.brokers, outcomes);
        self.publish(&snap);
        snap
    }

    fn publish(&self, snap: &TopologySnapshot) {
        for (addr, up) in &snap.endpoints {
            self.endpoint_up
                .with_label_values(&[addr])
                .set(if *up { 1.0 } else { 0.0 });
        }
        self.up
            .set(if snap.reachable_count > 0 { 1.0 } else { 0.0 });
        self.reachable.set(snap.reachable_count as f64);
        if let Some(primary) = &snap.primary {
            self.master_info
                .with_label_values(&[&primary.host, &primary.port])
                .set(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(host: &str, port: &str) -> PrimaryDescriptor {
        PrimaryDescriptor {
            host: host.to_string(),
            port: port.to_string(),
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_valid_reply() {
        let reply = strings(&["10.0.0.5", "6379"]);
        assert_eq!(
            decode_primary_reply(Some(&reply)),
            Ok(descriptor("10.0.0.5", "6379"))
        );
    }

    #[test]
    fn test_decode_rejects_malformed_replies() {
        assert_eq!(decode_primary_reply(None), Err(DecodeError::NotAnArray));
        assert_eq!(
            decode_primary_reply(Some(&strings(&["10.0.0.5"]))),
            Err(DecodeError::WrongArity(1))
        );
        assert_eq!(
            decode_primary_reply(Some(&strings(&["", "6379"]))),
            Err(DecodeError::EmptyField)
        );
        assert_eq!(
            decode_primary_reply(Some(&strings(&["10.0.0.5", ""]))),
            Err(DecodeError::EmptyField)
        );
    }

    #[test]
    fn test_first_wellformed_answer_wins() {
        let brokers = strings(&["s1:26379", "s2:26379", "s3:26379"]);
        // Only the 2nd and 3rd answer, and they disagree.
        let outcomes = vec![
            None,
            Some(descriptor("10.0.0.5", "6379")),
            Some(descriptor("10.0.0.9", "6380")),
        ];
        let snap = fold_probes(&brokers, outcomes);
        assert_eq!(snap.reachable_count, 2);
        assert_eq!(snap.primary, Some(descriptor("10.0.0.5", "6379")));
        assert_eq!(
            snap.endpoints,
            vec![
                ("s1:26379".to_string(), false),
                ("s2:26379".to_string(), true),
                ("s3:26379".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_single_answering_endpoint() {
        let brokers = strings(&["s1:26379", "s2:26379", "s3:26379"]);
        let outcomes = vec![None, Some(descriptor("10.0.0.5", "6379")), None];
        let snap = fold_probes(&brokers, outcomes);
        assert_eq!(snap.reachable_count, 1);
        assert_eq!(snap.primary, Some(descriptor("10.0.0.5", "6379")));
        assert_eq!(snap.endpoints[0].1, false);
        assert_eq!(snap.endpoints[1].1, true);
        assert_eq!(snap.endpoints[2].1, false);
    }

    #[test]
    fn test_no_reachable_endpoints() {
        let brokers = strings(&["s1:26379", "s2:26379"]);
        let snap = fold_probes(&brokers, vec![None, None]);
        assert_eq!(snap.reachable_count, 0);
        assert!(snap.primary.is_none());
        assert!(snap.endpoints.iter().all(|(_, up)| !up));
    }

    fn gauge_value(registry: &Registry, name: &str) -> f64 {
        registry
            .gather()
            .iter()
            .find(|mf| mf.get_name() == name)
            .map(|mf| mf.get_metric()[0].get_gauge().get_value())
            .unwrap_or_else(|| panic!("metric {name} not found"))
    }

    fn test_config(brokers: &str) -> TopologyConfig {
        TopologyConfig {
            brokers: brokers.to_string(),
            cluster_name: "main".to_string(),
            discovery_timeout_ms: 200,
            verify_timeout_ms: 200,
            password: None,
        }
    }

    #[test]
    fn test_publish_topology_gauges() {
        let discovery = TopologyDiscovery::new(&test_config("s1:26379,s2:26379")).unwrap();
        let registry = Registry::new();
        discovery.register(&registry).unwrap();

        let snap = fold_probes(
            &strings(&["s1:26379", "s2:26379"]),
            vec![None, Some(descriptor("10.0.0.5", "6379"))],
        );
        discovery.publish(&snap);

        assert_eq!(gauge_value(&registry, "topology_up"), 1.0);
        assert_eq!(gauge_value(&registry, "topology_reachable_count"), 1.0);

        let families = registry.gather();
        let endpoint_up = families
            .iter()
            .find(|mf| mf.get_name() == "topology_endpoint_up")
            .unwrap();
        for metric in endpoint_up.get_metric() {
            let endpoint = metric.get_label()[0].get_value();
            let expected = if endpoint == "s2:26379" { 1.0 } else { 0.0 };
            assert_eq!(metric.get_gauge().get_value(), expected);
        }

        let master_info = families
            .iter()
            .find(|mf| mf.get_name() == "topology_master_info")
            .unwrap();
        let labels = master_info.get_metric()[0].get_label();
        assert_eq!(labels[0].get_value(), "10.0.0.5");
        assert_eq!(labels[1].get_value(), "6379");
    }

    #[tokio::test]
    async fn test_discover_with_unreachable_brokers() {
        // Nothing listens on these ports; every probe fails fast.
        let discovery = TopologyDiscovery::new(&test_config("127.0.0.1:1,127.0.0.1:2")).unwrap();
        let registry = Registry::new();
        discovery.register(&registry).unwrap();

        let snap = discovery.discover().await;
        assert_eq!(snap.reachable_count, 0);
        assert!(snap.primary.is_none());
        assert_eq!(gauge_value(&registry, "topology_up"), 0.0);
        assert_eq!(gauge_value(&registry, "topology_reachable_count"), 0.0);
    }
}
