//! Replication role verification against the discovered primary
//!
//! Connects to the primary captured by discovery, checks liveness, reads the
//! self-reported replication role, and compares it against the expected
//! role. With no descriptor this cycle there is nothing to verify: the
//! reachability gauge is forced to 0 and the role series stay untouched.

use crate::cluster::discovery::PrimaryDescriptor;
use crate::config::TopologyConfig;
use prometheus::{Gauge, GaugeVec, Opts, Registry};
use std::time::Duration;
use tracing::debug;

pub const EXPECTED_ROLE: &str = "primary";

/// First `role:<value>` line of a replication status block. Lines carry
/// trailing `\r` on the wire. An empty or absent value is no role at all.
pub(crate) fn parse_role(info: &str) -> Option<&str> {
    info.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("role:"))
        .filter(|role| !role.is_empty())
}

pub struct RoleVerifier {
    password: Option<String>,
    timeout: Duration,

    local_role: GaugeVec,
    role_mismatch: GaugeVec,
    master_reachable: Gauge,
}

impl RoleVerifier {
    pub fn new(cfg: &TopologyConfig) -> prometheus::Result<Self> {
        Ok(Self {
            password: cfg.password.clone(),
            timeout: cfg.verify_timeout(),
            local_role: GaugeVec::new(
                Opts::new(
                    "replication_local_role",
                    "1 for the replication role currently reported by the discovered primary.",
                ),
                &["role"],
            )?,
            role_mismatch: GaugeVec::new(
                Opts::new(
                    "replication_role_mismatch",
                    "1 if the observed role differs from the expected role.",
                ),
                &["expected", "actual"],
            )?,
            master_reachable: Gauge::new(
                "replication_master_reachable",
                "1 if the discovered primary answered a liveness check, else 0.",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.local_role.clone()))?;
        registry.register(Box::new(self.role_mismatch.clone()))?;
        registry.register(Box::new(self.master_reachable.clone()))?;
        Ok(())
    }

    async fn fetch_replication_info(
        &self,
        host: &str,
        port: u16,
    ) -> redis::RedisResult<String> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host.to_string(), port),
            redis: redis::RedisConnectionInfo {
                password: self.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        redis::cmd("INFO")
            .arg("replication")
            .query_async(&mut conn)
            .await
    }

    /// Run one verification cycle for the primary discovered this cycle, if
    /// any. Liveness or role-query failure leaves the role series
    /// unrefreshed; only the reachability gauge drops to 0.
    pub async fn verify(&self, primary: Option<&PrimaryDescriptor>) {
        let Some(primary) = primary else {
            self.master_reachable.set(0.0);
            return;
        };
        let Ok(port) = primary.port.parse::<u16>() else {
            debug!("primary {}:{}: unusable port", primary.host, primary.port);
            self.master_reachable.set(0.0);
            return;
        };

        match tokio::time::timeout(
            self.timeout,
            self.fetch_replication_info(&primary.host, port),
        )
        .await
        {
            Ok(Ok(info)) => {
                self.master_reachable.set(1.0);
                let role = parse_role(&info).unwrap_or("unknown");
                self.publish_role(role);
            }
            Ok(Err(e)) => {
                debug!("primary {}:{} unreachable: {e}", primary.host, primary.port);
                self.master_reachable.set(0.0);
            }
            Err(_) => {
                debug!("primary {}:{}: check timed out", primary.host, primary.port);
                self.master_reachable.set(0.0);
            }
        }
    }

    fn publish_role(&self, role: &str) {
        self.local_role.with_label_values(&[role]).set(1.0);
        let mismatch = role != EXPECTED_ROLE;
        self.role_mismatch
            .with_label_values(&[EXPECTED_ROLE, role])
            .set(if mismatch { 1.0 } else { 0.0 });
        // Series for a previously observed role keep their last value;
        // labelled series are updated, never retracted.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::proto::MetricFamily;
    use prometheus::Registry;

    const INFO_REPLICA: &str = "# Replication\r\nrole:replica\r\nconnected_replicas:2\r\n";

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role(INFO_REPLICA), Some("replica"));
        assert_eq!(parse_role("# Replication\r\nrole:primary\r\n"), Some("primary"));
        assert_eq!(parse_role("# Replication\r\nconnected_replicas:0\r\n"), None);
        assert_eq!(parse_role("role:\r\n"), None);
        assert_eq!(parse_role(""), None);
    }

    fn labelled_value(families: &[MetricFamily], name: &str, labels: &[&str]) -> Option<f64> {
        families
            .iter()
            .find(|mf| mf.get_name() == name)?
            .get_metric()
            .iter()
            .find(|m| {
                m.get_label()
                    .iter()
                    .map(|l| l.get_value())
                    .collect::<Vec<_>>()
                    == labels
            })
            .map(|m| m.get_gauge().get_value())
    }

    fn series_count(families: &[MetricFamily], name: &str) -> usize {
        families
            .iter()
            .find(|mf| mf.get_name() == name)
            .map(|mf| mf.get_metric().len())
            .unwrap_or(0)
    }

    fn verifier() -> (RoleVerifier, Registry) {
        let verifier = RoleVerifier::new(&TopologyConfig {
            verify_timeout_ms: 200,
            ..TopologyConfig::default()
        })
        .unwrap();
        let registry = Registry::new();
        verifier.register(&registry).unwrap();
        (verifier, registry)
    }

    #[test]
    fn test_publish_replica_role_flags_mismatch() {
        let (verifier, registry) = verifier();
        verifier.publish_role("replica");

        let families = registry.gather();
        assert_eq!(
            labelled_value(&families, "replication_local_role", &["replica"]),
            Some(1.0)
        );
        assert_eq!(
            labelled_value(
                &families,
                "replication_role_mismatch",
                &["primary", "replica"]
            ),
            Some(1.0)
        );
    }

    #[test]
    fn test_publish_expected_role_clears_nothing() {
        let (verifier, registry) = verifier();
        verifier.publish_role("replica");
        verifier.publish_role("primary");

        let families = registry.gather();
        assert_eq!(
            labelled_value(&families, "replication_local_role", &["primary"]),
            Some(1.0)
        );
        assert_eq!(
            labelled_value(
                &families,
                "replication_role_mismatch",
                &["primary", "primary"]
            ),
            Some(0.0)
        );
        // The stale replica series is not retracted, only superseded.
        assert_eq!(
            labelled_value(&families, "replication_local_role", &["replica"]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_verify_without_descriptor_forces_unreachable() {
        let (verifier, registry) = verifier();
        verifier.verify(None).await;

        let families = registry.gather();
        assert_eq!(
            labelled_value(&families, "replication_master_reachable", &[]),
            Some(0.0)
        );
        // No role or mismatch series were created.
        assert_eq!(series_count(&families, "replication_local_role"), 0);
        assert_eq!(series_count(&families, "replication_role_mismatch"), 0);
    }

    #[tokio::test]
    async fn test_verify_unreachable_primary_leaves_role_unrefreshed() {
        let (verifier, registry) = verifier();
        let primary = PrimaryDescriptor {
            host: "127.0.0.1".to_string(),
            port: "1".to_string(),
        };
        verifier.verify(Some(&primary)).await;

        let families = registry.gather();
        assert_eq!(
            labelled_value(&families, "replication_master_reachable", &[]),
            Some(0.0)
        );
        assert_eq!(series_count(&families, "replication_local_role"), 0);
    }

    #[tokio::test]
    async fn test_verify_rejects_unusable_port() {
        let (verifier, registry) = verifier();
        let primary = PrimaryDescriptor {
            host: "127.0.0.1".to_string(),
            port: "not-a-port".to_string(),
        };
        verifier.verify(Some(&primary)).await;

        let families = registry.gather();
        assert_eq!(
            labelled_value(&families, "replication_master_reachable", &[]),
            Some(0.0)
        );
    }
}
