// src/config.rs

//! Manages server configuration: loading, resolving dynamic values, and
//! validation (§6).
//!
//! Uses a raw/resolved two-stage load (`RawConfig` deserializes and
//! defaults, `Config::from_file` validates and resolves), with
//! `humantime_serde`-backed duration fields.

use crate::core::protocol::NodeId;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Which role a node plays (§2): an Active Replica hosts epochs of
/// names, a Reconfigurator drives the control plane.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Active,
    Reconfigurator,
}

/// TLS posture for a connection. Transport security itself is a
/// non-goal (§1) — this crate never terminates or verifies TLS — but the
/// field survives configuration parsing so deployments can record their
/// intended posture and a future transport layer can read it back.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    None,
    ServerAuth,
    MutualAuth,
}

/// The known placement of one node in the deployment's node map (§6).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeEntry {
    pub address: String,
    pub starting_port: u16,
    pub role: NodeRole,
}

/// Which demand/placement policy an Active Replica folds observed
/// requests into (§4.2 "Demand Reporting", §9 design note (d)). Only
/// `Null` ships in this crate; a real deployment swaps in its own
/// `DemandProfile` implementation and extends this enum to select it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DemandProfileType {
    #[default]
    Null,
}

/// A raw representation of the config file before validation and
/// resolution.
#[derive(Deserialize)]
struct RawConfig {
    self_id: String,
    role: NodeRole,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    client_ssl_mode: SslMode,
    #[serde(default)]
    server_ssl_mode: SslMode,
    #[serde(default = "default_recon_timeout", with = "humantime_serde")]
    recon_timeout: Duration,
    #[serde(default = "default_client_port_offset")]
    client_port_offset: u16,
    #[serde(default)]
    demand_profile_type: DemandProfileType,
    #[serde(default = "default_nosql_records_class")]
    nosql_records_class: String,
    #[serde(default = "default_record_store_path")]
    record_store_path: String,
    #[serde(default)]
    metrics: MetricsConfig,
    nodes: HashMap<String, NodeEntry>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_recon_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_client_port_offset() -> u16 {
    1000
}
fn default_nosql_records_class() -> String {
    "edu.gns.nio.nsdesign.replicaController.ReplicaControllerRecord".to_string()
}
fn default_record_store_path() -> String {
    "gns_data/records.json".to_string()
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

/// The final, validated, and resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub self_id: NodeId,
    pub role: NodeRole,
    pub log_level: String,
    pub client_ssl_mode: SslMode,
    pub server_ssl_mode: SslMode,
    /// How long a protocol task waits between retransmissions before
    /// trying again (§4.3); not a giving-up deadline, since the
    /// reconfiguration record never abandons an in-flight transition.
    pub recon_timeout: Duration,
    /// Client-facing ports are this much above the node's
    /// intra-protocol `starting_port` (§6).
    pub client_port_offset: u16,
    pub demand_profile_type: DemandProfileType,
    pub nosql_records_class: String,
    pub record_store_path: String,
    pub metrics: MetricsConfig,
    pub nodes: HashMap<NodeId, NodeEntry>,
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            self_id: NodeId::new(raw.self_id),
            role: raw.role,
            log_level: raw.log_level,
            client_ssl_mode: raw.client_ssl_mode,
            server_ssl_mode: raw.server_ssl_mode,
            recon_timeout: raw.recon_timeout,
            client_port_offset: raw.client_port_offset,
            demand_profile_type: raw.demand_profile_type,
            nosql_records_class: raw.nosql_records_class,
            record_store_path: raw.record_store_path,
            metrics: raw.metrics,
            nodes: raw
                .nodes
                .into_iter()
                .map(|(id, entry)| (NodeId::new(id), entry))
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    /// The subset of the node map playing the Reconfigurator role.
    pub fn reconfigurator_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, e)| e.role == NodeRole::Reconfigurator)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.self_id.as_str().is_empty() {
            return Err(anyhow!("self_id cannot be empty"));
        }
        if !self.nodes.contains_key(&self.self_id) {
            return Err(anyhow!(
                "node map does not contain an entry for self_id '{}'",
                self.self_id
            ));
        }
        if self.reconfigurator_ids().is_empty() {
            return Err(anyhow!(
                "node map must designate at least one reconfigurator node"
            ));
        }
        if self.recon_timeout.is_zero() {
            return Err(anyhow!("recon_timeout cannot be zero"));
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(anyhow!("metrics.port cannot be 0"));
        }
        for (id, entry) in &self.nodes {
            if entry.starting_port == 0 {
                return Err(anyhow!("node '{id}' has starting_port 0"));
            }
            if entry.address.trim().is_empty() {
                return Err(anyhow!("node '{id}' has an empty address"));
            }
        }
        if self.reconfigurator_ids().len() == 1 {
            warn!(
                "only one reconfigurator is configured; ReconfigureRcNodeConfig cannot reach a majority if it is ever partitioned"
            );
        }
        Ok(())
    }

    /// The node's own entry; present after `validate()` has run.
    pub fn self_entry(&self) -> &NodeEntry {
        &self.nodes[&self.self_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            self_id = "rc-1"
            role = "reconfigurator"

            [nodes.rc-1]
            address = "127.0.0.1"
            starting_port = 9000
            role = "reconfigurator"

            [nodes.a]
            address = "127.0.0.1"
            starting_port = 9100
            role = "active"
        "#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gns.toml");
        fs::write(&path, sample_toml()).unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.self_id, NodeId::new("rc-1"));
        assert_eq!(config.client_port_offset, 1000);
        assert_eq!(config.reconfigurator_ids(), vec![NodeId::new("rc-1")]);
    }

    #[test]
    fn rejects_config_missing_self_in_node_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gns.toml");
        fs::write(
            &path,
            r#"
                self_id = "missing"
                role = "active"

                [nodes.rc-1]
                address = "127.0.0.1"
                starting_port = 9000
                role = "reconfigurator"
            "#,
        )
        .unwrap();

        assert!(Config::from_file(path.to_str().unwrap()).is_err());
    }
}
