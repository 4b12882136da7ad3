//! Engine API response types.
//!
//! Only the fields the agent reads are modelled; everything else in the
//! engine's JSON is ignored.

use std::collections::HashMap;

use serde::Deserialize;

/// Subset of `GET /containers/{id}/json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerInspect {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Config", default)]
    pub config: ContainerConfig,
}

impl ContainerInspect {
    /// Whether the container was started with a TTY, i.e. its log stream is
    /// raw rather than frame-multiplexed.
    pub const fn tty(&self) -> bool {
        self.config.tty
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Tty", default)]
    pub tty: bool,
}

/// One record of `GET /containers/{id}/stats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    /// Per-interface counters. Absent or `null` for containers without
    /// networking.
    #[serde(default)]
    pub networks: Option<HashMap<String, NetworkStats>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

impl StatsRecord {
    /// Received bytes summed over all interfaces.
    pub fn net_rx(&self) -> u64 {
        self.networks
            .iter()
            .flat_map(HashMap::values)
            .fold(0, |acc, n| acc.saturating_add(n.rx_bytes))
    }

    /// Transmitted bytes summed over all interfaces.
    pub fn net_tx(&self) -> u64 {
        self.networks
            .iter()
            .flat_map(HashMap::values)
            .fold(0, |acc, n| acc.saturating_add(n.tx_bytes))
    }
}

/// Error body returned by the engine on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    pub message: String,
}
