use crate::address::{GatewayAddress, NetworkAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transport a workload accepts inbound traffic on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TunnelProtocol {
    /// Plaintext or application-level mTLS
    #[default]
    None,
    /// HTTP CONNECT over mutual TLS
    Hbone,
}

/// Workload is a single addressable runtime instance in the mesh
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// Stable key assigned by the topology synchronizer
    pub uid: String,

    pub name: String,

    pub namespace: String,

    pub address: Option<NetworkAddress>,

    #[serde(default)]
    pub tunnel_protocol: TunnelProtocol,

    /// Waypoint this workload is captured by, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoint: Option<GatewayAddress>,

    /// Services this workload backs, keyed by `namespace/hostname`, with
    /// service port → target port mappings
    #[serde(default)]
    pub services: BTreeMap<String, BTreeMap<u16, u16>>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Workload {
    pub fn resource_name(&self) -> &str {
        &self.uid
    }

    pub fn supports_tunnel(&self) -> bool {
        self.tunnel_protocol != TunnelProtocol::None
    }

    /// Target port this workload listens on for a service port.
    /// Falls back to the service port when no mapping is declared.
    pub fn target_port(&self, service_key: &str, service_port: u16) -> u16 {
        self.services
            .get(service_key)
            .and_then(|ports| ports.get(&service_port))
            .copied()
            .unwrap_or(service_port)
    }
}
