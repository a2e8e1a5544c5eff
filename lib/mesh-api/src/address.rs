//! Addressing primitives shared by workloads, services and waypoints

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid namespaced hostname {0:?}: expected namespace/hostname")]
    InvalidNamespacedHostname(String),

    #[error("Invalid network address {0:?}: expected [network/]ip")]
    InvalidNetworkAddress(String),
}

/// NetworkAddress is an IP scoped to a network.
///
/// It is the join key between a waypoint reference and the Service
/// registered at that address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkAddress {
    #[serde(default)]
    pub network: String,
    pub address: IpAddr,
}

impl NetworkAddress {
    pub fn new(network: impl Into<String>, address: IpAddr) -> Self {
        Self {
            network: network.into(),
            address,
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.address)
    }
}

impl FromStr for NetworkAddress {
    type Err = AddressError;

    /// Parses `network/ip`, or a bare `ip` on the default network
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, ip) = match s.rsplit_once('/') {
            Some((network, ip)) => (network, ip),
            None => ("", s),
        };
        let address = ip
            .parse::<IpAddr>()
            .map_err(|_| AddressError::InvalidNetworkAddress(s.to_string()))?;
        Ok(Self::new(network, address))
    }
}

/// Address of a waypoint as referenced by a Service or Workload
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    pub destination: NetworkAddress,

    /// Port of the mutually authenticated tunnel on the waypoint
    #[serde(default = "default_hbone_mtls_port")]
    pub hbone_mtls_port: u16,
}

impl GatewayAddress {
    pub fn new(destination: NetworkAddress) -> Self {
        Self {
            destination,
            hbone_mtls_port: default_hbone_mtls_port(),
        }
    }
}

/// A `namespace/hostname` pair identifying a Service
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedHostname {
    pub namespace: String,
    pub hostname: String,
}

impl NamespacedHostname {
    pub fn new(namespace: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            hostname: hostname.into(),
        }
    }
}

impl fmt::Display for NamespacedHostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.hostname)
    }
}

impl FromStr for NamespacedHostname {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, host)) if !ns.is_empty() && !host.is_empty() => Ok(Self::new(ns, host)),
            _ => Err(AddressError::InvalidNamespacedHostname(s.to_string())),
        }
    }
}

fn default_hbone_mtls_port() -> u16 {
    crate::DEFAULT_HBONE_MTLS_PORT
}
