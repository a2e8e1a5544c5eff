//! Push requests handed to the downstream push scheduler

use crate::address::NamespacedHostname;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of configuration object a ConfigKey refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    ServiceEntry,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::ServiceEntry => write!(f, "ServiceEntry"),
        }
    }
}

/// Identifies a configuration object for selective push
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigKey {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

impl ConfigKey {
    pub fn service_entry(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: Kind::ServiceEntry,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Builds a key from a `namespace/hostname` service key. A key without a
    /// namespace separator maps to an empty namespace.
    pub fn from_service_key(key: &str) -> Self {
        match key.split_once('/') {
            Some((ns, hostname)) => Self::service_entry(ns, hostname),
            None => Self::service_entry("", key),
        }
    }
}

impl From<&NamespacedHostname> for ConfigKey {
    fn from(name: &NamespacedHostname) -> Self {
        Self::service_entry(name.namespace.clone(), name.hostname.clone())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    AmbientUpdate,
}

/// A request to regenerate configuration for the listed objects
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub full: bool,
    pub configs_updated: BTreeSet<ConfigKey>,
    pub reason: TriggerReason,
}

impl PushRequest {
    /// Incremental push for the given keys
    pub fn incremental(configs_updated: BTreeSet<ConfigKey>) -> Self {
        Self {
            full: false,
            configs_updated,
            reason: TriggerReason::AmbientUpdate,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrafficDirection {
    Outbound,
}

impl TrafficDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficDirection::Outbound => "outbound",
        }
    }

    /// Cluster name for a hostname and port, e.g. `outbound|80||vip.example.com`
    pub fn subset_key(&self, subset: &str, hostname: &str, port: u16) -> String {
        format!("{}|{}|{}|{}", self.as_str(), port, subset, hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_key_from_service_key() {
        let key = ConfigKey::from_service_key("default/vip.example.com");
        assert_eq!(key.kind, Kind::ServiceEntry);
        assert_eq!(key.namespace, "default");
        assert_eq!(key.name, "vip.example.com");
        assert_eq!(key.to_string(), "ServiceEntry/default/vip.example.com");
    }

    #[test]
    fn test_subset_key() {
        assert_eq!(
            TrafficDirection::Outbound.subset_key("", "vip.example.com", 80),
            "outbound|80||vip.example.com"
        );
    }

    #[test]
    fn test_incremental_push_is_not_full() {
        let mut keys = BTreeSet::new();
        keys.insert(ConfigKey::service_entry("default", "a"));
        let req = PushRequest::incremental(keys);
        assert!(!req.full);
        assert_eq!(req.configs_updated.len(), 1);
    }
}
