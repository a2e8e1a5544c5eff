//! Endpoint shards per service
use crate::directory::Directory;
use mesh_api::{TunnelProtocol, Workload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

/// One workload serving one port of a service
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshEndpoint {
    pub address: IpAddr,
    /// Target port on the workload
    pub port: u16,
    pub service_port_name: String,
    pub workload_uid: String,
    pub tunnel_protocol: TunnelProtocol,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl MeshEndpoint {
    /// True if every required label is present with the same value
    pub fn matches_subset(&self, required: &BTreeMap<String, String>) -> bool {
        required
            .iter()
            .all(|(k, v)| self.labels.get(k) == Some(v))
    }
}

/// Endpoints for each service, keyed by `namespace/hostname`
#[derive(Debug, Default)]
pub struct EndpointIndex {
    shards: HashMap<String, Vec<MeshEndpoint>>,
}

impl EndpointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shard(&self, service_key: &str) -> &[MeshEndpoint] {
        self.shards
            .get(service_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Rebuild the shard of a service from its current members.
    /// Services that no longer exist lose their shard.
    pub fn rebuild_shard(&mut self, directory: &Directory, service_key: &str) {
        let Some(svc) = directory.service(service_key) else {
            self.shards.remove(service_key);
            return;
        };
        let members = directory.workloads_for_service(service_key);
        let mut endpoints: Vec<MeshEndpoint> = svc
            .ports
            .iter()
            .flat_map(|port| {
                members
                    .iter()
                    .filter_map(move |wl| endpoint_for(wl, service_key, &port.name, port.port))
            })
            .collect();
        endpoints.sort();

        if endpoints.is_empty() {
            self.shards.remove(service_key);
        } else {
            self.shards.insert(service_key.to_string(), endpoints);
        }
    }
}

fn endpoint_for(wl: &Workload, service_key: &str, port_name: &str, port: u16) -> Option<MeshEndpoint> {
    let addr = wl.address.as_ref()?;
    Some(MeshEndpoint {
        address: addr.address,
        port: wl.target_port(service_key, port),
        service_port_name: port_name.to_string(),
        workload_uid: wl.uid.clone(),
        tunnel_protocol: wl.tunnel_protocol,
        labels: wl.labels.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{service, workload};

    #[test]
    fn test_rebuild_shard_per_port() {
        let mut dir = Directory::new();
        dir.upsert_service(service("default", "a", Some("1.1.1.1"), None));
        let mut wl = workload("w1", "10.0.0.1", &["default/a"]);
        wl.services
            .get_mut("default/a")
            .unwrap()
            .insert(80, 8080);
        dir.upsert_workload(wl);

        let mut index = EndpointIndex::new();
        index.rebuild_shard(&dir, "default/a");

        let shard = index.shard("default/a");
        let ports: Vec<_> = shard.iter().map(|e| (e.service_port_name.as_str(), e.port)).collect();
        assert_eq!(ports, vec![("tcp", 70), ("http", 8080)]);
    }

    #[test]
    fn test_removed_service_loses_shard() {
        let mut dir = Directory::new();
        dir.upsert_service(service("default", "a", Some("1.1.1.1"), None));
        dir.upsert_workload(workload("w1", "10.0.0.1", &["default/a"]));
        let mut index = EndpointIndex::new();
        index.rebuild_shard(&dir, "default/a");
        assert_eq!(index.shard_count(), 1);

        dir.remove_service("default/a");
        index.rebuild_shard(&dir, "default/a");
        assert!(index.shard("default/a").is_empty());
        assert_eq!(index.shard_count(), 0);
    }

    #[test]
    fn test_matches_subset() {
        let mut ep = MeshEndpoint {
            address: "10.0.0.1".parse().unwrap(),
            port: 80,
            service_port_name: "http".to_string(),
            workload_uid: "w1".to_string(),
            tunnel_protocol: TunnelProtocol::None,
            labels: BTreeMap::new(),
        };
        ep.labels.insert("version".to_string(), "v1".to_string());
        ep.labels.insert("app".to_string(), "a".to_string());

        let mut required = BTreeMap::new();
        assert!(ep.matches_subset(&required));
        required.insert("version".to_string(), "v1".to_string());
        assert!(ep.matches_subset(&required));
        required.insert("version".to_string(), "v2".to_string());
        assert!(!ep.matches_subset(&required));
    }
}
