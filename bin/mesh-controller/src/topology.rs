//! Topology snapshot files and reconciliation against the index

use anyhow::{Context, Result};
use mesh_api::{Service, Workload};
use mesh_core::{MeshIndex, TopologyEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Every workload and service known at one point in time
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

impl TopologySnapshot {
    /// Read a snapshot. `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read topology file {}", path.display()))?;
        Self::parse(&raw, is_json(path))
            .with_context(|| format!("failed to parse topology file {}", path.display()))
    }

    pub fn parse(raw: &str, json: bool) -> Result<Self> {
        if json {
            Ok(serde_json::from_str(raw)?)
        } else {
            Ok(serde_yaml::from_str(raw)?)
        }
    }

    /// Events that bring the index in line with this snapshot. Entities that
    /// are unchanged produce no event.
    pub fn diff(&self, index: &MeshIndex) -> Vec<TopologyEvent> {
        let mut events = Vec::new();

        let keys: BTreeSet<String> = self.services.iter().map(Service::resource_name).collect();
        for svc in &self.services {
            if index.service(&svc.resource_name()).as_deref() != Some(svc) {
                events.push(TopologyEvent::UpsertService(svc.clone()));
            }
        }
        for key in index.service_keys() {
            if !keys.contains(&key) {
                events.push(TopologyEvent::RemoveService(key));
            }
        }

        let uids: BTreeSet<&str> = self.workloads.iter().map(|wl| wl.uid.as_str()).collect();
        for wl in &self.workloads {
            if index.workload(&wl.uid).as_deref() != Some(wl) {
                events.push(TopologyEvent::UpsertWorkload(wl.clone()));
            }
        }
        for uid in index.workload_uids() {
            if !uids.contains(uid.as_str()) {
                events.push(TopologyEvent::RemoveWorkload(uid));
            }
        }

        events
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
