//! Ambient index: the directory, its derived projections and endpoint shards

use crate::directory::{ChangeSet, Dependency, Directory};
use crate::eds::{ServiceEds, ServiceEdsDerivation, WorkloadEds, WorkloadEdsDerivation};
use crate::endpoint::{EndpointIndex, MeshEndpoint};
use crate::features::Features;
use crate::notifier::{ChangeNotifier, XdsUpdater};
use crate::projection::Projection;
use crate::waypoint::{self, ServiceWaypointInfo, WaypointInfo, WaypointSubject};
use crate::{CoreError, Result};
use mesh_api::{NamespacedHostname, PushRequest, Service, Workload};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// A change reported by the topology synchronizer
#[derive(Clone, Debug, PartialEq)]
pub enum TopologyEvent {
    UpsertWorkload(Workload),
    /// Remove a workload by uid
    RemoveWorkload(String),
    UpsertService(Service),
    /// Remove a service by `namespace/hostname`
    RemoveService(String),
}

impl TopologyEvent {
    fn validate(&self) -> Result<()> {
        match self {
            TopologyEvent::UpsertWorkload(wl) => {
                if wl.uid.is_empty() {
                    return Err(CoreError::InvalidWorkload(format!(
                        "workload {}/{} has no uid",
                        wl.namespace, wl.name
                    )));
                }
                for key in wl.services.keys() {
                    key.parse::<NamespacedHostname>()?;
                }
                Ok(())
            }
            TopologyEvent::RemoveWorkload(uid) => {
                if uid.is_empty() {
                    return Err(CoreError::InvalidWorkload("empty uid".to_string()));
                }
                Ok(())
            }
            TopologyEvent::UpsertService(svc) => {
                if svc.namespace.is_empty() || svc.hostname.is_empty() || svc.hostname.contains('/') {
                    return Err(CoreError::InvalidService(format!(
                        "invalid namespace/hostname {:?}/{:?}",
                        svc.namespace, svc.hostname
                    )));
                }
                Ok(())
            }
            TopologyEvent::RemoveService(key) => {
                key.parse::<NamespacedHostname>()?;
                Ok(())
            }
        }
    }
}

/// Counts of what the index currently holds
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub workloads: usize,
    pub services: usize,
    pub workload_eds: usize,
    pub service_eds: usize,
    pub endpoint_shards: usize,
}

/// The waypoint a service is redirected to, with the waypoint service's
/// raw endpoints
#[derive(Clone, Debug)]
pub struct WaypointTarget {
    pub capture: ServiceWaypointInfo,
    pub waypoint: Arc<Service>,
    pub endpoints: Vec<MeshEndpoint>,
}

#[derive(Debug)]
struct IndexState {
    directory: Directory,
    workload_eds: Projection<WorkloadEdsDerivation>,
    service_eds: Projection<ServiceEdsDerivation>,
    endpoints: EndpointIndex,
}

impl IndexState {
    fn rebuild_shards<'a>(&mut self, keys: impl IntoIterator<Item = &'a String>) {
        for key in keys {
            self.endpoints.rebuild_shard(&self.directory, key);
        }
    }
}

/// MeshIndex owns the directory and keeps everything derived from it
/// consistent. One writer applies topology events; any number of readers
/// query it concurrently.
pub struct MeshIndex {
    state: Arc<RwLock<IndexState>>,
    features: Features,
    notifier: ChangeNotifier,
}

impl MeshIndex {
    pub fn new(features: Features, updater: Arc<dyn XdsUpdater>) -> Self {
        Self {
            state: Arc::new(RwLock::new(IndexState {
                directory: Directory::new(),
                workload_eds: Projection::new(WorkloadEdsDerivation),
                service_eds: Projection::new(ServiceEdsDerivation),
                endpoints: EndpointIndex::new(),
            })),
            features,
            notifier: ChangeNotifier::new(updater),
        }
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Load a full snapshot. Projections are computed but no push is sent.
    pub fn sync(&self, workloads: Vec<Workload>, services: Vec<Service>) -> Result<()> {
        let events: Vec<TopologyEvent> = services
            .into_iter()
            .map(TopologyEvent::UpsertService)
            .chain(workloads.into_iter().map(TopologyEvent::UpsertWorkload))
            .collect();
        for event in &events {
            event.validate()?;
        }

        let mut state = self.write();
        for event in events {
            apply_to(&mut state.directory, event);
        }
        let state = &mut *state;
        let workload_events = state.workload_eds.sync(&state.directory);
        let service_events = state.service_eds.sync(&state.directory);
        let keys: Vec<String> = state.directory.services().map(|s| s.resource_name()).collect();
        state.rebuild_shards(&keys);

        info!(
            "Initial sync complete: {} workloads, {} services, {} workload eds, {} service eds",
            state.directory.workload_count(),
            state.directory.service_count(),
            state.workload_eds.len(),
            state.service_eds.len()
        );

        let mut batch = self.notifier.batch(true);
        batch.collect(&workload_events);
        batch.collect(&service_events);
        batch.flush();
        Ok(())
    }

    /// Apply one topology event
    pub fn apply(&self, event: TopologyEvent) -> Result<Option<PushRequest>> {
        self.apply_batch(vec![event])
    }

    /// Apply several topology events as one batch. All affected
    /// configuration is pushed in at most one request.
    pub fn apply_batch(&self, events: Vec<TopologyEvent>) -> Result<Option<PushRequest>> {
        for event in &events {
            event.validate()?;
        }

        let (workload_events, service_events) = {
            let mut guard = self.write();
            let state = &mut *guard;
            let mut changes = ChangeSet::default();
            for event in events {
                changes.merge(apply_to(&mut state.directory, event));
            }
            if changes.is_empty() {
                return Ok(None);
            }

            let workload_events = state.workload_eds.recompute(&state.directory, &changes);
            let service_events = state.service_eds.recompute(&state.directory, &changes);

            let touched: BTreeSet<String> = changes
                .iter()
                .filter_map(|dep| match dep {
                    Dependency::Service(key) | Dependency::ServiceMembers(key) => Some(key.clone()),
                    _ => None,
                })
                .collect();
            state.rebuild_shards(&touched);

            debug!(
                "Applied {} dependency changes: {} workload eds events, {} service eds events",
                changes.len(),
                workload_events.len(),
                service_events.len()
            );
            (workload_events, service_events)
        };

        let mut batch = self.notifier.batch(false);
        batch.collect(&workload_events);
        batch.collect(&service_events);
        Ok(batch.flush())
    }

    /// Services captured by a usable waypoint; `key` is empty for all
    /// services or `namespace/hostname` for one
    pub fn services_with_waypoint(&self, key: &str) -> Vec<ServiceWaypointInfo> {
        waypoint::services_with_waypoint(&self.features, &self.read().directory, key)
    }

    /// Waypoint capturing the service `namespace/hostname`, resolved by
    /// address together with its endpoints under a single read lock
    pub fn waypoint_target(&self, service_key: &str) -> Option<WaypointTarget> {
        let state = self.read();
        let captures = waypoint::services_with_waypoint(&self.features, &state.directory, service_key);
        if captures.len() > 1 {
            warn!("unexpected multiple waypoint services for {}", service_key);
        }
        let capture = captures.into_iter().next()?;
        let waypoint = state.directory.service(&capture.waypoint_key)?;
        let endpoints = state.endpoints.shard(&capture.waypoint_key).to_vec();
        Some(WaypointTarget {
            capture,
            waypoint,
            endpoints,
        })
    }

    pub fn resolve_waypoint<S: WaypointSubject>(&self, subject: &Arc<S>) -> Option<WaypointInfo<S>> {
        waypoint::resolve_waypoint(&self.features, &self.read().directory, subject)
    }

    pub fn service(&self, key: &str) -> Option<Arc<Service>> {
        self.read().directory.service(key)
    }

    pub fn workload(&self, uid: &str) -> Option<Arc<Workload>> {
        self.read().directory.workload(uid)
    }

    /// Service for a hostname, preferring the given namespace and otherwise
    /// the first by `namespace/hostname`
    pub fn service_for_hostname(&self, hostname: &str, preferred_namespace: &str) -> Option<Arc<Service>> {
        let candidates = self.read().directory.services_by_hostname(hostname);
        candidates
            .iter()
            .find(|s| s.namespace == preferred_namespace)
            .or_else(|| candidates.first())
            .cloned()
    }

    /// Raw endpoints of a service, sorted
    pub fn endpoints(&self, service_key: &str) -> Vec<MeshEndpoint> {
        self.read().endpoints.shard(service_key).to_vec()
    }

    pub fn workload_eds(&self, uid: &str) -> Option<WorkloadEds> {
        self.read().workload_eds.get(uid).cloned()
    }

    pub fn service_eds(&self, key: &str) -> Option<ServiceEds> {
        self.read().service_eds.get(key).cloned()
    }

    pub fn workload_uids(&self) -> Vec<String> {
        self.read().directory.workloads().map(|w| w.uid.clone()).collect()
    }

    pub fn service_keys(&self) -> Vec<String> {
        self.read().directory.services().map(|s| s.resource_name()).collect()
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.read();
        IndexStats {
            workloads: state.directory.workload_count(),
            services: state.directory.service_count(),
            workload_eds: state.workload_eds.len(),
            service_eds: state.service_eds.len(),
            endpoint_shards: state.endpoints.shard_count(),
        }
    }

    /// JSON summary of index contents and waypoint captures
    pub fn config_dump(&self) -> Result<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Capture {
            service: String,
            waypoint_hostname: String,
        }
        #[derive(Serialize)]
        struct Dump {
            stats: IndexStats,
            waypoints: Vec<Capture>,
        }

        let dump = Dump {
            stats: self.stats(),
            waypoints: self
                .services_with_waypoint("")
                .into_iter()
                .map(|info| Capture {
                    service: info.service.resource_name(),
                    waypoint_hostname: info.waypoint_hostname,
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&dump)?)
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_to(directory: &mut Directory, event: TopologyEvent) -> ChangeSet {
    match event {
        TopologyEvent::UpsertWorkload(wl) => directory.upsert_workload(wl),
        TopologyEvent::RemoveWorkload(uid) => directory.remove_workload(&uid),
        TopologyEvent::UpsertService(svc) => directory.upsert_service(svc),
        TopologyEvent::RemoveService(key) => directory.remove_service(&key),
    }
}
