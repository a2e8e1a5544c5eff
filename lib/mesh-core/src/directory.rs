//! Workload and service directory with its lookup indices
//!
//! The directory is mutated by a single writer. Every mutation reports the
//! set of dependencies it touched so derived projections can recompute only
//! the entries that read them.

use mesh_api::{NetworkAddress, Service, Workload};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A unit of directory state a derivation can read
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// A workload, by uid
    Workload(String),
    /// A service, by `namespace/hostname`
    Service(String),
    /// The set of services registered at an address
    Address(NetworkAddress),
    /// The set of workloads backing a service, by `namespace/hostname`
    ServiceMembers(String),
}

/// Dependencies touched by one or more directory mutations
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    dependencies: HashSet<Dependency>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn contains(&self, dep: &Dependency) -> bool {
        self.dependencies.contains(dep)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter()
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.dependencies.extend(other.dependencies);
    }

    fn insert(&mut self, dep: Dependency) {
        self.dependencies.insert(dep);
    }
}

/// Directory of workloads and services.
///
/// Indices:
/// - services by virtual address, in registration order
/// - workloads by address
/// - workloads by service membership
/// - services by hostname
#[derive(Debug, Default)]
pub struct Directory {
    workloads: BTreeMap<String, Arc<Workload>>,
    services: BTreeMap<String, Arc<Service>>,
    services_by_address: HashMap<NetworkAddress, Vec<String>>,
    workloads_by_address: HashMap<NetworkAddress, BTreeSet<String>>,
    workloads_by_service: HashMap<String, BTreeSet<String>>,
    services_by_hostname: HashMap<String, BTreeSet<String>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workload
    pub fn upsert_workload(&mut self, workload: Workload) -> ChangeSet {
        let uid = workload.uid.clone();
        let mut changes = ChangeSet::default();

        let old = self.workloads.get(&uid).cloned();
        if old.as_deref() == Some(&workload) {
            return changes;
        }
        if let Some(old) = &old {
            self.unindex_workload(old, &mut changes);
        }
        let workload = Arc::new(workload);
        self.index_workload(&workload, &mut changes);
        self.workloads.insert(uid.clone(), workload);
        changes.insert(Dependency::Workload(uid.clone()));

        debug!("Upserted workload: {}", uid);
        changes
    }

    pub fn remove_workload(&mut self, uid: &str) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if let Some(old) = self.workloads.remove(uid) {
            self.unindex_workload(&old, &mut changes);
            changes.insert(Dependency::Workload(uid.to_string()));
            debug!("Removed workload: {}", uid);
        }
        changes
    }

    /// Insert or replace a service, keyed by `namespace/hostname`
    pub fn upsert_service(&mut self, service: Service) -> ChangeSet {
        let key = service.resource_name();
        let mut changes = ChangeSet::default();

        let old = self.services.get(&key).cloned();
        if old.as_deref() == Some(&service) {
            return changes;
        }

        let old_addresses: Vec<NetworkAddress> =
            old.as_ref().map(|s| s.addresses.clone()).unwrap_or_default();
        // Addresses that are kept stay at their position in the address index
        for addr in old_addresses.iter().filter(|a| !service.addresses.contains(a)) {
            remove_ordered(&mut self.services_by_address, addr, &key);
            changes.insert(Dependency::Address(addr.clone()));
        }
        for addr in &service.addresses {
            let keys = self.services_by_address.entry(addr.clone()).or_default();
            if !keys.contains(&key) {
                keys.push(key.clone());
            }
            changes.insert(Dependency::Address(addr.clone()));
        }
        self.services_by_hostname
            .entry(service.hostname.clone())
            .or_default()
            .insert(key.clone());

        self.services.insert(key.clone(), Arc::new(service));
        changes.insert(Dependency::Service(key.clone()));

        debug!("Upserted service: {}", key);
        changes
    }

    pub fn remove_service(&mut self, key: &str) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if let Some(old) = self.services.remove(key) {
            for addr in &old.addresses {
                remove_ordered(&mut self.services_by_address, addr, key);
                changes.insert(Dependency::Address(addr.clone()));
            }
            remove_member(&mut self.services_by_hostname, &old.hostname, key);
            changes.insert(Dependency::Service(key.to_string()));
            debug!("Removed service: {}", key);
        }
        changes
    }

    pub fn workload(&self, uid: &str) -> Option<Arc<Workload>> {
        self.workloads.get(uid).cloned()
    }

    pub fn service(&self, key: &str) -> Option<Arc<Service>> {
        self.services.get(key).cloned()
    }

    /// All workloads, ordered by uid
    pub fn workloads(&self) -> impl Iterator<Item = &Arc<Workload>> {
        self.workloads.values()
    }

    /// All services, ordered by `namespace/hostname`
    pub fn services(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.services.values()
    }

    pub fn workload_count(&self) -> usize {
        self.workloads.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Services registered at an address, in registration order
    pub fn services_at(&self, addr: &NetworkAddress) -> Vec<Arc<Service>> {
        self.services_by_address
            .get(addr)
            .map(|keys| keys.iter().filter_map(|k| self.service(k)).collect())
            .unwrap_or_default()
    }

    /// Workloads registered at an address, ordered by uid
    pub fn workloads_at(&self, addr: &NetworkAddress) -> Vec<Arc<Workload>> {
        self.workloads_by_address
            .get(addr)
            .map(|uids| uids.iter().filter_map(|u| self.workload(u)).collect())
            .unwrap_or_default()
    }

    /// Workloads backing a service, ordered by uid
    pub fn workloads_for_service(&self, key: &str) -> Vec<Arc<Workload>> {
        self.workloads_by_service
            .get(key)
            .map(|uids| uids.iter().filter_map(|u| self.workload(u)).collect())
            .unwrap_or_default()
    }

    /// Services with the given hostname, ordered by `namespace/hostname`
    pub fn services_by_hostname(&self, hostname: &str) -> Vec<Arc<Service>> {
        self.services_by_hostname
            .get(hostname)
            .map(|keys| keys.iter().filter_map(|k| self.service(k)).collect())
            .unwrap_or_default()
    }

    fn index_workload(&mut self, workload: &Workload, changes: &mut ChangeSet) {
        if let Some(addr) = &workload.address {
            self.workloads_by_address
                .entry(addr.clone())
                .or_default()
                .insert(workload.uid.clone());
        }
        for svc in workload.services.keys() {
            self.workloads_by_service
                .entry(svc.clone())
                .or_default()
                .insert(workload.uid.clone());
            changes.insert(Dependency::ServiceMembers(svc.clone()));
        }
    }

    fn unindex_workload(&mut self, workload: &Workload, changes: &mut ChangeSet) {
        if let Some(addr) = &workload.address {
            remove_member(&mut self.workloads_by_address, addr, &workload.uid);
        }
        for svc in workload.services.keys() {
            remove_member(&mut self.workloads_by_service, svc, &workload.uid);
            changes.insert(Dependency::ServiceMembers(svc.clone()));
        }
    }
}

fn remove_member<K>(index: &mut HashMap<K, BTreeSet<String>>, key: &K, member: &str)
where
    K: std::hash::Hash + Eq,
{
    if let Some(members) = index.get_mut(key) {
        members.remove(member);
        if members.is_empty() {
            index.remove(key);
        }
    }
}

fn remove_ordered(index: &mut HashMap<NetworkAddress, Vec<String>>, addr: &NetworkAddress, key: &str) {
    if let Some(keys) = index.get_mut(addr) {
        keys.retain(|k| k != key);
        if keys.is_empty() {
            index.remove(addr);
        }
    }
}
