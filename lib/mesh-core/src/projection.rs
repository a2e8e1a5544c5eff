//! Incrementally maintained views over the directory
//!
//! A [`Derivation`] computes one optional output per primary entity (a
//! workload or a service). It reads the directory only through a
//! [`FetchContext`], which records every dependency the computation
//! touched, including those reached through index joins. When the directory
//! changes, a [`Projection`] recomputes exactly the entries whose recorded
//! dependencies intersect the change set, diffs them against their previous
//! value and reports the difference as [`Event`]s.

use crate::directory::{ChangeSet, Dependency, Directory};
use crate::waypoint::pick_waypoint_service;
use mesh_api::{NetworkAddress, Service, Workload};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A change to a projection entry
#[derive(Clone, Debug, PartialEq)]
pub enum Event<T> {
    Add(T),
    Update { old: T, new: T },
    Delete(T),
}

impl<T> Event<T> {
    /// Every value carried by the event. Updates yield both the old and the
    /// new value, so anything the old value referenced is also reported.
    pub fn items(&self) -> Vec<&T> {
        match self {
            Event::Add(v) | Event::Delete(v) => vec![v],
            Event::Update { old, new } => vec![old, new],
        }
    }
}

/// Collection a derivation is keyed by
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Workloads,
    Services,
}

/// Read access to the directory that records what was read
pub struct FetchContext<'a> {
    directory: &'a Directory,
    dependencies: HashSet<Dependency>,
}

impl<'a> FetchContext<'a> {
    fn new(directory: &'a Directory) -> Self {
        Self {
            directory,
            dependencies: HashSet::new(),
        }
    }

    pub fn workload(&mut self, uid: &str) -> Option<Arc<Workload>> {
        self.dependencies.insert(Dependency::Workload(uid.to_string()));
        self.directory.workload(uid)
    }

    pub fn service(&mut self, key: &str) -> Option<Arc<Service>> {
        self.dependencies.insert(Dependency::Service(key.to_string()));
        self.directory.service(key)
    }

    /// The single service registered at an address. Multiple registrations
    /// are logged and resolved to the first registered.
    pub fn service_at(&mut self, addr: &NetworkAddress, subject: &str) -> Option<Arc<Service>> {
        self.dependencies.insert(Dependency::Address(addr.clone()));
        let found = pick_waypoint_service(addr, self.directory.services_at(addr), subject)?;
        self.dependencies
            .insert(Dependency::Service(found.resource_name()));
        Some(found)
    }

    /// Workloads backing a service, ordered by uid
    pub fn workloads_for_service(&mut self, key: &str) -> Vec<Arc<Workload>> {
        self.dependencies
            .insert(Dependency::ServiceMembers(key.to_string()));
        let workloads = self.directory.workloads_for_service(key);
        for wl in &workloads {
            self.dependencies.insert(Dependency::Workload(wl.uid.clone()));
        }
        workloads
    }
}

/// Pure function from directory state to one projection entry
pub trait Derivation {
    type Output: Clone + PartialEq + fmt::Debug;

    fn name(&self) -> &'static str;

    fn source(&self) -> Source;

    /// Compute the entry for a primary key, or `None` when there is nothing
    /// to report. Must read the directory only through `ctx`.
    fn derive(&self, ctx: &mut FetchContext<'_>, key: &str) -> Option<Self::Output>;
}

#[derive(Debug)]
struct Tracked<T> {
    value: Option<T>,
    dependencies: HashSet<Dependency>,
}

/// Materialized, dependency-tracked output of a derivation
pub struct Projection<D: Derivation> {
    derivation: D,
    entries: BTreeMap<String, Tracked<D::Output>>,
    dependents: HashMap<Dependency, BTreeSet<String>>,
}

impl<D: Derivation> Projection<D> {
    pub fn new(derivation: D) -> Self {
        Self {
            derivation,
            entries: BTreeMap::new(),
            dependents: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.derivation.name()
    }

    pub fn get(&self, key: &str) -> Option<&D::Output> {
        self.entries.get(key).and_then(|t| t.value.as_ref())
    }

    /// Present entries, ordered by primary key
    pub fn list(&self) -> impl Iterator<Item = &D::Output> {
        self.entries.values().filter_map(|t| t.value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.list().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute every entry from scratch
    pub fn sync(&mut self, directory: &Directory) -> Vec<Event<D::Output>> {
        let mut keys: BTreeSet<String> = self.entries.keys().cloned().collect();
        keys.extend(self.primary_keys(directory));
        self.recompute_keys(directory, keys)
    }

    /// Recompute the entries affected by a change set
    pub fn recompute(&mut self, directory: &Directory, changes: &ChangeSet) -> Vec<Event<D::Output>> {
        let source = self.derivation.source();
        let mut keys = BTreeSet::new();
        for dep in changes.iter() {
            match (source, dep) {
                (Source::Workloads, Dependency::Workload(uid)) => {
                    keys.insert(uid.clone());
                }
                (Source::Services, Dependency::Service(key)) => {
                    keys.insert(key.clone());
                }
                _ => {}
            }
            if let Some(dependents) = self.dependents.get(dep) {
                keys.extend(dependents.iter().cloned());
            }
        }
        self.recompute_keys(directory, keys)
    }

    fn primary_keys(&self, directory: &Directory) -> Vec<String> {
        match self.derivation.source() {
            Source::Workloads => directory.workloads().map(|w| w.uid.clone()).collect(),
            Source::Services => directory.services().map(|s| s.resource_name()).collect(),
        }
    }

    fn primary_exists(&self, directory: &Directory, key: &str) -> bool {
        match self.derivation.source() {
            Source::Workloads => directory.workload(key).is_some(),
            Source::Services => directory.service(key).is_some(),
        }
    }

    fn recompute_keys(
        &mut self,
        directory: &Directory,
        keys: BTreeSet<String>,
    ) -> Vec<Event<D::Output>> {
        let mut events = Vec::new();
        for key in keys {
            let old = self.entries.remove(&key);
            if let Some(old) = &old {
                self.unlink(&key, &old.dependencies);
            }
            let old_value = old.and_then(|t| t.value);

            let new_value = if self.primary_exists(directory, &key) {
                let mut ctx = FetchContext::new(directory);
                let value = self.derivation.derive(&mut ctx, &key);
                self.link(&key, &ctx.dependencies);
                self.entries.insert(
                    key.clone(),
                    Tracked {
                        value: value.clone(),
                        dependencies: ctx.dependencies,
                    },
                );
                value
            } else {
                None
            };

            let event = match (old_value, new_value) {
                (None, Some(new)) => Some(Event::Add(new)),
                (Some(old), None) => Some(Event::Delete(old)),
                (Some(old), Some(new)) if old != new => Some(Event::Update { old, new }),
                _ => None,
            };
            if let Some(event) = event {
                trace!("{}: {:?}", self.derivation.name(), event);
                events.push(event);
            }
        }
        events
    }

    fn link(&mut self, key: &str, dependencies: &HashSet<Dependency>) {
        for dep in dependencies {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn unlink(&mut self, key: &str, dependencies: &HashSet<Dependency>) {
        for dep in dependencies {
            if let Some(keys) = self.dependents.get_mut(dep) {
                keys.remove(key);
                if keys.is_empty() {
                    self.dependents.remove(dep);
                }
            }
        }
    }
}

impl<D: Derivation> fmt::Debug for Projection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("name", &self.derivation.name())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{service, workload};

    /// Number of members of each service
    struct MemberCount;

    impl Derivation for MemberCount {
        type Output = (String, usize);

        fn name(&self) -> &'static str {
            "MemberCount"
        }

        fn source(&self) -> Source {
            Source::Services
        }

        fn derive(&self, ctx: &mut FetchContext<'_>, key: &str) -> Option<Self::Output> {
            let svc = ctx.service(key)?;
            let members = ctx.workloads_for_service(&svc.resource_name());
            if members.is_empty() {
                return None;
            }
            Some((key.to_string(), members.len()))
        }
    }

    #[test]
    fn test_sync_then_join_change() {
        let mut dir = Directory::new();
        dir.upsert_service(service("default", "a", Some("1.1.1.1"), None));
        let mut projection = Projection::new(MemberCount);

        assert!(projection.sync(&dir).is_empty());
        assert!(projection.get("default/a").is_none());

        let changes = dir.upsert_workload(workload("w1", "10.0.0.1", &["default/a"]));
        let events = projection.recompute(&dir, &changes);
        assert_eq!(events, vec![Event::Add(("default/a".to_string(), 1))]);

        let changes = dir.upsert_workload(workload("w2", "10.0.0.2", &["default/a"]));
        let events = projection.recompute(&dir, &changes);
        assert_eq!(
            events,
            vec![Event::Update {
                old: ("default/a".to_string(), 1),
                new: ("default/a".to_string(), 2),
            }]
        );
    }

    #[test]
    fn test_entry_removed_with_primary() {
        let mut dir = Directory::new();
        dir.upsert_service(service("default", "a", Some("1.1.1.1"), None));
        dir.upsert_workload(workload("w1", "10.0.0.1", &["default/a"]));
        let mut projection = Projection::new(MemberCount);
        projection.sync(&dir);

        let changes = dir.remove_service("default/a");
        let events = projection.recompute(&dir, &changes);
        assert_eq!(events, vec![Event::Delete(("default/a".to_string(), 1))]);
        assert!(projection.is_empty());
    }

    #[test]
    fn test_unrelated_change_is_ignored() {
        let mut dir = Directory::new();
        dir.upsert_service(service("default", "a", Some("1.1.1.1"), None));
        dir.upsert_workload(workload("w1", "10.0.0.1", &["default/a"]));
        let mut projection = Projection::new(MemberCount);
        projection.sync(&dir);

        let changes = dir.upsert_workload(workload("w9", "10.0.0.9", &["default/b"]));
        assert!(projection.recompute(&dir, &changes).is_empty());
        assert_eq!(projection.len(), 1);
    }

    #[test]
    fn test_update_items_include_old_and_new() {
        let event = Event::Update { old: 1, new: 2 };
        assert_eq!(event.items(), vec![&1, &2]);
    }
}
