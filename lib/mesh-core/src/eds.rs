//! Endpoint-facing views of the directory
//!
//! Proxies need two facts when sending to a destination: whether it
//! accepts tunneled traffic, and whether a waypoint must be traversed
//! first. These projections track both so that a change anywhere along the
//! join (the workload, the waypoint's address registration, or the
//! waypoint's backing workloads) triggers a push for the affected services.

use crate::notifier::AffectedConfigs;
use crate::projection::{Derivation, FetchContext, Source};
use mesh_api::{ConfigKey, TunnelProtocol, Workload};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Per-workload view
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadEds {
    pub workload_key: String,
    pub tunnel_protocol: TunnelProtocol,
    /// Workloads backing the resolved waypoint; `None` when no waypoint
    /// resolves, possibly empty when one does
    pub waypoint_instances: Option<Vec<Arc<Workload>>>,
    /// `namespace/hostname` of every service the workload backs, sorted
    pub service_hostnames: Vec<String>,
}

/// Per-service view, present only for services with a usable waypoint
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceEds {
    pub service_key: String,
    pub waypoint_instances: Vec<Arc<Workload>>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WorkloadEdsDerivation;

impl Derivation for WorkloadEdsDerivation {
    type Output = WorkloadEds;

    fn name(&self) -> &'static str {
        "WorkloadEds"
    }

    fn source(&self) -> Source {
        Source::Workloads
    }

    fn derive(&self, ctx: &mut FetchContext<'_>, key: &str) -> Option<WorkloadEds> {
        let wl = ctx.workload(key)?;
        let waypoint_instances = wl.waypoint.as_ref().and_then(|wp| {
            let svc = ctx.service_at(&wp.destination, &wl.uid)?;
            Some(ctx.workloads_for_service(&svc.resource_name()))
        });
        if waypoint_instances.is_none() && !wl.supports_tunnel() {
            return None;
        }
        Some(WorkloadEds {
            workload_key: wl.resource_name().to_string(),
            tunnel_protocol: wl.tunnel_protocol,
            waypoint_instances,
            // BTreeMap keys are already in lexical order
            service_hostnames: wl.services.keys().cloned().collect(),
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ServiceEdsDerivation;

impl Derivation for ServiceEdsDerivation {
    type Output = ServiceEds;

    fn name(&self) -> &'static str {
        "ServiceEds"
    }

    fn source(&self) -> Source {
        Source::Services
    }

    fn derive(&self, ctx: &mut FetchContext<'_>, key: &str) -> Option<ServiceEds> {
        let svc = ctx.service(key)?;
        let wp = svc.waypoint.as_ref()?;
        let waypoint_svc = ctx.service_at(&wp.destination, key)?;
        let instances = ctx.workloads_for_service(&waypoint_svc.resource_name());
        if instances.is_empty() {
            return None;
        }
        Some(ServiceEds {
            service_key: svc.resource_name(),
            waypoint_instances: instances,
        })
    }
}

impl AffectedConfigs for WorkloadEds {
    fn affected_configs(&self, configs: &mut BTreeSet<ConfigKey>) {
        for svc in &self.service_hostnames {
            configs.insert(ConfigKey::from_service_key(svc));
        }
    }
}

impl AffectedConfigs for ServiceEds {
    fn affected_configs(&self, configs: &mut BTreeSet<ConfigKey>) {
        configs.insert(ConfigKey::from_service_key(&self.service_key));
    }
}
