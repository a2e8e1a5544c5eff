//! Waypoint resolution
//!
//! Maps the waypoint address declared by a Service or Workload to the
//! Service registered at that address. Every miss degrades to `None`: the
//! topology is eventually consistent and the waypoint may simply not be
//! registered yet.

use crate::directory::Directory;
use crate::features::Features;
use mesh_api::{GatewayAddress, NetworkAddress, Service, Workload};
use std::sync::Arc;
use tracing::warn;

/// Something that can be captured by a waypoint
pub trait WaypointSubject {
    fn waypoint(&self) -> Option<&GatewayAddress>;

    /// Name used when logging anomalies
    fn subject_name(&self) -> String;
}

impl WaypointSubject for Service {
    fn waypoint(&self) -> Option<&GatewayAddress> {
        self.waypoint.as_ref()
    }

    fn subject_name(&self) -> String {
        self.resource_name()
    }
}

impl WaypointSubject for Workload {
    fn waypoint(&self) -> Option<&GatewayAddress> {
        self.waypoint.as_ref()
    }

    fn subject_name(&self) -> String {
        self.uid.clone()
    }
}

/// A subject paired with the waypoint service serving it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaypointInfo<S> {
    pub service: Arc<S>,
    pub waypoint_hostname: String,
    /// `namespace/hostname` of the waypoint service found at the address
    pub waypoint_key: String,
}

pub type ServiceWaypointInfo = WaypointInfo<Service>;

/// Resolve the waypoint for a subject against the current directory
pub fn resolve_waypoint<S: WaypointSubject>(
    features: &Features,
    directory: &Directory,
    subject: &Arc<S>,
) -> Option<WaypointInfo<S>> {
    if !features.waypoint_interop_enabled() {
        return None;
    }
    let waypoint = waypoint_service(directory, subject.as_ref())?;
    Some(WaypointInfo {
        service: subject.clone(),
        waypoint_hostname: waypoint.hostname.clone(),
        waypoint_key: waypoint.resource_name(),
    })
}

/// Services captured by a usable waypoint.
///
/// `key` is either empty, meaning all services, or `namespace/hostname`.
/// A waypoint is usable only when at least one workload backs it.
pub fn services_with_waypoint(
    features: &Features,
    directory: &Directory,
    key: &str,
) -> Vec<ServiceWaypointInfo> {
    if !features.waypoint_interop_enabled() {
        return Vec::new();
    }
    let services: Vec<Arc<Service>> = if key.is_empty() {
        directory.services().cloned().collect()
    } else {
        directory.service(key).into_iter().collect()
    };

    services
        .into_iter()
        .filter_map(|svc| {
            let waypoint = waypoint_service(directory, svc.as_ref())?;
            if directory
                .workloads_for_service(&waypoint.resource_name())
                .is_empty()
            {
                return None;
            }
            Some(ServiceWaypointInfo {
                waypoint_hostname: waypoint.hostname.clone(),
                waypoint_key: waypoint.resource_name(),
                service: svc,
            })
        })
        .collect()
}

fn waypoint_service<S: WaypointSubject>(directory: &Directory, subject: &S) -> Option<Arc<Service>> {
    let addr = &subject.waypoint()?.destination;
    pick_waypoint_service(addr, directory.services_at(addr), &subject.subject_name())
}

/// Pick the service backing a waypoint address.
///
/// Candidates are in address-index registration order. More than one
/// candidate is an anomaly: warn and take the first.
pub(crate) fn pick_waypoint_service(
    addr: &NetworkAddress,
    candidates: Vec<Arc<Service>>,
    subject: &str,
) -> Option<Arc<Service>> {
    if candidates.len() > 1 {
        warn!(
            "unexpected multiple waypoint services at {} for {}, using {}",
            addr,
            subject,
            candidates[0].resource_name()
        );
    }
    candidates.into_iter().next()
}
