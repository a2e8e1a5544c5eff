//! Endpoint selection for a single outbound cluster

use crate::load_assignment::{LbEndpoint, LoadAssignment};
use mesh_api::{Proxy, Service, TrafficDirection, INGRESS_USE_WAYPOINT_LABEL};
use mesh_core::{MeshEndpoint, MeshIndex};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Builds the endpoints of `hostname:port` as seen by one proxy
pub struct EndpointBuilder<'a> {
    index: &'a MeshIndex,
    proxy: &'a Proxy,
    cluster_name: String,
    port: u16,
    service: Option<Arc<Service>>,
    subset_labels: BTreeMap<String, String>,
}

impl<'a> EndpointBuilder<'a> {
    /// Builder for the outbound cluster of `hostname:port`. The service is
    /// looked up by hostname, preferring the proxy's namespace.
    pub fn new(index: &'a MeshIndex, proxy: &'a Proxy, hostname: &str, port: u16) -> Self {
        let service = index.service_for_hostname(hostname, &proxy.config_namespace);
        Self::build(index, proxy, hostname, port, service)
    }

    pub fn for_service(index: &'a MeshIndex, proxy: &'a Proxy, service: Arc<Service>, port: u16) -> Self {
        let hostname = service.hostname.clone();
        Self::build(index, proxy, &hostname, port, Some(service))
    }

    fn build(
        index: &'a MeshIndex,
        proxy: &'a Proxy,
        hostname: &str,
        port: u16,
        service: Option<Arc<Service>>,
    ) -> Self {
        Self {
            index,
            proxy,
            cluster_name: TrafficDirection::Outbound.subset_key("", hostname, port),
            port,
            service,
            subset_labels: BTreeMap::new(),
        }
    }

    /// Only select endpoints carrying all of these labels
    pub fn with_subset_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.subset_labels = labels;
        self
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn service(&self) -> Option<&Arc<Service>> {
        self.service.as_ref()
    }

    /// Endpoints of the service serving this cluster's port and subset,
    /// sorted. `None` if the service or the port does not exist.
    pub fn snapshot_endpoints_for_port(&self) -> Option<Vec<MeshEndpoint>> {
        let svc = self.service.as_ref()?;
        let endpoints = self.index.endpoints(&svc.resource_name());
        select_for_port(svc, self.port, endpoints, &self.subset_labels)
    }

    /// For services that have a waypoint, send to the waypoint rather than
    /// the service endpoints. Returns the waypoint's endpoints and whether
    /// the redirect applies.
    pub fn find_waypoint_redirect(&self) -> (Vec<MeshEndpoint>, bool) {
        const NO_REDIRECT: (Vec<MeshEndpoint>, bool) = (Vec::new(), false);

        let Some(svc) = self.service.as_ref() else {
            return NO_REDIRECT;
        };
        if self.proxy.is_waypoint() {
            // waypoints don't chain to each other
            return NO_REDIRECT;
        }
        if self.proxy.is_gateway() && svc.label(INGRESS_USE_WAYPOINT_LABEL) != Some("true") {
            return NO_REDIRECT;
        }
        if svc.address_for_proxy(self.proxy).is_none() {
            // waypoints only accept traffic addressed to a VIP
            return NO_REDIRECT;
        }

        // waypoint service, as found at the captured address
        let Some(target) = self.index.waypoint_target(&svc.resource_name()) else {
            return NO_REDIRECT;
        };
        let Some(waypoint) = target.capture.service.waypoint.as_ref() else {
            return NO_REDIRECT;
        };

        let port = waypoint.hbone_mtls_port;
        let endpoints = select_for_port(&target.waypoint, port, target.endpoints, &BTreeMap::new())
            .unwrap_or_default();
        debug!(
            "Redirecting {} for {} to waypoint {} ({} endpoints)",
            self.cluster_name,
            self.proxy.id,
            TrafficDirection::Outbound.subset_key("", &target.capture.waypoint_hostname, port),
            endpoints.len()
        );
        (endpoints, true)
    }

    /// Load assignment for this cluster, with waypoint redirection applied
    pub fn build_load_assignment(&self) -> LoadAssignment {
        let (waypoint_endpoints, redirected) = self.find_waypoint_redirect();
        let vip = self
            .service
            .as_deref()
            .and_then(|svc| svc.address_for_proxy(self.proxy));

        let endpoints = match (redirected, vip) {
            (true, Some(vip)) => {
                let target = SocketAddr::new(vip.address, self.port);
                waypoint_endpoints
                    .iter()
                    .map(|ep| LbEndpoint::Tunnel {
                        target,
                        waypoint: SocketAddr::new(ep.address, ep.port),
                    })
                    .collect()
            }
            _ => self
                .snapshot_endpoints_for_port()
                .unwrap_or_default()
                .iter()
                .map(|ep| LbEndpoint::Direct(SocketAddr::new(ep.address, ep.port)))
                .collect(),
        };
        LoadAssignment::new(self.cluster_name.clone(), endpoints, redirected)
    }
}

/// Keep the endpoints serving `port` of `svc` that carry every subset
/// label, sorted. `None` if the service has no such port.
fn select_for_port(
    svc: &Service,
    port: u16,
    mut endpoints: Vec<MeshEndpoint>,
    subset_labels: &BTreeMap<String, String>,
) -> Option<Vec<MeshEndpoint>> {
    let Some(svc_port) = svc.port_by_number(port) else {
        debug!("No port {} on service {}", port, svc.resource_name());
        return None;
    };
    endpoints.retain(|ep| ep.service_port_name == svc_port.name && ep.matches_subset(subset_labels));
    endpoints.sort();
    Some(endpoints)
}
