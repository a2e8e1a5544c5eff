//! Outbound routing: waypoint redirection first, then host route overrides

use crate::builder::EndpointBuilder;
use crate::load_assignment::LoadAssignment;
use mesh_api::Proxy;
use mesh_core::MeshIndex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Cluster selected for a proxy/service/port and its endpoints
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDecision {
    pub cluster_name: String,
    pub load_assignment: LoadAssignment,
}

impl RouteDecision {
    pub fn redirected(&self) -> bool {
        self.load_assignment.redirected
    }
}

/// Router for outbound traffic from proxies
pub struct OutboundRouter {
    index: Arc<MeshIndex>,
    // (host pattern, destination hostname), first match wins
    overrides: Vec<(String, String)>,
}

impl OutboundRouter {
    /// Create a new router over an index
    pub fn new(index: Arc<MeshIndex>) -> Self {
        Self {
            index,
            overrides: Vec::new(),
        }
    }

    /// Send traffic for hosts matching `pattern` to `destination` instead
    pub fn with_override(mut self, pattern: impl Into<String>, destination: impl Into<String>) -> Self {
        self.overrides.push((pattern.into(), destination.into()));
        self
    }

    /// Match a hostname against a route host pattern
    pub fn match_host(&self, host: &str, pattern: &str) -> bool {
        if pattern == "*" || pattern == host {
            return true;
        }
        // Wildcard subdomain match
        if let Some(suffix) = pattern.strip_prefix("*.") {
            return host.len() > suffix.len() + 1
                && host.ends_with(suffix)
                && host.as_bytes()[host.len() - suffix.len() - 1] == b'.';
        }
        false
    }

    /// Hostnames of services captured by a waypoint. Route rules are not
    /// applied to these hosts. Empty when waypoint interop is disabled.
    pub fn waypoint_service_hosts(&self) -> BTreeSet<String> {
        self.index
            .services_with_waypoint("")
            .into_iter()
            .map(|info| info.service.hostname.clone())
            .collect()
    }

    /// Pick the cluster and endpoints for traffic from `proxy` to `hostname:port`
    pub fn route(&self, proxy: &Proxy, hostname: &str, port: u16) -> RouteDecision {
        let builder = EndpointBuilder::new(&self.index, proxy, hostname, port);
        let assignment = builder.build_load_assignment();
        if assignment.redirected {
            // waypoint redirection takes precedence over route rules
            return RouteDecision {
                cluster_name: builder.cluster_name().to_string(),
                load_assignment: assignment,
            };
        }

        if let Some(destination) = self.override_for(hostname) {
            debug!("Route override for {}: {}", hostname, destination);
            let target = EndpointBuilder::new(&self.index, proxy, destination, port);
            return RouteDecision {
                cluster_name: target.cluster_name().to_string(),
                load_assignment: target.build_load_assignment(),
            };
        }

        RouteDecision {
            cluster_name: builder.cluster_name().to_string(),
            load_assignment: assignment,
        }
    }

    /// Get the index
    pub fn index(&self) -> &Arc<MeshIndex> {
        &self.index
    }

    fn override_for(&self, hostname: &str) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(pattern, _)| self.match_host(hostname, pattern))
            .map(|(_, destination)| destination.as_str())
    }
}
