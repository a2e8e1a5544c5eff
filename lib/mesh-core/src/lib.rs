//! Core waypoint interop functionality
//!
//! This library provides:
//! - A directory of workloads and services with address and membership indices
//! - Waypoint resolution from declared waypoint addresses to services
//! - Dependency-tracked projections of which waypoint serves each destination
//! - A change notifier turning projection changes into selective pushes
//! - Per-service endpoint shards

pub mod directory;
pub mod eds;
pub mod endpoint;
pub mod error;
pub mod features;
pub mod index;
pub mod notifier;
pub mod projection;
pub mod waypoint;

pub use directory::{ChangeSet, Dependency, Directory};
pub use eds::{ServiceEds, WorkloadEds};
pub use endpoint::{EndpointIndex, MeshEndpoint};
pub use error::{CoreError, Result};
pub use features::Features;
pub use index::{IndexStats, MeshIndex, TopologyEvent, WaypointTarget};
pub use notifier::{ChangeNotifier, ChannelUpdater, XdsUpdater};
pub use waypoint::{ServiceWaypointInfo, WaypointInfo, WaypointSubject};

#[cfg(test)]
pub(crate) mod test_helpers {
    use crate::XdsUpdater;
    use mesh_api::{GatewayAddress, Protocol, PushRequest, Service, ServicePort, Workload};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingUpdater {
        requests: Mutex<Vec<PushRequest>>,
    }

    impl RecordingUpdater {
        pub fn requests(&self) -> Vec<PushRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl XdsUpdater for RecordingUpdater {
        fn config_update(&self, request: PushRequest) {
            self.requests.lock().unwrap().push(request);
        }
    }

    pub fn service(namespace: &str, hostname: &str, vip: Option<&str>, waypoint: Option<&str>) -> Service {
        Service {
            namespace: namespace.to_string(),
            hostname: hostname.to_string(),
            addresses: vip.map(|v| v.parse().unwrap()).into_iter().collect(),
            waypoint: waypoint.map(|w| GatewayAddress::new(w.parse().unwrap())),
            ports: vec![
                ServicePort {
                    name: "tcp".to_string(),
                    port: 70,
                    protocol: Protocol::Tcp,
                },
                ServicePort {
                    name: "http".to_string(),
                    port: 80,
                    protocol: Protocol::Http,
                },
            ],
            labels: BTreeMap::new(),
        }
    }

    pub fn waypoint_service(namespace: &str, hostname: &str, address: &str) -> Service {
        Service {
            namespace: namespace.to_string(),
            hostname: hostname.to_string(),
            addresses: vec![address.parse().unwrap()],
            waypoint: None,
            ports: vec![ServicePort {
                name: "mesh".to_string(),
                port: 15008,
                protocol: Protocol::Hbone,
            }],
            labels: BTreeMap::new(),
        }
    }

    pub fn workload(uid: &str, ip: &str, services: &[&str]) -> Workload {
        Workload {
            uid: uid.to_string(),
            name: uid.to_string(),
            namespace: "default".to_string(),
            address: Some(ip.parse().unwrap()),
            services: services
                .iter()
                .map(|s| (s.to_string(), BTreeMap::new()))
                .collect(),
            ..Default::default()
        }
    }
}
