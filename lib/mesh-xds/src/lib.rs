//! Endpoint generation for outbound clusters
//!
//! Decides, per proxy, service and port, whether traffic goes straight to
//! the service's endpoints or is redirected through the service's waypoint.
pub mod builder;
pub mod load_assignment;
pub mod router;

pub use builder::EndpointBuilder;
pub use load_assignment::{LbEndpoint, LoadAssignment};
pub use router::{OutboundRouter, RouteDecision};

#[cfg(test)]
pub(crate) mod test_helpers {
    use mesh_api::{GatewayAddress, Protocol, PushRequest, Service, ServicePort, TunnelProtocol, Workload};
    use mesh_core::{Features, MeshIndex, XdsUpdater};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct NoopUpdater;

    impl XdsUpdater for NoopUpdater {
        fn config_update(&self, _request: PushRequest) {}
    }

    pub const PORTS: [(&str, u16, Protocol); 5] = [
        ("tcp", 70, Protocol::Tcp),
        ("http", 80, Protocol::Http),
        ("auto-http", 8080, Protocol::Tcp),
        ("auto-tcp", 8081, Protocol::Tcp),
        ("tls", 443, Protocol::Tls),
    ];

    fn ports() -> Vec<ServicePort> {
        PORTS
            .iter()
            .map(|(name, port, protocol)| ServicePort {
                name: name.to_string(),
                port: *port,
                protocol: *protocol,
            })
            .collect()
    }

    pub fn workload(uid: &str, ip: &str, service: &str, labels: &[(&str, &str)]) -> Workload {
        Workload {
            uid: uid.to_string(),
            name: uid.to_string(),
            namespace: "default".to_string(),
            address: Some(ip.parse().unwrap()),
            tunnel_protocol: TunnelProtocol::Hbone,
            services: [(service.to_string(), BTreeMap::new())].into_iter().collect(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    /// Waypoint service at `address` accepting HBONE on 15008
    pub fn waypoint_service(namespace: &str, hostname: &str, address: &str) -> Service {
        Service {
            namespace: namespace.to_string(),
            hostname: hostname.to_string(),
            addresses: vec![address.parse().unwrap()],
            ports: vec![ServicePort {
                name: "mesh".to_string(),
                port: 15008,
                protocol: Protocol::Hbone,
            }],
            ..Default::default()
        }
    }

    /// Service on every port in `PORTS`
    pub fn service(namespace: &str, hostname: &str, vip: &str, waypoint: Option<&str>) -> Service {
        Service {
            namespace: namespace.to_string(),
            hostname: hostname.to_string(),
            addresses: vec![vip.parse().unwrap()],
            waypoint: waypoint.map(|w| GatewayAddress::new(w.parse().unwrap())),
            ports: ports(),
            ..Default::default()
        }
    }

    /// `vip.example.com` captured by waypoint `waypoint` at 3.0.0.0, which is
    /// backed by 3.0.0.1 and 3.0.0.2. `virtual-service-applied.default` is a
    /// plain service used as a route override destination.
    pub fn fixture(vip: Option<&str>, service_labels: &[(&str, &str)]) -> Arc<MeshIndex> {
        let vip_service = Service {
            namespace: "default".to_string(),
            hostname: "vip.example.com".to_string(),
            addresses: vip.map(|v| v.parse().unwrap()).into_iter().collect(),
            waypoint: Some(GatewayAddress::new("3.0.0.0".parse().unwrap())),
            ports: ports(),
            labels: service_labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let waypoint = waypoint_service("default", "waypoint", "3.0.0.0");
        let applied = service("default", "virtual-service-applied.default", "1.1.1.9", None);

        let index = Arc::new(MeshIndex::new(Features::default(), Arc::new(NoopUpdater)));
        index
            .sync(
                vec![
                    workload("waypoint-a", "3.0.0.1", "default/waypoint", &[]),
                    workload("waypoint-b", "3.0.0.2", "default/waypoint", &[]),
                    workload("app-1", "10.0.0.1", "default/vip.example.com", &[("version", "v1")]),
                    workload("app-2", "10.0.0.2", "default/vip.example.com", &[("version", "v2")]),
                    workload(
                        "applied-1",
                        "10.1.0.1",
                        "default/virtual-service-applied.default",
                        &[],
                    ),
                ],
                vec![vip_service, waypoint, applied],
            )
            .unwrap();
        index
    }
}
