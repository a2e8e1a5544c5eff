use crate::address::{GatewayAddress, NamespacedHostname, NetworkAddress};
use crate::proxy::Proxy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Http2,
    Grpc,
    Tls,
    #[default]
    Tcp,
    Hbone,
}

/// A port declared by a Service
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Service is a named group of workloads, optionally fronted by virtual addresses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub namespace: String,

    pub hostname: String,

    /// Virtual addresses; empty for headless services
    #[serde(default)]
    pub addresses: Vec<NetworkAddress>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoint: Option<GatewayAddress>,

    #[serde(default)]
    pub ports: Vec<ServicePort>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Service {
    /// Resource key in the form `namespace/hostname`
    pub fn resource_name(&self) -> String {
        format!("{}/{}", self.namespace, self.hostname)
    }

    pub fn namespaced_hostname(&self) -> NamespacedHostname {
        NamespacedHostname::new(self.namespace.clone(), self.hostname.clone())
    }

    /// Virtual address reachable from the proxy's network, if any
    pub fn address_for_proxy(&self, proxy: &Proxy) -> Option<&NetworkAddress> {
        self.addresses
            .iter()
            .find(|addr| addr.network == proxy.network)
    }

    pub fn port_by_number(&self, port: u16) -> Option<&ServicePort> {
        self.ports.iter().find(|p| p.port == port)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyClass;

    fn service() -> Service {
        Service {
            namespace: "default".to_string(),
            hostname: "vip.example.com".to_string(),
            addresses: vec!["1.1.1.1".parse().unwrap(), "net2/2.2.2.2".parse().unwrap()],
            ports: vec![ServicePort {
                name: "http".to_string(),
                port: 80,
                protocol: Protocol::Http,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(service().resource_name(), "default/vip.example.com");
    }

    #[test]
    fn test_address_for_proxy_matches_network() {
        let svc = service();
        let mut proxy = Proxy::new("sidecar~10.0.0.1", ProxyClass::Sidecar, "default");
        assert_eq!(
            svc.address_for_proxy(&proxy).map(|a| a.address.to_string()),
            Some("1.1.1.1".to_string())
        );

        proxy.network = "net2".to_string();
        assert_eq!(
            svc.address_for_proxy(&proxy).map(|a| a.address.to_string()),
            Some("2.2.2.2".to_string())
        );

        proxy.network = "net3".to_string();
        assert!(svc.address_for_proxy(&proxy).is_none());
    }

    #[test]
    fn test_headless_has_no_address() {
        let svc = Service {
            addresses: vec![],
            ..service()
        };
        let proxy = Proxy::new("sidecar~10.0.0.1", ProxyClass::Sidecar, "default");
        assert!(svc.address_for_proxy(&proxy).is_none());
    }

    #[test]
    fn test_port_lookup() {
        let svc = service();
        assert_eq!(svc.port_by_number(80).map(|p| p.name.as_str()), Some("http"));
        assert!(svc.port_by_number(81).is_none());
    }
}
