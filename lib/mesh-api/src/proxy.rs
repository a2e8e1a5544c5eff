use serde::{Deserialize, Serialize};

/// Role of the proxy configuration is generated for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyClass {
    Sidecar,
    /// Ingress or other gateway deployments
    Gateway,
    Waypoint,
}

/// A connected proxy requesting configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    pub id: String,
    pub class: ProxyClass,
    /// Namespace the proxy reads configuration from
    pub config_namespace: String,
    #[serde(default)]
    pub network: String,
}

impl Proxy {
    pub fn new(id: impl Into<String>, class: ProxyClass, config_namespace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class,
            config_namespace: config_namespace.into(),
            network: String::new(),
        }
    }

    pub fn is_waypoint(&self) -> bool {
        self.class == ProxyClass::Waypoint
    }

    pub fn is_gateway(&self) -> bool {
        self.class == ProxyClass::Gateway
    }
}
