//! Mesh API types for the waypoint interop control plane
//!
//! This library defines the objects exchanged between the topology
//! synchronizer, the ambient index and the configuration generator:
//! - Workload: an addressable runtime instance
//! - Service: a named group of workloads with declared ports
//! - Proxy: the client a configuration is being generated for
//! - PushRequest: the selective update handed to the push scheduler

pub mod address;
pub mod proxy;
pub mod push;
pub mod service;
pub mod workload;

pub use address::{AddressError, GatewayAddress, NamespacedHostname, NetworkAddress};
pub use proxy::{Proxy, ProxyClass};
pub use push::{ConfigKey, Kind, PushRequest, TrafficDirection, TriggerReason};
pub use service::{Protocol, Service, ServicePort};
pub use workload::{TunnelProtocol, Workload};

/// Label a Service carries to let gateway-class proxies send to its waypoint
pub const INGRESS_USE_WAYPOINT_LABEL: &str = "istio.io/ingress-use-waypoint";

/// Default port for the mutually authenticated tunnel on a waypoint
pub const DEFAULT_HBONE_MTLS_PORT: u16 = 15008;
