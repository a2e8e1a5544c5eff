//! Load assignments handed to proxies

use std::fmt;
use std::net::SocketAddr;

/// A single entry of a load assignment
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LbEndpoint {
    /// Connect to the endpoint directly
    Direct(SocketAddr),
    /// Open a tunnel through `waypoint` carrying traffic for `target`
    Tunnel {
        target: SocketAddr,
        waypoint: SocketAddr,
    },
}

impl fmt::Display for LbEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LbEndpoint::Direct(addr) => write!(f, "{}", addr),
            LbEndpoint::Tunnel { target, waypoint } => {
                write!(f, "connect_originate;{};{}", target, waypoint)
            }
        }
    }
}

/// Endpoints of one cluster, sorted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<LbEndpoint>,
    /// True when the endpoints are the destination's waypoint
    pub redirected: bool,
}

impl LoadAssignment {
    pub fn new(cluster_name: impl Into<String>, mut endpoints: Vec<LbEndpoint>, redirected: bool) -> Self {
        endpoints.sort();
        Self {
            cluster_name: cluster_name.into(),
            endpoints,
            redirected,
        }
    }

    pub fn endpoint_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = self.endpoints.iter().map(|e| e.to_string()).collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let direct = LbEndpoint::Direct("10.0.0.1:80".parse().unwrap());
        assert_eq!(direct.to_string(), "10.0.0.1:80");

        let tunnel = LbEndpoint::Tunnel {
            target: "1.1.1.1:80".parse().unwrap(),
            waypoint: "3.0.0.1:15008".parse().unwrap(),
        };
        assert_eq!(tunnel.to_string(), "connect_originate;1.1.1.1:80;3.0.0.1:15008");
    }

    #[test]
    fn test_endpoints_sorted() {
        let assignment = LoadAssignment::new(
            "outbound|80||a",
            vec![
                LbEndpoint::Direct("10.0.0.2:80".parse().unwrap()),
                LbEndpoint::Direct("10.0.0.1:80".parse().unwrap()),
            ],
            false,
        );
        assert_eq!(assignment.endpoint_strings(), vec!["10.0.0.1:80", "10.0.0.2:80"]);
    }
}
