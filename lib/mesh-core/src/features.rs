//! Runtime feature gates
//!
//! Gates are read on every call rather than captured at construction, so a
//! toggle is observed by all holders of the handle immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Environment variable controlling waypoint interop
pub const ENABLE_WAYPOINT_INTEROP: &str = "ENABLE_WAYPOINT_INTEROP";

/// Shared feature gate handle. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct Features {
    waypoint_interop: Arc<AtomicBool>,
}

impl Features {
    pub fn new(waypoint_interop: bool) -> Self {
        Self {
            waypoint_interop: Arc::new(AtomicBool::new(waypoint_interop)),
        }
    }

    /// Load gates from the process environment
    pub fn from_env() -> Self {
        let enabled = match std::env::var(ENABLE_WAYPOINT_INTEROP) {
            Ok(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(
                    "Ignoring invalid value {:?} for {}, using default",
                    raw, ENABLE_WAYPOINT_INTEROP
                );
                true
            }),
            Err(_) => true,
        };
        Self::new(enabled)
    }

    /// If true, sidecars connect directly to a waypoint when the destination
    /// service has one. Gateways do the same only for services carrying the
    /// ingress opt-in label.
    pub fn waypoint_interop_enabled(&self) -> bool {
        self.waypoint_interop.load(Ordering::SeqCst)
    }

    pub fn set_waypoint_interop(&self, enabled: bool) {
        self.waypoint_interop.store(enabled, Ordering::SeqCst);
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::new(true)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
