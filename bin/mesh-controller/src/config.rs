//! Controller configuration from the environment

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const TOPOLOGY_PATH_ENV: &str = "MESH_TOPOLOGY_PATH";
pub const RELOAD_INTERVAL_ENV: &str = "MESH_RELOAD_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "MESH_LOG_FORMAT";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Topology snapshot file, YAML or JSON
    pub topology_path: PathBuf,
    pub reload_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            topology_path: PathBuf::from("topology.yaml"),
            reload_interval: Duration::from_secs(30),
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(TOPOLOGY_PATH_ENV) {
            config.topology_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup(RELOAD_INTERVAL_ENV) {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("{} must be a number of seconds", RELOAD_INTERVAL_ENV))?;
            if secs == 0 {
                bail!("{} must be greater than zero", RELOAD_INTERVAL_ENV);
            }
            config.reload_interval = Duration::from_secs(secs);
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "" => LogFormat::Text,
                other => bail!("unknown {} {:?}, expected text or json", LOG_FORMAT_ENV, other),
            };
        }
        Ok(config)
    }
}
