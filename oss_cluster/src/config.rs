// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Cluster configuration.
//!
//! The only required piece of configuration is the list of master addresses, read
//! from a YAML file:
//!
//! ```yaml
//! masters:
//!   - http://10.0.0.1:9099
//!   - 10.0.0.2:9099
//! ```
//!
//! A missing or empty file, or an empty `masters` list, makes the process a plain node.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::ConfigErr;

/// Name of the configuration file looked up in the data directory
pub const CLUSTER_CONFIGURATION_NAME: &str = "cluster.yaml";

/// Environment variable overriding the configuration file location
pub const CLUSTER_CONF_ENV: &str = "OSS_CLUSTER_CONF";

/// The cluster configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClusterConfig {
    /// The master addresses, in the order clients try them
    #[serde(default)]
    pub masters: Vec<String>,
}

impl ClusterConfig {
    /// Load the configuration from a YAML file.
    ///
    /// A missing or empty file yields the default (no master) configuration
    pub fn load(path: &Path) -> Result<Self, ConfigErr> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "No cluster configuration at {}. This node is not part of a cluster.",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_yaml(&content)
    }

    /// Parse the configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ConfigErr> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Where to read the configuration from: `explicit` if given, else the path
    /// in [CLUSTER_CONF_ENV] if set, else [CLUSTER_CONFIGURATION_NAME] in `data_dir`
    pub fn resolve_path(data_dir: &Path, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(CLUSTER_CONF_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => data_dir.join(CLUSTER_CONFIGURATION_NAME),
        }
    }
}

/// Timing of the [crate::HealthMonitor]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Period between two sweeps. Also bounds each probe
    pub interval: Duration,
    /// Delay before the first sweep
    pub initial_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(10),
        }
    }
}

impl MonitorConfig {
    /// The timeout applied to every probe
    pub fn probe_timeout(&self) -> Duration {
        self.interval
    }
}
