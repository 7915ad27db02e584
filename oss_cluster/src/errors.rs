// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Cluster error types

use std::fmt::Display;

/// Errors raised by the registry side of the cluster (the [crate::ClusterManager]
/// and the [crate::ClusterRegistry] it guards)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterErr {
    /// A registry operation was attempted on a process which is not one of
    /// the configured masters
    NotMaster,
    /// The process has not finished setting up its registry yet
    NotInitialized,
    /// An address or hostname could not be normalized into `scheme://host:port`
    MalformedAddress(String),
    /// No node is registered under the given (normalized) address
    NodeNotFound(String),
}

impl std::error::Error for ClusterErr {}

impl Display for ClusterErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotMaster => write!(f, "This process is not a cluster master"),
            Self::NotInitialized => write!(f, "The cluster registry is not initialized yet"),
            Self::MalformedAddress(address) => {
                write!(f, "Malformed node address '{address}'")
            }
            Self::NodeNotFound(address) => {
                write!(f, "Node '{address}' is not registered")
            }
        }
    }
}

/// Errors talking to a remote master over HTTP
#[derive(Debug)]
pub enum ClientErr {
    /// The request failed at the transport level (connect, timeout, DNS, decode)
    Transport(reqwest::Error),
    /// The master answered with a status code the operation doesn't accept
    UnexpectedStatus(u16),
    /// The master's base url could not be turned into a request url
    InvalidUrl(String),
    /// The operation can't be meaningfully aggregated across masters
    NotImplemented,
    /// A multi-master client was built without any master
    NoMasters,
    /// Every configured master was tried without a success. Wraps the last
    /// error encountered
    AllMastersFailed(Box<ClientErr>),
}

impl std::error::Error for ClientErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(inner) => Some(inner),
            Self::AllMastersFailed(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl Display for ClientErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => {
                if f.alternate() {
                    write!(f, "Cluster transport error '{err:#}'")
                } else {
                    write!(f, "Cluster transport error '{err}'")
                }
            }
            Self::UnexpectedStatus(code) => write!(f, "Unexpected response status {code}"),
            Self::InvalidUrl(url) => write!(f, "Invalid cluster url '{url}'"),
            Self::NotImplemented => write!(f, "Operation not implemented"),
            Self::NoMasters => write!(f, "No cluster master configured"),
            Self::AllMastersFailed(last) => {
                write!(f, "All cluster masters failed, last error: {last}")
            }
        }
    }
}

impl From<reqwest::Error> for ClientErr {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

/// Errors loading the cluster configuration
#[derive(Debug)]
pub enum ConfigErr {
    /// The configuration file exists but couldn't be read
    Io(std::io::Error),
    /// The configuration file isn't valid YAML for a [crate::ClusterConfig]
    Yaml(serde_yaml::Error),
    /// The configuration names a master address which can't be normalized
    Cluster(ClusterErr),
}

impl std::error::Error for ConfigErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(inner) => Some(inner),
            Self::Yaml(inner) => Some(inner),
            Self::Cluster(inner) => Some(inner),
        }
    }
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Failed to read cluster configuration '{err}'"),
            Self::Yaml(err) => write!(f, "Invalid cluster configuration '{err}'"),
            Self::Cluster(err) => write!(f, "{err}"),
        }
    }
}

impl From<std::io::Error> for ConfigErr {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigErr {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

impl From<ClusterErr> for ConfigErr {
    fn from(value: ClusterErr) -> Self {
        Self::Cluster(value)
    }
}
