//! Cluster Topology and Node Registry
//!
//! The topology artifact is produced by the provisioning tooling and read
//! once at startup. The registry built from it is never mutated while
//! serving, so it is shared without locking.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::AddressKind;
use crate::error::{Error, Result};

/// Addresses of one provisioned node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeAddresses {
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
}

impl NodeAddresses {
    /// Pick an address of the requested kind, ignoring blanks
    pub fn address(&self, kind: AddressKind) -> Option<&str> {
        let addr = match kind {
            AddressKind::Private => self.private_ip.as_deref(),
            AddressKind::Public => self.public_ip.as_deref(),
        };
        addr.map(str::trim).filter(|a| !a.is_empty())
    }
}

/// Parsed topology artifact (`cluster_info.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub gatekeeper: NodeAddresses,
    #[serde(default)]
    pub proxy: NodeAddresses,
    #[serde(default)]
    pub manager: NodeAddresses,
    #[serde(default)]
    pub workers: Vec<NodeAddresses>,
}

impl Topology {
    /// Load the topology from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Topology(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse the topology from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build the node registry for the proxy tier
    pub fn registry(&self, kind: AddressKind) -> Result<NodeRegistry> {
        let manager = self
            .manager
            .address(kind)
            .ok_or_else(|| Error::NoAvailableNode("topology has no manager address".into()))?;

        let mut workers = Vec::with_capacity(self.workers.len());
        for (idx, worker) in self.workers.iter().enumerate() {
            match worker.address(kind) {
                Some(addr) => workers.push(addr.to_string()),
                None => tracing::warn!("Skipping worker #{} without a {:?} address", idx, kind),
            }
        }

        NodeRegistry::new(manager, workers)
    }

    /// Address of the proxy tier, used by the gatekeeper
    pub fn proxy_address(&self, kind: AddressKind) -> Result<&str> {
        self.proxy
            .address(kind)
            .ok_or_else(|| Error::Topology("topology has no proxy address".into()))
    }
}

/// Static record of the manager and worker addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRegistry {
    manager: String,
    workers: Vec<String>,
}

impl NodeRegistry {
    /// Create a registry; the manager address must be non-empty
    pub fn new(manager: impl Into<String>, workers: Vec<String>) -> Result<Self> {
        let manager = manager.into();
        if manager.trim().is_empty() {
            return Err(Error::NoAvailableNode("manager address is empty".into()));
        }
        Ok(Self { manager, workers })
    }

    pub fn manager(&self) -> &str {
        &self.manager
    }

    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    /// Total number of nodes including the manager
    pub fn len(&self) -> usize {
        self.workers.len() + 1
    }

    pub fn has_workers(&self) -> bool {
        !self.workers.is_empty()
    }
}

/// Split a node address into `host` and port, using `default_port` when
/// none is given. Accepts `host`, `host:port`, `[v6]:port` and bare IPv6.
pub fn split_host_port(address: &str, default_port: u16) -> (String, u16) {
    if let Ok(addr) = address.parse::<std::net::SocketAddr>() {
        return (addr.ip().to_string(), addr.port());
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), default_port),
        },
        _ => (address.to_string(), default_port),
    }
}
