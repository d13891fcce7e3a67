//! Gatekeeper Gateway
//!
//! Public HTTP tier: authenticates callers, filters unsafe statements and
//! forwards the rest to the proxy.

mod auth;
mod server;

pub use auth::{check_auth, constant_time_eq};
pub use server::GatekeeperServer;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::topology::Topology;

/// Resolve the proxy `/query` URL: explicit configuration wins, otherwise
/// it is derived from the proxy address in the topology.
pub fn resolve_proxy_url(config: &GatewayConfig, topology: Option<&Topology>) -> Result<String> {
    if let Some(url) = &config.gatekeeper.proxy_url {
        return Ok(url.clone());
    }

    let topology = topology.ok_or_else(|| {
        crate::Error::Config("gatekeeper.proxy_url is not set and no topology is available".into())
    })?;
    let host = topology.proxy_address(config.topology.address)?;

    Ok(format!("http://{}:{}/query", host, config.gatekeeper.proxy_port))
}
