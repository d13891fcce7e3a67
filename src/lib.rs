//! sqlgate - Two-Tier SQL Request Gateway
//!
//! Sits in front of a replicated MySQL deployment made of one writable
//! manager and several read-only workers.
//!
//! # Architecture
//!
//! The gatekeeper is the public tier: it checks the shared-secret
//! credential and rejects destructive statements before forwarding the
//! request to the proxy. The proxy is the internal tier: it classifies the
//! statement as a read or a write, picks a backend node and executes the
//! statement there.
//!
//! # Routing
//!
//! - Writes always go to the manager
//! - `direct` reads go to the manager
//! - `random` reads go to a uniformly chosen worker
//! - `customized` reads go to the worker with the lowest probed latency

pub mod config;
pub mod error;
pub mod classify;
pub mod safety;
pub mod topology;
pub mod probe;
pub mod lb;
pub mod executor;
pub mod api;
pub mod gatekeeper;
pub mod proxy;

pub use config::GatewayConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::error::{Error, Result};
    pub use crate::classify::{classify, QueryType};
    pub use crate::safety::{SafetyFilter, Verdict};
    pub use crate::topology::{NodeRegistry, Topology};
    pub use crate::lb::{LoadBalancerRouter, RoutingDecision, Strategy};
    pub use crate::probe::LatencyProbe;
    pub use crate::executor::{ExecutionResult, QueryData, StatementExecutor};
}
