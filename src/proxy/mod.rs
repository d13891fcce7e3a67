//! Proxy Gateway
//!
//! Internal HTTP tier: classifies statements as reads or writes, picks a
//! backend node with the requested strategy and executes the statement.

mod server;
mod handler;

pub use server::ProxyServer;
pub use handler::QueryHandler;
