//! sqlgate Error Types

use thiserror::Error;

/// Result type alias for sqlgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// sqlgate error types
#[derive(Error, Debug)]
pub enum Error {
    // Admission errors
    #[error("Unauthorized. Invalid or missing 'x-api-key'.")]
    Unauthorized,

    #[error("Security Alert: Query contains forbidden command '{pattern}'")]
    Blocked { pattern: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    // Backend errors
    #[error("Failed to connect to node {address}: {reason}")]
    ConnectionError { address: String, reason: String },

    #[error("Query failed on node {address}: {reason}")]
    QueryError { address: String, reason: String },

    #[error("Failed to reach Trusted Host: {0}")]
    UpstreamUnavailable(String),

    #[error("No available node found: {0}")]
    NoAvailableNode(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Invalid topology file: {0}")]
    TopologyParse(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),
}

impl Error {
    /// HTTP status code this error is surfaced with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized => 401,
            Error::Blocked { .. } => 403,
            Error::MalformedRequest(_) => 400,
            Error::ConnectionError { .. } => 502,
            Error::UpstreamUnavailable(_) => 502,
            Error::NoAvailableNode(_) => 503,
            Error::QueryError { .. } => 500,
            _ => 500,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Blocked { .. } => "BLOCKED",
            Error::MalformedRequest(_) => "MALFORMED_REQUEST",
            Error::ConnectionError { .. } => "CONNECTION_ERROR",
            Error::QueryError { .. } => "QUERY_ERROR",
            Error::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Error::NoAvailableNode(_) => "NO_AVAILABLE_NODE",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            Error::Topology(_) | Error::TopologyParse(_) => "TOPOLOGY_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Network(_) => "NETWORK_ERROR",
        }
    }

    /// Check if this error was caused by the caller rather than the cluster
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
