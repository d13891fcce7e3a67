//! sqlgate Configuration
//!
//! This module provides configuration structures for both gateway tiers.
//! A single file configures either tier; each tier reads the sections it
//! needs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main sqlgate configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Outer tier configuration
    #[serde(default)]
    pub gatekeeper: GatekeeperConfig,

    /// Inner tier configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Topology artifact location
    #[serde(default)]
    pub topology: TopologyConfig,

    /// Backend database credentials
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Latency probe configuration (customized strategy)
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gatekeeper (public tier) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Shared secret expected in the `x-api-key` header
    #[serde(default)]
    pub api_token: String,

    /// Explicit proxy `/query` URL (derived from topology when unset)
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Proxy HTTP port used when deriving the URL from topology
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,

    /// Timeout for forwarded requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Proxy (internal tier) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Which address of each node to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    #[default]
    Private,
    Public,
}

/// Topology artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Path to the topology JSON file
    #[serde(default = "default_topology_file")]
    pub file: PathBuf,

    /// Address kind used for routing
    #[serde(default)]
    pub address: AddressKind,
}

/// Backend database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// MySQL port on every node
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database user
    #[serde(default = "default_db_user")]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Default schema
    #[serde(default)]
    pub database: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Probe method for the customized strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// ICMP echo through the system `ping` binary
    #[default]
    Ping,
    /// Timed TCP connect
    Tcp,
}

/// Latency probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub method: ProbeMethod,

    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    /// Port for TCP probes
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Probe workers concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Deadline for a whole round of concurrent probes in milliseconds
    #[serde(default = "default_probe_deadline_ms")]
    pub deadline_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    10
}

fn default_topology_file() -> PathBuf {
    PathBuf::from("cluster_info.json")
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_user() -> String {
    "root".to_string()
}

fn default_connect_timeout() -> u64 {
    2
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_probe_deadline_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_token: String::new(),
            proxy_url: None,
            proxy_port: default_proxy_port(),
            request_timeout_secs: default_request_timeout(),
            cors_enabled: false,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            file: default_topology_file(),
            address: AddressKind::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            database: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Backend connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            method: ProbeMethod::default(),
            timeout_ms: default_probe_timeout_ms(),
            port: default_db_port(),
            parallel: false,
            deadline_ms: default_probe_deadline_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.gatekeeper.bind_address.is_empty() {
            return Err(crate::Error::Config("gatekeeper.bind_address cannot be empty".into()));
        }

        if self.proxy.bind_address.is_empty() {
            return Err(crate::Error::Config("proxy.bind_address cannot be empty".into()));
        }

        if self.gatekeeper.request_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "gatekeeper.request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.database.connect_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "database.connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.probe.timeout_ms == 0 {
            return Err(crate::Error::Config("probe.timeout_ms must be greater than 0".into()));
        }

        if self.probe.parallel && self.probe.deadline_ms < self.probe.timeout_ms {
            return Err(crate::Error::Config(
                "probe.deadline_ms must not be shorter than probe.timeout_ms".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::Error::Config(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Additional checks required before the gatekeeper can serve
    pub fn validate_gatekeeper(&self) -> crate::Result<()> {
        if self.gatekeeper.api_token.is_empty() {
            return Err(crate::Error::Config("gatekeeper.api_token cannot be empty".into()));
        }
        Ok(())
    }

    /// Gatekeeper -> proxy request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gatekeeper.request_timeout_secs)
    }

    /// Per-probe timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }

    /// Deadline for a round of concurrent probes
    pub fn probe_deadline(&self) -> Duration {
        Duration::from_millis(self.probe.deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[gatekeeper]
bind_address = "0.0.0.0:80"
api_token = "secure-token-123"
request_timeout_secs = 5

[topology]
file = "/etc/sqlgate/cluster_info.json"
address = "public"

[database]
user = "root"
password = "root"
database = "sakila"

[probe]
method = "tcp"
parallel = true
"#;

        let config = GatewayConfig::from_str(toml).unwrap();
        assert_eq!(config.gatekeeper.bind_address, "0.0.0.0:80");
        assert_eq!(config.gatekeeper.proxy_port, 8080);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.topology.address, AddressKind::Public);
        assert_eq!(config.database.database.as_deref(), Some("sakila"));
        assert_eq!(config.probe.method, ProbeMethod::Tcp);
        assert_eq!(config.probe_timeout(), Duration::from_millis(1000));
        assert!(config.validate_gatekeeper().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GatewayConfig::from_str("").unwrap();
        assert_eq!(config.proxy.bind_address, "0.0.0.0:8080");
        assert_eq!(config.database.port, 3306);
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.probe.method, ProbeMethod::Ping);
        assert_eq!(config.topology.address, AddressKind::Private);
        // No token configured: the gatekeeper must refuse to start
        assert!(config.validate_gatekeeper().is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(GatewayConfig::from_str("[probe]\ntimeout_ms = 0").is_err());
        assert!(GatewayConfig::from_str("[gatekeeper]\nrequest_timeout_secs = 0").is_err());
        assert!(GatewayConfig::from_str("[database]\nconnect_timeout_secs = 0").is_err());
        assert!(GatewayConfig::from_str("[logging]\nformat = \"xml\"").is_err());
        assert!(GatewayConfig::from_str(
            "[probe]\nparallel = true\ntimeout_ms = 2000\ndeadline_ms = 500"
        )
        .is_err());
        assert!(matches!(
            GatewayConfig::from_str("[gatekeeper]\nproxy_port = \"x\""),
            Err(crate::Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlgate.toml");
        std::fs::write(&path, "[gatekeeper]\napi_token = \"abc\"\n").unwrap();

        let config = GatewayConfig::from_file(&path).unwrap();
        assert_eq!(config.gatekeeper.api_token, "abc");

        assert!(matches!(
            GatewayConfig::from_file(&dir.path().join("missing.toml")),
            Err(crate::Error::Io(_))
        ));
    }
}
