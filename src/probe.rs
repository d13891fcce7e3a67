//! Latency Probes
//!
//! Reachability probes used by the customized routing strategy. A probe
//! returns the measured round-trip time, or `None` when the node did not
//! answer within its timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::{GatewayConfig, ProbeMethod};
use crate::topology::split_host_port;

/// Measures network round-trip time to a node
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Probe one address; `None` means unreachable
    async fn probe(&self, address: &str) -> Option<Duration>;
}

/// ICMP echo through the system `ping` binary
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LatencyProbe for PingProbe {
    async fn probe(&self, address: &str) -> Option<Duration> {
        // ping -W only takes whole seconds
        let wait_secs = self.timeout.as_secs_f64().ceil().max(1.0) as u64;
        let (host, _) = split_host_port(address, 0);

        let output = Command::new("ping")
            .args(["-c", "1", "-W", &wait_secs.to_string(), &host])
            .kill_on_drop(true)
            .output();

        // Cap the child process too in case ping ignores -W
        let output = match timeout(self.timeout + Duration::from_millis(500), output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Ping error for {}: {}", address, e);
                return None;
            }
            Err(_) => {
                tracing::debug!("Ping to {} timed out", address);
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!("Ping to {} failed with {}", address, output.status);
            return None;
        }

        parse_ping_time(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract `time=X.Y ms` from ping output
pub fn parse_ping_time(output: &str) -> Option<Duration> {
    let after = output.split("time=").nth(1)?;
    let value = after.split_whitespace().next()?;
    let ms: f64 = value.trim_end_matches("ms").parse().ok()?;
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    Some(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
}

/// Times a TCP connect to the node's service port
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    fn target(&self, address: &str) -> (String, u16) {
        split_host_port(address, self.port)
    }
}

#[async_trait]
impl LatencyProbe for TcpProbe {
    async fn probe(&self, address: &str) -> Option<Duration> {
        let (host, port) = self.target(address);
        let start = Instant::now();

        match timeout(self.timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => Some(start.elapsed()),
            Ok(Err(e)) => {
                tracing::debug!("TCP probe to {} port {} failed: {}", host, port, e);
                None
            }
            Err(_) => {
                tracing::debug!("TCP probe to {} port {} timed out", host, port);
                None
            }
        }
    }
}

/// Deterministic probe answering from a fixed table
#[derive(Debug, Clone, Default)]
pub struct FixedProbe {
    latencies: HashMap<String, Option<Duration>>,
}

impl FixedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a latency for an address (`None` = unreachable)
    pub fn with(mut self, address: &str, latency: Option<Duration>) -> Self {
        self.latencies.insert(address.to_string(), latency);
        self
    }
}

#[async_trait]
impl LatencyProbe for FixedProbe {
    async fn probe(&self, address: &str) -> Option<Duration> {
        self.latencies.get(address).copied().flatten()
    }
}

/// Build the probe selected in configuration
pub fn build_probe(config: &GatewayConfig) -> Arc<dyn LatencyProbe> {
    match config.probe.method {
        ProbeMethod::Ping => Arc::new(PingProbe::new(config.probe_timeout())),
        ProbeMethod::Tcp => Arc::new(TcpProbe::new(config.probe.port, config.probe_timeout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping_time() {
        let output = "PING 10.0.0.5 (10.0.0.5) 56(84) bytes of data.\n\
                      64 bytes from 10.0.0.5: icmp_seq=1 ttl=64 time=0.532 ms\n";
        assert_eq!(parse_ping_time(output), Some(Duration::from_micros(532)));

        let bsd = "64 bytes from 10.0.0.5: icmp_seq=0 ttl=64 time=12ms";
        assert_eq!(parse_ping_time(bsd), Some(Duration::from_millis(12)));

        assert_eq!(parse_ping_time("1 packets transmitted, 0 received"), None);
        assert_eq!(parse_ping_time("time=abc ms"), None);
    }

    #[tokio::test]
    async fn test_tcp_probe_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = TcpProbe::new(addr.port(), Duration::from_secs(1));
        assert!(probe.probe("127.0.0.1").await.is_some());
        assert!(probe.probe(&addr.to_string()).await.is_some());
    }

    #[test]
    fn test_tcp_probe_target() {
        let probe = TcpProbe::new(3306, Duration::from_secs(1));
        assert_eq!(probe.target("10.0.0.5"), ("10.0.0.5".to_string(), 3306));
        assert_eq!(probe.target("db-1:3307"), ("db-1".to_string(), 3307));
        assert_eq!(probe.target("fe80::1"), ("fe80::1".to_string(), 3306));
        assert_eq!(probe.target("[::1]:3310"), ("::1".to_string(), 3310));
    }

    #[tokio::test]
    async fn test_tcp_probe_explicit_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Explicit port wins over the configured one
        let probe = TcpProbe::new(1, Duration::from_secs(1));
        assert!(probe.probe(&addr.to_string()).await.is_some());
    }

    #[tokio::test]
    async fn test_tcp_probe_unreachable() {
        // Grab a free port and release it so nothing is listening
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpProbe::new(port, Duration::from_millis(200));
        assert!(probe.probe("127.0.0.1").await.is_none());
    }

    #[tokio::test]
    async fn test_fixed_probe() {
        let probe = FixedProbe::new()
            .with("a", Some(Duration::from_millis(5)))
            .with("c", None);

        assert_eq!(probe.probe("a").await, Some(Duration::from_millis(5)));
        assert_eq!(probe.probe("c").await, None);
        assert_eq!(probe.probe("unknown").await, None);
    }
}
