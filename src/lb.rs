//! Load Balancer Routing Module
//!
//! Routes writes to the manager and distributes reads across workers
//! according to the requested strategy. Every strategy has a fallback to
//! the manager, so routing never fails.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::classify::QueryType;
use crate::probe::LatencyProbe;
use crate::topology::NodeRegistry;

/// Read routing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Every request goes to the manager
    #[default]
    Direct,
    /// Uniformly random worker
    Random,
    /// Worker with the lowest probed latency
    Customized,
}

impl Strategy {
    /// Parse a strategy name; absent or unknown names mean `Direct`
    pub fn parse(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Strategy::Direct;
        };

        match name.trim().to_ascii_lowercase().as_str() {
            "direct" | "direct_hit" => Strategy::Direct,
            "random" => Strategy::Random,
            "customized" => Strategy::Customized,
            other => {
                tracing::debug!("Unknown strategy '{}', using direct", other);
                Strategy::Direct
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Random => "random",
            Strategy::Customized => "customized",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a statement will run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Address of the chosen node
    pub target: String,
    /// Strategy that was requested for this statement
    pub strategy: Strategy,
}

/// How the customized strategy probes its candidates
#[derive(Debug, Clone, Copy)]
pub enum ProbeMode {
    /// One worker after another
    Sequential,
    /// All workers at once, capped by a deadline for the whole round
    Parallel { deadline: Duration },
}

/// Load balancer router for distributing statements across cluster nodes
pub struct LoadBalancerRouter {
    /// Static node registry
    registry: Arc<NodeRegistry>,
    /// Latency probe for the customized strategy
    probe: Arc<dyn LatencyProbe>,
    /// Probe scheduling
    probe_mode: ProbeMode,
    /// Reads routed to a worker
    reads_to_workers: AtomicUsize,
    /// Reads that ended up on the manager
    reads_to_manager: AtomicUsize,
    /// Writes routed (always to the manager)
    writes: AtomicUsize,
}

impl LoadBalancerRouter {
    /// Create a new load balancer router
    pub fn new(
        registry: Arc<NodeRegistry>,
        probe: Arc<dyn LatencyProbe>,
        probe_mode: ProbeMode,
    ) -> Self {
        Self {
            registry,
            probe,
            probe_mode,
            reads_to_workers: AtomicUsize::new(0),
            reads_to_manager: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Pick the node a statement runs on
    pub async fn route(&self, query_type: QueryType, strategy: Strategy) -> RoutingDecision {
        let target = match query_type {
            QueryType::Write => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                self.registry.manager().to_string()
            }
            QueryType::Read => {
                let target = match strategy {
                    Strategy::Direct => self.registry.manager().to_string(),
                    Strategy::Random => self.pick_random(),
                    Strategy::Customized => self.pick_fastest().await,
                };

                if target == self.registry.manager() {
                    self.reads_to_manager.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.reads_to_workers.fetch_add(1, Ordering::Relaxed);
                }
                target
            }
        };

        tracing::debug!("Routed {} ({}) to {}", query_type, strategy, target);

        RoutingDecision { target, strategy }
    }

    /// Random worker, or the manager when there are none
    fn pick_random(&self) -> String {
        self.registry
            .workers()
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| self.registry.manager().to_string())
    }

    /// Lowest-latency worker, or the manager when none answers
    async fn pick_fastest(&self) -> String {
        let workers = self.registry.workers();
        if workers.is_empty() {
            return self.registry.manager().to_string();
        }

        let latencies = match self.probe_mode {
            ProbeMode::Sequential => self.probe_sequential(workers).await,
            ProbeMode::Parallel { deadline } => self.probe_parallel(workers, deadline).await,
        };

        match select_fastest(workers, &latencies) {
            Some(worker) => worker.to_string(),
            None => {
                tracing::warn!("No worker answered the latency probe, falling back to manager");
                self.registry.manager().to_string()
            }
        }
    }

    async fn probe_sequential(&self, workers: &[String]) -> Vec<Option<Duration>> {
        let mut latencies = Vec::with_capacity(workers.len());
        for worker in workers {
            latencies.push(self.probe.probe(worker).await);
        }
        latencies
    }

    async fn probe_parallel(&self, workers: &[String], deadline: Duration) -> Vec<Option<Duration>> {
        let mut latencies = vec![None; workers.len()];
        let mut pending: FuturesUnordered<_> = workers
            .iter()
            .enumerate()
            .map(|(idx, worker)| async move { (idx, self.probe.probe(worker).await) })
            .collect();

        let deadline = tokio::time::Instant::now() + deadline;
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((idx, latency))) => latencies[idx] = latency,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Probe deadline hit with {} workers unanswered", pending.len());
                    break;
                }
            }
        }
        latencies
    }

    /// Get stats about the load balancer state
    pub fn stats(&self) -> LoadBalancerStats {
        LoadBalancerStats {
            manager_address: self.registry.manager().to_string(),
            worker_addresses: self.registry.workers().to_vec(),
            reads_to_workers: self.reads_to_workers.load(Ordering::Relaxed),
            reads_to_manager: self.reads_to_manager.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

/// First worker with the strictly lowest latency; unreachable never wins
fn select_fastest<'a>(workers: &'a [String], latencies: &[Option<Duration>]) -> Option<&'a str> {
    let mut best: Option<(&str, Duration)> = None;

    for (worker, latency) in workers.iter().zip(latencies) {
        let Some(latency) = latency else { continue };
        match best {
            Some((_, current)) if *latency >= current => {}
            _ => best = Some((worker.as_str(), *latency)),
        }
    }

    best.map(|(worker, _)| worker)
}

/// Statistics about load balancer state
#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerStats {
    /// Manager address (all writes)
    pub manager_address: String,
    /// Worker addresses
    pub worker_addresses: Vec<String>,
    /// Reads served by a worker
    pub reads_to_workers: usize,
    /// Reads served by the manager
    pub reads_to_manager: usize,
    /// Writes routed
    pub writes: usize,
}
