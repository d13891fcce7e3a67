//! Query Handler
//!
//! Classifies a statement, routes it and executes it on the chosen node.
//! Writes always land on the manager.

use std::sync::Arc;

use crate::api::QueryResponse;
use crate::classify::classify;
use crate::error::Result;
use crate::executor::StatementExecutor;
use crate::lb::{LoadBalancerRouter, Strategy};

/// Query handler that routes statements to backend nodes
pub struct QueryHandler {
    /// Strategy engine
    router: LoadBalancerRouter,
    /// Backend executor
    executor: Arc<dyn StatementExecutor>,
}

impl QueryHandler {
    pub fn new(router: LoadBalancerRouter, executor: Arc<dyn StatementExecutor>) -> Self {
        Self { router, executor }
    }

    pub fn router(&self) -> &LoadBalancerRouter {
        &self.router
    }

    /// Run one statement through classify -> route -> execute
    pub async fn handle_query(&self, statement: &str, strategy: Option<&str>) -> Result<QueryResponse> {
        let query_type = classify(statement);
        let strategy = Strategy::parse(strategy);

        let decision = self.router.route(query_type, strategy).await;
        tracing::info!("{} query routed to {} ({})", query_type, decision.target, decision.strategy);

        let result = self
            .executor
            .execute(&decision.target, statement, query_type)
            .await?;

        Ok(QueryResponse {
            status: "success",
            executed_on: result.executed_on,
            strategy_used: decision.strategy,
            query_type: result.query_type,
            data: result.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::QueryType;
    use crate::error::Error;
    use crate::executor::{ExecutionResult, QueryData};
    use crate::lb::ProbeMode;
    use crate::probe::FixedProbe;
    use crate::topology::NodeRegistry;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every call and answers with canned data
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, String, QueryType)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl StatementExecutor for RecordingExecutor {
        async fn execute(
            &self,
            address: &str,
            statement: &str,
            query_type: QueryType,
        ) -> Result<ExecutionResult> {
            self.calls
                .lock()
                .unwrap()
                .push((address.to_string(), statement.to_string(), query_type));

            if self.fail_on.as_deref() == Some(address) {
                return Err(Error::ConnectionError {
                    address: address.to_string(),
                    reason: "refused".to_string(),
                });
            }

            let data = match query_type {
                QueryType::Read => QueryData::Rows(vec![]),
                QueryType::Write => QueryData::Affected { affected_rows: 1 },
            };
            Ok(ExecutionResult {
                executed_on: address.to_string(),
                query_type,
                data,
            })
        }
    }

    fn handler(executor: Arc<RecordingExecutor>) -> QueryHandler {
        let registry = NodeRegistry::new("10.0.0.1", vec!["10.0.0.2".into(), "10.0.0.3".into()]).unwrap();
        let probe = FixedProbe::new()
            .with("10.0.0.2", Some(Duration::from_millis(9)))
            .with("10.0.0.3", Some(Duration::from_millis(4)));
        let router = LoadBalancerRouter::new(Arc::new(registry), Arc::new(probe), ProbeMode::Sequential);
        QueryHandler::new(router, executor)
    }

    #[tokio::test]
    async fn test_write_overrides_strategy() {
        let executor = Arc::new(RecordingExecutor::default());
        let handler = handler(Arc::clone(&executor));

        let response = handler
            .handle_query("INSERT INTO actor (first_name) VALUES ('x')", Some("customized"))
            .await
            .unwrap();

        assert_eq!(response.executed_on, "10.0.0.1");
        assert_eq!(response.query_type, QueryType::Write);
        assert_eq!(response.strategy_used, Strategy::Customized);
        assert_eq!(response.data, QueryData::Affected { affected_rows: 1 });
    }

    #[tokio::test]
    async fn test_customized_read_goes_to_fastest_worker() {
        let executor = Arc::new(RecordingExecutor::default());
        let handler = handler(Arc::clone(&executor));

        let response = handler
            .handle_query("select * from actor limit 1", Some("customized"))
            .await
            .unwrap();

        assert_eq!(response.executed_on, "10.0.0.3");
        assert_eq!(response.query_type, QueryType::Read);

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "select * from actor limit 1");
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_direct() {
        let executor = Arc::new(RecordingExecutor::default());
        let handler = handler(Arc::clone(&executor));

        let response = handler.handle_query("SELECT 1", Some("round_robin")).await.unwrap();
        assert_eq!(response.executed_on, "10.0.0.1");
        assert_eq!(response.strategy_used, Strategy::Direct);
    }

    #[tokio::test]
    async fn test_execution_failure_is_not_retried() {
        let executor = Arc::new(RecordingExecutor {
            fail_on: Some("10.0.0.1".into()),
            ..Default::default()
        });
        let handler = handler(Arc::clone(&executor));

        let err = handler.handle_query("SELECT 1", None).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionError { .. }));
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
    }

    /// Manager applies writes at once; workers only see them after `replicate`
    #[derive(Default)]
    struct LaggingCluster {
        primary: Mutex<u64>,
        replica: Mutex<u64>,
    }

    impl LaggingCluster {
        fn replicate(&self) {
            *self.replica.lock().unwrap() = *self.primary.lock().unwrap();
        }
    }

    #[async_trait]
    impl StatementExecutor for LaggingCluster {
        async fn execute(
            &self,
            address: &str,
            _statement: &str,
            query_type: QueryType,
        ) -> Result<ExecutionResult> {
            let data = match query_type {
                QueryType::Write => {
                    *self.primary.lock().unwrap() += 1;
                    QueryData::Affected { affected_rows: 1 }
                }
                QueryType::Read => {
                    let count = if address == "10.0.0.1" {
                        *self.primary.lock().unwrap()
                    } else {
                        *self.replica.lock().unwrap()
                    };
                    let mut row = crate::executor::RowMap::new();
                    row.insert("count".into(), serde_json::json!(count));
                    QueryData::Rows(vec![row])
                }
            };
            Ok(ExecutionResult {
                executed_on: address.to_string(),
                query_type,
                data,
            })
        }
    }

    fn count_of(response: &QueryResponse) -> u64 {
        match &response.data {
            QueryData::Rows(rows) => rows[0]["count"].as_u64().unwrap(),
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_worker_reads_are_eventually_consistent() {
        let cluster = Arc::new(LaggingCluster::default());
        let registry = NodeRegistry::new("10.0.0.1", vec!["10.0.0.2".into()]).unwrap();
        let probe = FixedProbe::new().with("10.0.0.2", Some(Duration::from_millis(1)));
        let router = LoadBalancerRouter::new(Arc::new(registry), Arc::new(probe), ProbeMode::Sequential);
        let handler = QueryHandler::new(router, Arc::clone(&cluster) as Arc<dyn StatementExecutor>);

        handler.handle_query("INSERT INTO actor VALUES (1)", Some("random")).await.unwrap();

        // Direct reads see the write immediately
        let direct = handler.handle_query("SELECT COUNT(*) FROM actor", Some("direct")).await.unwrap();
        assert_eq!(direct.executed_on, "10.0.0.1");
        assert_eq!(count_of(&direct), 1);

        // Worker reads may be stale until replication catches up
        for strategy in ["random", "customized"] {
            let stale = handler.handle_query("SELECT COUNT(*) FROM actor", Some(strategy)).await.unwrap();
            assert_eq!(stale.executed_on, "10.0.0.2");
            assert_eq!(count_of(&stale), 0);
        }

        cluster.replicate();
        for strategy in ["random", "customized"] {
            let fresh = handler.handle_query("SELECT COUNT(*) FROM actor", Some(strategy)).await.unwrap();
            assert_eq!(count_of(&fresh), 1);
        }
    }
}
