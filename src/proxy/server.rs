//! Proxy HTTP Server
//!
//! Internal tier. Trusts its caller (the gatekeeper), so it does not
//! authenticate; it classifies, routes and executes each statement.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::handler::QueryHandler;
use crate::api::{cors_layer, request_id, QueryRequest};
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::lb::LoadBalancerStats;

/// Proxy HTTP server
pub struct ProxyServer {
    config: ProxyConfig,
    handler: Arc<QueryHandler>,
}

/// Liveness response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    manager: String,
    workers: Vec<String>,
    stats: LoadBalancerStats,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig, handler: QueryHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/", get(handle_health))
            .route("/query", post(handle_query))
            .with_state(Arc::clone(&self.handler))
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router.layer(cors_layer())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("Proxy listening on {}", self.config.bind_address);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

async fn handle_query(
    State(handler): State<Arc<QueryHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);

    let request = match QueryRequest::parse(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("[{}] Rejected malformed request: {}", request_id, e);
            return e.into_response();
        }
    };

    match handler
        .handle_query(&request.query, request.strategy.as_deref())
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            tracing::warn!("[{}] Query failed: {}", request_id, e);
            e.into_response()
        }
    }
}

async fn handle_health(State(handler): State<Arc<QueryHandler>>) -> impl IntoResponse {
    let router = handler.router();
    Json(HealthResponse {
        status: "Proxy is running",
        manager: router.registry().manager().to_string(),
        workers: router.registry().workers().to_vec(),
        stats: router.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::QueryType;
    use crate::executor::{ExecutionResult, QueryData, StatementExecutor};
    use crate::lb::{LoadBalancerRouter, ProbeMode};
    use crate::probe::FixedProbe;
    use crate::topology::NodeRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct EchoExecutor;

    #[async_trait]
    impl StatementExecutor for EchoExecutor {
        async fn execute(
            &self,
            address: &str,
            statement: &str,
            query_type: QueryType,
        ) -> Result<ExecutionResult> {
            if statement.contains("syntax error") {
                return Err(Error::QueryError {
                    address: address.to_string(),
                    reason: "You have an error in your SQL syntax".to_string(),
                });
            }
            let mut row = crate::executor::RowMap::new();
            row.insert("statement".into(), json!(statement));
            Ok(ExecutionResult {
                executed_on: address.to_string(),
                query_type,
                data: match query_type {
                    QueryType::Read => QueryData::Rows(vec![row]),
                    QueryType::Write => QueryData::Affected { affected_rows: 2 },
                },
            })
        }
    }

    fn server(workers: Vec<String>) -> ProxyServer {
        let registry = Arc::new(NodeRegistry::new("10.0.0.1", workers).unwrap());
        let router = LoadBalancerRouter::new(registry, Arc::new(FixedProbe::new()), ProbeMode::Sequential);
        ProxyServer::new(ProxyConfig::default(), QueryHandler::new(router, Arc::new(EchoExecutor)))
    }

    async fn post_query(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_read_response_shape() {
        let app = server(vec!["10.0.0.2".into()]).router();
        let (status, body) =
            post_query(app, r#"{"query": "SELECT * FROM actor LIMIT 1;", "strategy": "random"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["executed_on"], "10.0.0.2");
        assert_eq!(body["strategy_used"], "random");
        assert_eq!(body["query_type"], "READ");
        assert_eq!(body["data"][0]["statement"], "SELECT * FROM actor LIMIT 1;");
    }

    #[tokio::test]
    async fn test_non_string_strategy_routes_direct() {
        let app = server(vec!["10.0.0.2".into()]).router();
        let (status, body) = post_query(app, r#"{"query": "SELECT 1", "strategy": 7}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["executed_on"], "10.0.0.1");
        assert_eq!(body["strategy_used"], "direct");
        assert_eq!(body["query_type"], "READ");
    }

    #[tokio::test]
    async fn test_write_response_shape() {
        let app = server(vec!["10.0.0.2".into()]).router();
        let (status, body) = post_query(
            app,
            r#"{"query": "INSERT INTO actor (first_name) VALUES ('x');", "strategy": "random"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["executed_on"], "10.0.0.1");
        assert_eq!(body["query_type"], "WRITE");
        assert_eq!(body["data"], json!({"affected_rows": 2}));
    }

    #[tokio::test]
    async fn test_missing_query_is_400() {
        let app = server(vec![]).router();
        let (status, body) = post_query(app, r#"{"strategy": "random"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_query_error_is_surfaced() {
        let app = server(vec![]).router();
        let (status, body) = post_query(app, r#"{"query": "SELEC syntax error"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "QUERY_ERROR");
        assert!(body["error"].as_str().unwrap().contains("SQL syntax"));
    }

    #[tokio::test]
    async fn test_health_reports_nodes() {
        let app = server(vec!["10.0.0.2".into(), "10.0.0.3".into()]).router();
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "Proxy is running");
        assert_eq!(body["manager"], "10.0.0.1");
        assert_eq!(body["workers"], json!(["10.0.0.2", "10.0.0.3"]));
    }
}
