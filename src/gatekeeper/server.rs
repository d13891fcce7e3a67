//! Gatekeeper HTTP Server
//!
//! Public tier. Every `POST /query` goes through
//! authenticate -> safety check -> forward, and the proxy's answer is
//! relayed to the caller unchanged.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::auth::check_auth;
use crate::api::{cors_layer, QueryRequest, REQUEST_ID_HEADER};
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::safety::SafetyFilter;

/// Shared gatekeeper state
struct GatekeeperState {
    /// Expected `x-api-key` value
    api_token: String,
    /// Statement denylist
    filter: SafetyFilter,
    /// Proxy `/query` endpoint
    proxy_url: String,
    /// Client for forwarding to the proxy
    client: reqwest::Client,
}

/// Gatekeeper HTTP server
pub struct GatekeeperServer {
    bind_address: String,
    cors_enabled: bool,
    state: Arc<GatekeeperState>,
}

/// Liveness response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    trusted_host: String,
}

impl GatekeeperServer {
    /// Create a gatekeeper forwarding to `proxy_url`
    pub fn new(config: &GatewayConfig, proxy_url: String) -> Result<Self> {
        config.validate_gatekeeper()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            bind_address: config.gatekeeper.bind_address.clone(),
            cors_enabled: config.gatekeeper.cors_enabled,
            state: Arc::new(GatekeeperState {
                api_token: config.gatekeeper.api_token.clone(),
                filter: SafetyFilter::default(),
                proxy_url,
                client,
            }),
        })
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/", get(handle_health))
            .route("/query", post(handle_query))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.cors_enabled {
            router.layer(cors_layer())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!(
            "Gatekeeper listening on {}, forwarding to {}",
            self.bind_address,
            self.state.proxy_url
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

async fn handle_query(
    State(state): State<Arc<GatekeeperState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    if !check_auth(&headers, &state.api_token) {
        tracing::warn!("[{}] Rejected unauthenticated request", request_id);
        return Error::Unauthorized.into_response();
    }

    let request = match QueryRequest::parse(&body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    if let Err(e) = state.filter.check(&request.query).into_result() {
        tracing::warn!("[{}] {}", request_id, e);
        return e.into_response();
    }

    match forward(&state, &request_id, &request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("[{}] Failed to forward to proxy: {}", request_id, e);
            e.into_response()
        }
    }
}

/// Relay a request to the proxy and return its status, content type and body
async fn forward(state: &GatekeeperState, request_id: &str, request: &QueryRequest) -> Result<Response> {
    tracing::debug!("[{}] Forwarding to {}", request_id, state.proxy_url);

    let upstream = state
        .client
        .post(&state.proxy_url)
        .header(REQUEST_ID_HEADER, request_id)
        .json(request)
        .send()
        .await
        .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());

    let body = upstream
        .bytes()
        .await
        .map_err(|e| Error::UpstreamUnavailable(format!("failed to read proxy response: {}", e)))?;

    let mut response = (status, body).into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}

async fn handle_health(State(state): State<Arc<GatekeeperState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "Gatekeeper Operational",
        trusted_host: state.proxy_url.clone(),
    })
}
