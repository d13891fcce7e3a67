//! HTTP Wire Types
//!
//! Request/response bodies shared by the gatekeeper and the proxy, and the
//! mapping from `Error` to a JSON error response.

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::cors::CorsLayer;

use crate::classify::QueryType;
use crate::error::Error;
use crate::executor::QueryData;
use crate::lb::Strategy;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the request id from the gatekeeper to the proxy
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of `POST /query`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, deserialize_with = "lenient_strategy", skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

/// Non-string strategy values are treated as absent so routing falls back to `direct`
fn lenient_strategy<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

impl QueryRequest {
    /// Parse a request body, rejecting anything without a usable `query`
    pub fn parse(body: &[u8]) -> crate::Result<Self> {
        if body.is_empty() {
            return Err(Error::MalformedRequest("No query provided".into()));
        }

        let request: QueryRequest = serde_json::from_slice(body)
            .map_err(|e| Error::MalformedRequest(format!("Invalid request body: {}", e)))?;

        if request.query.trim().is_empty() {
            return Err(Error::MalformedRequest("No query provided".into()));
        }

        Ok(request)
    }
}

/// Successful `POST /query` response
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub status: &'static str,
    pub executed_on: String,
    pub strategy_used: Strategy,
    pub query_type: QueryType,
    pub data: QueryData,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        let (error, details) = match err {
            Error::Blocked { .. } => ("Request Blocked by Gatekeeper".to_string(), Some(err.to_string())),
            Error::UpstreamUnavailable(reason) => {
                ("Failed to reach Trusted Host".to_string(), Some(reason.clone()))
            }
            _ => (err.to_string(), None),
        };

        ErrorResponse {
            error,
            code: err.code().to_string(),
            details,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Request id forwarded by the gatekeeper, if any
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// Permissive CORS layer used when `cors_enabled` is set
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}
