//! HTTP API Module
//!
//! Wire types and error mapping shared by both gateway tiers.

mod http;

pub use http::{
    cors_layer, request_id, ErrorResponse, QueryRequest, QueryResponse, API_KEY_HEADER,
    REQUEST_ID_HEADER,
};
