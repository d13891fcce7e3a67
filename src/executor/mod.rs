//! Backend Executor Module
//!
//! Runs one statement on one backend node and maps the outcome into a
//! uniform result shape.

mod mysql;

pub use mysql::MySqlExecutor;

use async_trait::async_trait;
use serde::Serialize;

use crate::classify::QueryType;
use crate::error::Result;

/// One result row, column name to value
pub type RowMap = serde_json::Map<String, serde_json::Value>;

/// Payload of a successful statement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryData {
    /// Full result set of a read
    Rows(Vec<RowMap>),
    /// Outcome of a committed write
    Affected { affected_rows: u64 },
}

/// Outcome of executing a statement on a node
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Node that ran the statement
    pub executed_on: String,
    /// Classification the statement was executed under
    pub query_type: QueryType,
    /// Rows or affected-row count
    pub data: QueryData,
}

/// Executes statements against backend nodes
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Run `statement` on the node at `address`.
    ///
    /// Fails with `ConnectionError` when the node cannot be reached and
    /// `QueryError` when the backend rejects the statement.
    async fn execute(
        &self,
        address: &str,
        statement: &str,
        query_type: QueryType,
    ) -> Result<ExecutionResult>;
}
