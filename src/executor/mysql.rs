//! MySQL Executor
//!
//! Opens a dedicated connection per statement. Connections are never
//! pooled: each one is closed before `execute` returns, on success and on
//! failure alike.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tokio::time::timeout;

use super::{ExecutionResult, QueryData, RowMap, StatementExecutor};
use crate::classify::QueryType;
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::topology::split_host_port;

/// Executor talking to MySQL nodes
pub struct MySqlExecutor {
    /// Credentials shared by every node
    config: DatabaseConfig,
    /// Bound on connection establishment
    connect_timeout: Duration,
}

impl MySqlExecutor {
    /// Create a new executor
    pub fn new(config: DatabaseConfig) -> Self {
        let connect_timeout = config.connect_timeout();
        Self { config, connect_timeout }
    }

    fn connect_options(&self, address: &str) -> MySqlConnectOptions {
        let (host, port) = split_host_port(address, self.config.port);

        let options = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&self.config.user)
            .password(&self.config.password);

        match &self.config.database {
            Some(db) => options.database(db),
            None => options,
        }
    }

    /// Connect to a node within the configured timeout
    async fn connect(&self, address: &str) -> Result<MySqlConnection> {
        let options = self.connect_options(address);

        match timeout(self.connect_timeout, MySqlConnection::connect_with(&options)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                tracing::warn!("Error connecting to {}: {}", address, e);
                Err(Error::ConnectionError {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!("Connection to {} timed out", address);
                Err(Error::ConnectionError {
                    address: address.to_string(),
                    reason: format!("timed out after {:?}", self.connect_timeout),
                })
            }
        }
    }

    async fn fetch_rows(conn: &mut MySqlConnection, statement: &str) -> sqlx::Result<QueryData> {
        let rows = sqlx::query(statement).fetch_all(&mut *conn).await?;
        Ok(QueryData::Rows(rows.iter().map(row_to_map).collect()))
    }

    async fn execute_write(conn: &mut MySqlConnection, statement: &str) -> sqlx::Result<QueryData> {
        let mut tx = conn.begin().await?;
        let result = sqlx::query(statement).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(QueryData::Affected {
            affected_rows: result.rows_affected(),
        })
    }
}

#[async_trait]
impl StatementExecutor for MySqlExecutor {
    async fn execute(
        &self,
        address: &str,
        statement: &str,
        query_type: QueryType,
    ) -> Result<ExecutionResult> {
        let mut conn = self.connect(address).await?;

        tracing::debug!("Executing on {}: {}", address, &statement[..floor_char_boundary(statement, 100)]);

        let outcome = match query_type {
            QueryType::Read => Self::fetch_rows(&mut conn, statement).await,
            QueryType::Write => Self::execute_write(&mut conn, statement).await,
        };

        if let Err(e) = conn.close().await {
            tracing::debug!("Error closing connection to {}: {}", address, e);
        }

        let data = outcome.map_err(|e| Error::QueryError {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        Ok(ExecutionResult {
            executed_on: address.to_string(),
            query_type,
            data,
        })
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn row_to_map(row: &MySqlRow) -> RowMap {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), column_value(row, col.ordinal())))
        .collect()
}

/// Convert one column into JSON
fn column_value(row: &MySqlRow, idx: usize) -> Value {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    if type_name == "YEAR" {
        if let Ok(v) = row.try_get_unchecked::<u16, _>(idx) {
            return Value::from(v);
        }
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return serde_json::Number::from_f64(v as f64).map(Value::Number).unwrap_or(Value::Null);
    }
    // TIME is a signed interval up to 838 hours, beyond what NaiveTime holds
    if type_name == "TIME" {
        if let Ok(bytes) = row.try_get_unchecked::<Vec<u8>, _>(idx) {
            if let Some(v) = format_time_interval(&bytes) {
                return Value::String(v);
            }
        }
    }
    if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
        return Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
        return Value::String(v.to_string());
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::String(v);
    }
    // DECIMAL, ENUM and SET arrive as text
    if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
        return Value::String(v);
    }
    match row.try_get_unchecked::<Vec<u8>, _>(idx) {
        Ok(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::debug!("Cannot decode column {} of type {}: {}", idx, type_name, e);
            Value::Null
        }
    }
}

/// Format a TIME column as `[-]HH:MM:SS[.ffffff]`.
///
/// Binary rows carry a length byte followed by sign, days, hours, minutes,
/// seconds and optional microseconds. Text rows are already formatted.
fn format_time_interval(bytes: &[u8]) -> Option<String> {
    let Some((&len, body)) = bytes.split_first() else {
        return Some("00:00:00".to_string());
    };

    if usize::from(len) != body.len() || !matches!(len, 0 | 8 | 12) {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }
    if len == 0 {
        return Some("00:00:00".to_string());
    }

    let negative = body[0] == 1;
    let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
    let hours = u64::from(days) * 24 + u64::from(body[5]);
    let (minutes, seconds) = (body[6], body[7]);

    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        hours,
        minutes,
        seconds
    );
    if len == 12 {
        let micros = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
        if micros > 0 {
            out.push_str(&format!(".{:06}", micros));
        }
    }
    Some(out)
}
