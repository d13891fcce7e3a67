//! Statement Classifier
//!
//! Decides whether a statement is a read or a write by looking at its
//! leading keyword only.

use serde::{Deserialize, Serialize};

/// Read/write classification of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Read,
    Write,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Read => "READ",
            QueryType::Write => "WRITE",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a statement. Anything not starting with `SELECT` is a write.
pub fn classify(statement: &str) -> QueryType {
    let trimmed = statement.trim_start().as_bytes();
    if trimmed.len() >= 6 && trimmed[..6].eq_ignore_ascii_case(b"SELECT") {
        QueryType::Read
    } else {
        QueryType::Write
    }
}
