//! Statement Safety Filter
//!
//! Substring denylist applied to the upper-cased statement. This is a
//! heuristic, not a parser: a pattern inside a string literal is blocked
//! and an equivalent command spelled differently gets through.

use crate::error::Error;

/// A forbidden substring and the category it belongs to
#[derive(Debug, Clone)]
pub struct ForbiddenPattern {
    pub pattern: &'static str,
    pub category: &'static str,
}

/// Default denylist, tested in order
pub const DEFAULT_PATTERNS: &[ForbiddenPattern] = &[
    ForbiddenPattern { pattern: "DROP TABLE", category: "schema-destructive" },
    ForbiddenPattern { pattern: "DROP DATABASE", category: "schema-destructive" },
    ForbiddenPattern { pattern: "TRUNCATE TABLE", category: "schema-destructive" },
    ForbiddenPattern { pattern: "DELETE FROM", category: "row deletion" },
    ForbiddenPattern { pattern: "SHUTDOWN", category: "administrative" },
    ForbiddenPattern { pattern: "GRANT", category: "administrative" },
    ForbiddenPattern { pattern: "REVOKE", category: "administrative" },
];

/// Outcome of a safety check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block { pattern: &'static str, reason: String },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// Human readable reason ("Safe" when allowed)
    pub fn reason(&self) -> &str {
        match self {
            Verdict::Allow => "Safe",
            Verdict::Block { reason, .. } => reason,
        }
    }

    /// Convert a block into the error surfaced to the caller
    pub fn into_result(self) -> crate::Result<()> {
        match self {
            Verdict::Allow => Ok(()),
            Verdict::Block { pattern, .. } => Err(Error::Blocked {
                pattern: pattern.to_string(),
            }),
        }
    }
}

/// Ordered denylist filter
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    patterns: Vec<ForbiddenPattern>,
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS.to_vec())
    }
}

impl SafetyFilter {
    pub fn new(patterns: Vec<ForbiddenPattern>) -> Self {
        Self { patterns }
    }

    /// Check a statement; the first matching pattern wins
    pub fn check(&self, statement: &str) -> Verdict {
        let normalized = statement.trim().to_uppercase();

        for entry in &self.patterns {
            if normalized.contains(entry.pattern) {
                tracing::debug!("Statement matched {} pattern '{}'", entry.category, entry.pattern);
                return Verdict::Block {
                    pattern: entry.pattern,
                    reason: format!(
                        "Security Alert: Query contains forbidden command '{}'",
                        entry.pattern
                    ),
                };
            }
        }

        Verdict::Allow
    }

    pub fn patterns(&self) -> &[ForbiddenPattern] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_destructive_statements() {
        let filter = SafetyFilter::default();

        assert!(!filter.check("DROP TABLE actor;").is_allowed());
        assert!(!filter.check("DELETE FROM actor;").is_allowed());
        assert!(!filter.check("GRANT ALL ON *.*").is_allowed());
        assert!(!filter.check("truncate table payment").is_allowed());
        assert!(!filter.check("  shutdown").is_allowed());
    }

    #[test]
    fn test_allows_ordinary_statements() {
        let filter = SafetyFilter::default();

        let verdict = filter.check("SELECT * FROM actor LIMIT 1;");
        assert!(verdict.is_allowed());
        assert_eq!(verdict.reason(), "Safe");
        assert!(filter
            .check("INSERT INTO actor (first_name) VALUES ('x');")
            .is_allowed());
    }

    #[test]
    fn test_first_match_wins() {
        let filter = SafetyFilter::default();

        match filter.check("DELETE FROM t; DROP TABLE t;") {
            Verdict::Block { pattern, reason } => {
                assert_eq!(pattern, "DROP TABLE");
                assert!(reason.contains("'DROP TABLE'"));
            }
            Verdict::Allow => panic!("statement should be blocked"),
        }
    }

    #[test]
    fn test_substring_matching_over_blocks_literals() {
        let filter = SafetyFilter::default();
        // A forbidden word inside a string literal still matches
        assert!(!filter
            .check("INSERT INTO notes (body) VALUES ('please grant access')")
            .is_allowed());
    }

    #[test]
    fn test_into_result() {
        let filter = SafetyFilter::default();
        assert!(filter.check("SELECT 1").into_result().is_ok());

        let err = filter.check("REVOKE ALL ON *.* FROM bob").into_result().unwrap_err();
        assert!(matches!(err, Error::Blocked { ref pattern } if pattern == "REVOKE"));
    }
}
