//! Row filters.
//!
//! Subscriptions can narrow a channel to rows where one column equals a
//! value, written `column=eq.value` (for example `project_id=eq.p1`). The
//! empty string means "every row".

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::Error;

/// An equality predicate on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EqFilter {
    /// Column to compare.
    pub column: String,
    /// Expected value, compared as text.
    pub value: String,
}

impl EqFilter {
    /// Create a filter matching rows where `column` equals `value`.
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Parse a wire filter. Returns `Ok(None)` for the empty filter.
    pub fn parse(filter: &str) -> Result<Option<Self>, Error> {
        let filter = filter.trim();
        if filter.is_empty() {
            return Ok(None);
        }

        let (column, rest) = filter
            .split_once('=')
            .ok_or_else(|| Error::InvalidFilter(filter.to_string()))?;
        let value = rest
            .strip_prefix("eq.")
            .ok_or_else(|| Error::InvalidFilter(filter.to_string()))?;
        if column.is_empty() {
            return Err(Error::InvalidFilter(filter.to_string()));
        }

        Ok(Some(Self::new(column, value)))
    }

    /// Check whether a row satisfies the predicate.
    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => s == &self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

impl fmt::Display for EqFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

impl FromStr for EqFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)?.ok_or_else(|| Error::InvalidFilter(s.to_string()))
    }
}

/// Shorthand for `column=eq.value`.
pub fn eq(column: &str, value: impl fmt::Display) -> String {
    format!("{}=eq.{}", column, value)
}
