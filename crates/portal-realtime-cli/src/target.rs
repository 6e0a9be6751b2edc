//! Subscription targets given on the command line.

use std::str::FromStr;

use portal_realtime_proto::{EqFilter, EventType};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("expected table:EVENT[:filter], got '{0}'")]
    Format(String),

    #[error("invalid event in '{0}': {1}")]
    Event(String, String),

    #[error("invalid filter in '{0}': {1}")]
    Filter(String, String),
}

/// One `table:EVENT[:filter]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub table: String,
    pub event: EventType,
    pub filter: String,
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let table = parts.next().unwrap_or_default().trim();
        let event = parts.next().ok_or_else(|| TargetError::Format(s.to_string()))?;
        let filter = parts.next().unwrap_or_default().trim();

        if table.is_empty() {
            return Err(TargetError::Format(s.to_string()));
        }
        let event = event
            .parse::<EventType>()
            .map_err(|e| TargetError::Event(s.to_string(), e.to_string()))?;
        EqFilter::parse(filter).map_err(|e| TargetError::Filter(s.to_string(), e.to_string()))?;

        Ok(Self {
            table: table.to_string(),
            event,
            filter: filter.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        let target: Target = "projects:INSERT".parse().unwrap();
        assert_eq!(target.table, "projects");
        assert_eq!(target.event, EventType::Insert);
        assert!(target.filter.is_empty());

        let target: Target = "documents:update:project_id=eq.p1".parse().unwrap();
        assert_eq!(target.event, EventType::Update);
        assert_eq!(target.filter, "project_id=eq.p1");
    }

    #[test]
    fn test_reject_bad_targets() {
        assert!(matches!("projects".parse::<Target>(), Err(TargetError::Format(_))));
        assert!(matches!(":INSERT".parse::<Target>(), Err(TargetError::Format(_))));
        assert!(matches!("projects:UPSERT".parse::<Target>(), Err(TargetError::Event(..))));
        assert!(matches!(
            "projects:INSERT:id>3".parse::<Target>(),
            Err(TargetError::Filter(..))
        ));
    }
}
