//! Output formatters for change events.

use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use portal_realtime_client::ChangeEvent;
use serde_json::json;

/// Output format for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Human-readable single line
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Text => write!(f, "text"),
        }
    }
}

/// Render one event received at `at`.
pub fn format_event(format: OutputFormat, event: &ChangeEvent, at: DateTime<Utc>) -> String {
    let timestamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    match format {
        OutputFormat::Json => json!({
            "received_at": timestamp,
            "event": event,
        })
        .to_string(),
        OutputFormat::Text => {
            let mut line = format!(
                "[{}] {} {}.{} {}",
                timestamp, event.event_type, event.schema, event.table, event.record
            );
            if let Some(old) = &event.old_record {
                line.push_str(&format!(" (was {})", old));
            }
            line
        }
    }
}
