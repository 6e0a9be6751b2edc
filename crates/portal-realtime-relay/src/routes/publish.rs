use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use portal_realtime_proto::{ChangeEvent, EventType, DEFAULT_SCHEMA};

use crate::auth::bearer_token;
use crate::error::{RelayError, Result};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/publish", post(publish))
}

/// A row change injected over HTTP.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub table: String,
    pub event_type: EventType,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub record: Value,
    #[serde(default)]
    pub old_record: Option<Value>,
}

impl From<PublishRequest> for ChangeEvent {
    fn from(request: PublishRequest) -> Self {
        ChangeEvent {
            event_type: request.event_type,
            schema: request.schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            table: request.table,
            record: request.record,
            old_record: request.old_record,
        }
    }
}

async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PublishRequest>,
) -> Result<Json<Value>> {
    if let Some(verifier) = &state.verifier {
        let token = bearer_token(&headers, None).ok_or(RelayError::MissingToken)?;
        verifier.verify(token)?;
    }
    if request.table.trim().is_empty() {
        return Err(RelayError::InvalidRequest("table must not be empty".to_string()));
    }

    let change: ChangeEvent = request.into();
    let delivered = state.pubsub.publish(&change).await;

    Ok(Json(json!({
        "success": true,
        "delivered": delivered,
    })))
}
