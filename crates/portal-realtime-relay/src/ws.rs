//! WebSocket endpoint speaking the realtime protocol.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use portal_realtime_proto::{ClientMessage, ServerMessage, SubscriptionKey};

use crate::auth::bearer_token;
use crate::error::{RelayError, Result};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// WebSocket upgrade handler for realtime connections
pub async fn ws_realtime(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
) -> Result<Response> {
    let subject = match &state.verifier {
        Some(verifier) => {
            let token = bearer_token(&headers, params.token.as_deref())
                .ok_or(RelayError::MissingToken)?;
            Some(verifier.verify(token)?.sub)
        }
        None => None,
    };

    Ok(ws.on_upgrade(move |socket| handle_realtime(socket, state, subject)))
}

/// Close code sent when the relay drops its clients on purpose.
pub const CLOSE_SERVICE_RESTART: u16 = 1012;

/// Handle one realtime connection until either side closes.
async fn handle_realtime(socket: WebSocket, state: AppState, subject: Option<String>) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let mut kicks = state.kicks.subscribe();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.pubsub.register(connection_id, tx.clone());
    tracing::info!(
        %connection_id,
        subject = subject.as_deref().unwrap_or("anonymous"),
        "client connected"
    );

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        sink
    });

    let close_code = loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = kicks.changed() => break Some(CLOSE_SERVICE_RESTART),
        };

        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(%connection_id, code = frame.map(|f| f.code), "client sent close");
                break None;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(%connection_id, "WebSocket error: {}", e);
                break None;
            }
            None => break None,
        };

        let request = match ClientMessage::from_json(&text) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx.send(ServerMessage::error(format!("Invalid request: {}", e)));
                continue;
            }
        };

        if let Some(reply) = handle_request(&state, connection_id, request).await {
            let _ = tx.send(reply);
        }
    };

    let removed = state.pubsub.remove_connection(connection_id).await;
    drop(tx);

    if let (Ok(mut sink), Some(code)) = (writer.await, close_code) {
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "relay restarting".into(),
            })))
            .await;
    }

    tracing::info!(%connection_id, subscriptions = removed, "client disconnected");
}

/// Apply one client request. Returns the frame to answer with, if any.
async fn handle_request(
    state: &AppState,
    connection_id: Uuid,
    request: ClientMessage,
) -> Option<ServerMessage> {
    match request {
        ClientMessage::Heartbeat => Some(ServerMessage::Heartbeat),
        ClientMessage::Subscription {
            channel,
            event,
            filter,
        } => match state
            .pubsub
            .subscribe(connection_id, &channel, event, &filter)
            .await
        {
            Ok(_) => None,
            Err(e) => Some(ServerMessage::error(e.to_string())),
        },
        ClientMessage::Unsubscription { channel, event } => {
            let key = SubscriptionKey::new(&channel, event);
            if !state.pubsub.unsubscribe(connection_id, &key).await {
                tracing::debug!(%connection_id, key = %key, "unsubscribe for unknown slot");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use portal_realtime_proto::EventType;

    #[tokio::test]
    async fn test_handle_request() {
        let state = AppState::new(RelayConfig::default());
        let id = Uuid::new_v4();

        assert_eq!(
            handle_request(&state, id, ClientMessage::Heartbeat).await,
            Some(ServerMessage::Heartbeat)
        );

        let subscribe = ClientMessage::subscribe("projects", EventType::Insert, "");
        assert_eq!(handle_request(&state, id, subscribe).await, None);
        assert_eq!(state.pubsub.subscription_count().await, 1);

        let bad = ClientMessage::subscribe("projects", EventType::Update, "id>3");
        assert!(matches!(
            handle_request(&state, id, bad).await,
            Some(ServerMessage::Error { .. })
        ));

        let unsubscribe = ClientMessage::unsubscribe("projects", EventType::Insert);
        assert_eq!(handle_request(&state, id, unsubscribe).await, None);
        assert_eq!(state.pubsub.subscription_count().await, 0);
    }
}
