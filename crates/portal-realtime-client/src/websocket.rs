//! WebSocket transport backed by tokio-tungstenite.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use portal_realtime_proto::CLOSE_ABNORMAL;

use crate::error::Error;
use crate::transport::{Endpoint, OutboundFrame, Socket, SocketEvent, SocketPeer, Transport};

/// Close code reported when the peer sent a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Opens real WebSocket connections.
///
/// The bearer token travels in the `Authorization` header of the upgrade
/// request. Each socket is driven by its own task, which ends when either
/// side closes.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, endpoint: &Endpoint) -> Result<Socket, Error> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Connection(format!("no async runtime: {}", e)))?;
        let request = build_request(endpoint)?;

        let (socket, peer) = Socket::pair();
        runtime.spawn(run_socket(request, peer));
        Ok(socket)
    }
}

/// Build the upgrade request, adding the scheme when it is missing.
fn build_request(endpoint: &Endpoint) -> Result<Request, Error> {
    let url = if endpoint.url.starts_with("ws://") || endpoint.url.starts_with("wss://") {
        endpoint.url.clone()
    } else {
        format!("ws://{}", endpoint.url)
    };

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::Connection(format!("invalid url {}: {}", url, e)))?;

    if let Some(token) = &endpoint.token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Connection(format!("invalid token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    Ok(request)
}

/// Drive one socket until it closes.
async fn run_socket(request: Request, peer: SocketPeer) {
    let (mut frames, events) = peer.into_parts();
    let uri = request.uri().to_string();

    let stream = match connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(url = %uri, error = %e, "websocket handshake failed");
            let _ = events.send(SocketEvent::Error(e.to_string()));
            let _ = events.send(SocketEvent::Close {
                code: CLOSE_ABNORMAL,
                reason: String::new(),
            });
            return;
        }
    };

    tracing::debug!(url = %uri, "websocket open");
    let _ = events.send(SocketEvent::Open);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        let _ = events.send(SocketEvent::Error(e.to_string()));
                        let _ = events.send(SocketEvent::Close { code: CLOSE_ABNORMAL, reason: String::new() });
                        break;
                    }
                }
                Some(OutboundFrame::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: String::new().into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    let _ = write.close().await;
                    let _ = events.send(SocketEvent::Close { code, reason: String::new() });
                    break;
                }
                None => {
                    // Manager dropped the socket without closing it.
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SocketEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    let _ = events.send(SocketEvent::Close { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(SocketEvent::Error(e.to_string()));
                    let _ = events.send(SocketEvent::Close { code: CLOSE_ABNORMAL, reason: String::new() });
                    break;
                }
                None => {
                    let _ = events.send(SocketEvent::Close { code: CLOSE_ABNORMAL, reason: String::new() });
                    break;
                }
            },
        }
    }

    tracing::debug!(url = %uri, "websocket task finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_bearer_token() {
        let endpoint = Endpoint {
            url: "ws://127.0.0.1:4000/realtime".to_string(),
            token: Some("abc".to_string()),
        };
        let request = build_request(&endpoint).unwrap();
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(request.uri().path(), "/realtime");
    }

    #[test]
    fn test_scheme_is_added() {
        let endpoint = Endpoint {
            url: "127.0.0.1:4000/realtime".to_string(),
            token: None,
        };
        let request = build_request(&endpoint).unwrap();
        assert_eq!(request.uri().scheme_str(), Some("ws"));
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_invalid_url_fails_construction() {
        let endpoint = Endpoint {
            url: "ws://not a host/realtime".to_string(),
            token: None,
        };
        assert!(build_request(&endpoint).is_err());
    }

    #[test]
    fn test_open_without_runtime_fails() {
        let endpoint = Endpoint {
            url: "ws://127.0.0.1:4000/realtime".to_string(),
            token: None,
        };
        assert!(WebSocketTransport::new().open(&endpoint).is_err());
    }
}
