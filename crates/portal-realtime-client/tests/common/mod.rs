//! Shared test fixtures: an in-memory transport and helpers to drive it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portal_realtime_client::proto::{ClientMessage, EventType, ServerMessage};
use portal_realtime_client::{
    ClientConfig, ConnectionManager, Endpoint, Error, OutboundFrame, Socket, SocketEvent,
    SocketPeer, Transport,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Transport that hands every opened socket's peer end to the test.
pub struct MockTransport {
    peers: mpsc::UnboundedSender<SocketPeer>,
    opens: AtomicUsize,
    refuse: AtomicBool,
}

impl MockTransport {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Make every following `open` fail before a socket exists.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn open(&self, _endpoint: &Endpoint) -> Result<Socket, Error> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Connection("refused by test".to_string()));
        }

        let (socket, peer) = Socket::pair();
        let _ = self.peers.send(peer);
        Ok(socket)
    }
}

pub struct TestContext {
    pub manager: ConnectionManager,
    pub transport: Arc<MockTransport>,
    peers: mpsc::UnboundedReceiver<SocketPeer>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new("ws://portal.test/realtime").with_token("test-token"))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MockTransport {
            peers: tx,
            opens: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        });
        let manager = ConnectionManager::with_transport(config, transport.clone()).unwrap();

        Self {
            manager,
            transport,
            peers: rx,
        }
    }

    /// The next socket the manager opened.
    pub async fn next_peer(&mut self) -> SocketPeer {
        tokio::time::timeout(Duration::from_secs(1), self.peers.recv())
            .await
            .expect("no socket opened")
            .expect("transport dropped")
    }

    /// A socket opened since the last call, if any.
    pub fn try_next_peer(&mut self) -> Option<SocketPeer> {
        self.peers.try_recv().ok()
    }

    /// Connect and complete the handshake.
    pub async fn connect(&mut self) -> SocketPeer {
        let manager = self.manager.clone();
        let connecting = tokio::spawn(async move { manager.connect().await });

        let peer = self.next_peer().await;
        assert!(peer.emit(SocketEvent::Open));
        assert!(connecting.await.unwrap(), "connect should succeed");
        peer
    }
}

/// Let spawned tasks run to idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Every frame written so far.
pub fn frames(peer: &mut SocketPeer) -> Vec<OutboundFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = peer.try_next_frame() {
        frames.push(frame);
    }
    frames
}

/// Every text frame written so far, decoded.
pub fn sent(peer: &mut SocketPeer) -> Vec<ClientMessage> {
    frames(peer)
        .into_iter()
        .filter_map(|frame| match frame {
            OutboundFrame::Text(text) => Some(ClientMessage::from_json(&text).unwrap()),
            OutboundFrame::Close(_) => None,
        })
        .collect()
}

/// Push a server frame to the manager.
pub fn push(peer: &SocketPeer, message: ServerMessage) {
    assert!(peer.emit(SocketEvent::Message(message.to_json().unwrap())));
}

/// Build an insert push.
pub fn insert(channel: &str, record: Value) -> ServerMessage {
    ServerMessage::change(channel, EventType::Insert, record, None)
}

/// Close the socket from the server side.
pub fn close(peer: &SocketPeer, code: u16) {
    assert!(peer.emit(SocketEvent::Close {
        code,
        reason: String::new(),
    }));
}
