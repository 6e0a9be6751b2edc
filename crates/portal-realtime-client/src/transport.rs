//! Transport abstraction.
//!
//! The connection manager never touches a network socket directly. It asks a
//! [`Transport`] to open a [`Socket`], writes [`OutboundFrame`]s into it and
//! reacts to the [`SocketEvent`]s it yields. [`Socket::pair`] builds both
//! ends, so a transport only has to drive the [`SocketPeer`] side.

use tokio::sync::mpsc;

use crate::error::Error;

/// Where to connect and which credential to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// WebSocket URL.
    pub url: String,
    /// Bearer token for the handshake.
    pub token: Option<String>,
}

/// A frame the manager asks the transport to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A JSON text frame.
    Text(String),
    /// Close the socket with the given code.
    Close(u16),
}

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The handshake completed.
    Open,
    /// A text frame arrived.
    Message(String),
    /// The socket is closed; no further events follow.
    Close { code: u16, reason: String },
    /// The socket failed. A `Close` event follows.
    Error(String),
}

/// Opens sockets for the connection manager.
pub trait Transport: Send + Sync + 'static {
    /// Start opening a socket.
    ///
    /// Returning `Err` means the socket could not even be constructed (bad
    /// URL, no runtime). Failures after construction are reported as
    /// `Error` and `Close` events on the returned socket.
    fn open(&self, endpoint: &Endpoint) -> Result<Socket, Error>;
}

/// Manager side of an open socket.
#[derive(Debug)]
pub struct Socket {
    frames: mpsc::UnboundedSender<OutboundFrame>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Socket {
    /// Create a connected socket/peer pair.
    pub fn pair() -> (Socket, SocketPeer) {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        (
            Socket {
                frames: frames_tx,
                events: events_rx,
            },
            SocketPeer {
                frames: frames_rx,
                events: events_tx,
            },
        )
    }

    pub(crate) fn into_parts(self) -> (SocketWriter, mpsc::UnboundedReceiver<SocketEvent>) {
        (SocketWriter { frames: self.frames }, self.events)
    }
}

/// Transport side of a socket.
#[derive(Debug)]
pub struct SocketPeer {
    frames: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl SocketPeer {
    /// Report an event to the manager. Returns `false` once the manager has
    /// dropped the socket.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Wait for the next frame the manager wants written.
    ///
    /// Returns `None` when the manager dropped the socket.
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.recv().await
    }

    /// Take the next pending frame without waiting.
    pub fn try_next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.try_recv().ok()
    }

    /// Split into the frame receiver and the event sender.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<OutboundFrame>,
        mpsc::UnboundedSender<SocketEvent>,
    ) {
        (self.frames, self.events)
    }
}

/// Write half held by the connection manager.
#[derive(Debug, Clone)]
pub(crate) struct SocketWriter {
    frames: mpsc::UnboundedSender<OutboundFrame>,
}

impl SocketWriter {
    pub(crate) fn send_text(&self, text: String) -> Result<(), Error> {
        self.frames
            .send(OutboundFrame::Text(text))
            .map_err(|_| Error::Transport("socket is gone".to_string()))
    }

    pub(crate) fn close(&self, code: u16) {
        let _ = self.frames.send(OutboundFrame::Close(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_routes_both_ways() {
        let (socket, mut peer) = Socket::pair();
        let (writer, mut events) = socket.into_parts();

        writer.send_text("hello".to_string()).unwrap();
        writer.close(1000);
        assert_eq!(peer.next_frame().await, Some(OutboundFrame::Text("hello".into())));
        assert_eq!(peer.try_next_frame(), Some(OutboundFrame::Close(1000)));
        assert_eq!(peer.try_next_frame(), None);

        assert!(peer.emit(SocketEvent::Open));
        assert_eq!(events.recv().await, Some(SocketEvent::Open));
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (socket, peer) = Socket::pair();
        let (writer, _events) = socket.into_parts();
        drop(peer);

        assert!(writer.send_text("late".to_string()).is_err());
    }

    #[test]
    fn test_emit_after_manager_dropped() {
        let (socket, peer) = Socket::pair();
        drop(socket);
        assert!(!peer.emit(SocketEvent::Open));
    }
}
