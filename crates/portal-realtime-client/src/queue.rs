//! Outbound message queue.
//!
//! Requests issued while no socket is open wait here and are flushed in
//! FIFO order once the connection comes up.

use std::collections::VecDeque;

use portal_realtime_proto::{ClientMessage, SubscriptionKey};

/// FIFO of requests awaiting a live socket.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    messages: VecDeque<ClientMessage>,
}

impl OutboundQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request.
    pub fn push(&mut self, message: ClientMessage) {
        self.messages.push_back(message);
    }

    /// Put a request back at the head after a failed send.
    pub fn requeue(&mut self, message: ClientMessage) {
        self.messages.push_front(message);
    }

    /// Take the oldest request.
    pub fn pop(&mut self) -> Option<ClientMessage> {
        self.messages.pop_front()
    }

    /// Drop any pending subscribe request for `key`. Returns whether one was
    /// removed.
    pub fn remove_subscribe(&mut self, key: &SubscriptionKey) -> bool {
        let before = self.messages.len();
        self.messages
            .retain(|m| !(m.is_subscribe() && m.key().as_ref() == Some(key)));
        self.messages.len() != before
    }

    /// Drop every pending subscribe request.
    pub fn remove_all_subscribes(&mut self) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_subscribe());
        before - self.messages.len()
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Pending requests, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ClientMessage> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_realtime_proto::EventType;

    #[test]
    fn test_fifo_order() {
        let mut queue = OutboundQueue::new();
        queue.push(ClientMessage::subscribe("projects", EventType::Insert, ""));
        queue.push(ClientMessage::subscribe("documents", EventType::Update, ""));
        queue.push(ClientMessage::Heartbeat);

        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.pop(),
            Some(ClientMessage::subscribe("projects", EventType::Insert, ""))
        );

        let head = queue.pop().unwrap();
        queue.requeue(head.clone());
        assert_eq!(queue.pop(), Some(head));
        assert_eq!(queue.pop(), Some(ClientMessage::Heartbeat));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_subscribe_only_touches_key() {
        let mut queue = OutboundQueue::new();
        queue.push(ClientMessage::subscribe("projects", EventType::Insert, ""));
        queue.push(ClientMessage::subscribe("projects", EventType::Update, ""));
        queue.push(ClientMessage::unsubscribe("projects", EventType::Insert));

        let key = SubscriptionKey::new("projects", EventType::Insert);
        assert!(queue.remove_subscribe(&key));
        assert!(!queue.remove_subscribe(&key));

        let remaining: Vec<_> = queue.iter().cloned().collect();
        assert_eq!(
            remaining,
            vec![
                ClientMessage::subscribe("projects", EventType::Update, ""),
                ClientMessage::unsubscribe("projects", EventType::Insert),
            ]
        );
    }

    #[test]
    fn test_remove_all_subscribes() {
        let mut queue = OutboundQueue::new();
        queue.push(ClientMessage::subscribe("projects", EventType::Insert, ""));
        queue.push(ClientMessage::Heartbeat);
        queue.push(ClientMessage::subscribe("messages", EventType::Insert, ""));

        assert_eq!(queue.remove_all_subscribes(), 2);
        assert_eq!(queue.len(), 1);
    }
}
