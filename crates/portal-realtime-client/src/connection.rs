//! Connection management for the realtime client.
//!
//! [`ConnectionManager`] owns the single physical socket, its lifecycle
//! (connect, heartbeat, reconnect, disconnect), the table of logical
//! subscriptions multiplexed over it and the queue of requests issued while
//! no socket is open.
//!
//! All state lives behind one mutex and every transition is applied while
//! holding it, so the manager behaves like a single event loop even though
//! socket events, timers and callers arrive on different tasks. Callbacks run
//! after the lock is released, so they may call back into the manager.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use portal_realtime_proto::{
    is_clean_close, ChangeEvent, ClientMessage, EventType, ServerMessage, SubscriptionKey,
    CLOSE_HEARTBEAT_TIMEOUT, CLOSE_NORMAL,
};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::queue::OutboundQueue;
use crate::subscription::{deliver, Callback, Subscription, SubscriptionInfo};
use crate::transport::{Endpoint, SocketEvent, SocketWriter, Transport};
use crate::websocket::WebSocketTransport;

/// Coarse connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// No socket and no reconnect pending.
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open.
    Connected,
    /// Disconnected with a reconnect timer armed.
    Reconnecting,
}

/// Snapshot of the connection, returned by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// The socket is open.
    pub is_connected: bool,
    /// A socket is being opened.
    pub is_connecting: bool,
    /// When the server last answered a heartbeat.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Consecutive abnormal closes since the last successful open.
    pub reconnect_attempts: u32,
    /// Coarse phase derived from the fields above.
    pub phase: ConnectionPhase,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            is_connected: false,
            is_connecting: false,
            last_heartbeat: None,
            reconnect_attempts: 0,
            phase: ConnectionPhase::Disconnected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting,
    Connected,
}

/// The socket currently owned by the manager.
struct ActiveSocket {
    generation: u64,
    writer: SocketWriter,
    pump: JoinHandle<()>,
    opened_at: Option<Instant>,
}

struct State {
    phase: Phase,
    last_heartbeat: Option<DateTime<Utc>>,
    last_heartbeat_at: Option<Instant>,
    reconnect_attempts: u32,
    generation: u64,
    socket: Option<ActiveSocket>,
    subscriptions: HashMap<SubscriptionKey, Subscription>,
    queue: OutboundQueue,
    heartbeat_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    /// Bumped whenever a pending reconnect is cancelled. A timer that wakes
    /// with an older value must not act.
    reconnect_epoch: u64,
}

impl State {
    fn new() -> Self {
        Self {
            phase: Phase::Disconnected,
            last_heartbeat: None,
            last_heartbeat_at: None,
            reconnect_attempts: 0,
            generation: 0,
            socket: None,
            subscriptions: HashMap::new(),
            queue: OutboundQueue::new(),
            heartbeat_task: None,
            reconnect_task: None,
            reconnect_epoch: 0,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .map(|s| s.generation == generation)
            .unwrap_or(false)
    }

    fn snapshot(&self) -> ConnectionState {
        let phase = match self.phase {
            Phase::Connected => ConnectionPhase::Connected,
            Phase::Connecting => ConnectionPhase::Connecting,
            Phase::Disconnected if self.reconnect_task.is_some() => ConnectionPhase::Reconnecting,
            Phase::Disconnected => ConnectionPhase::Disconnected,
        };

        ConnectionState {
            is_connected: self.phase == Phase::Connected,
            is_connecting: self.phase == Phase::Connecting,
            last_heartbeat: self.last_heartbeat,
            reconnect_attempts: self.reconnect_attempts,
            phase,
        }
    }

    /// Write a request to the open socket.
    fn send(&self, message: &ClientMessage) -> Result<(), Error> {
        let socket = match (&self.socket, self.phase) {
            (Some(socket), Phase::Connected) => socket,
            _ => return Err(Error::Transport("not connected".to_string())),
        };
        socket.writer.send_text(message.to_json()?)
    }

    /// Send now if connected, otherwise queue.
    fn send_or_queue(&mut self, message: ClientMessage) {
        if self.phase == Phase::Connected {
            match self.send(&message) {
                Ok(()) => return,
                Err(e) => tracing::debug!(error = %e, "send failed, queueing request"),
            }
        }
        self.queue.push(message);
    }

    /// Flush queued requests in order. Returns the keys of the subscribe
    /// requests that went out.
    fn flush_queue(&mut self) -> HashSet<SubscriptionKey> {
        let mut subscribed = HashSet::new();
        while let Some(message) = self.queue.pop() {
            if let Err(e) = self.send(&message) {
                tracing::warn!(error = %e, "flush interrupted");
                self.queue.requeue(message);
                break;
            }
            if message.is_subscribe() {
                if let Some(key) = message.key() {
                    subscribed.insert(key);
                }
            }
        }
        subscribed
    }

    /// Re-issue every live subscription not already sent by the flush.
    fn resubscribe_all(&mut self, already_sent: &HashSet<SubscriptionKey>) -> usize {
        let requests: Vec<ClientMessage> = self
            .subscriptions
            .values()
            .filter(|sub| !already_sent.contains(&sub.key))
            .map(Subscription::request)
            .collect();

        let count = requests.len();
        for request in requests {
            self.send_or_queue(request);
        }
        count
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect_epoch += 1;
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
    }
}

pub(crate) struct Inner {
    config: ClientConfig,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    state: Mutex<State>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Maintains one always-on connection to the realtime service and routes
/// row-change events to subscriber callbacks.
///
/// The manager is a cheap handle: clones share the same connection. The
/// connection is torn down when the last handle is dropped.
///
/// # Example
///
/// ```ignore
/// use portal_realtime_client::{ClientConfig, ConnectionManager, EventType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = ConnectionManager::new(
///         ClientConfig::new("wss://portal.example.com/realtime").with_token("jwt"),
///     )?;
///
///     let key = manager.subscribe("projects", EventType::Insert, "", |event| {
///         println!("new project: {}", event.record);
///     });
///
///     manager.connect().await;
///     // ...
///     manager.unsubscribe(&key);
///     manager.disconnect();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager that connects over WebSocket.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::with_transport(config, Arc::new(WebSocketTransport::new()))
    }

    /// Create a manager with a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        config.validate()?;
        let (state_tx, _) = watch::channel(ConnectionState::default());

        Ok(Self {
            inner: Arc::new(Inner {
                endpoint: config.endpoint(),
                config,
                transport,
                state: Mutex::new(State::new()),
                state_tx,
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    /// Open the connection.
    ///
    /// Resolves to `true` once the socket is open and `false` if this attempt
    /// failed. Calling it while a connect is already in flight waits for that
    /// attempt instead of opening a second socket.
    pub async fn connect(&self) -> bool {
        self.inner.connect().await
    }

    /// Close the connection on purpose.
    ///
    /// Cancels the heartbeat and any pending reconnect and closes the socket
    /// with the normal closure code. This is the only way to stop automatic
    /// reconnection. Subscriptions are kept and re-sent on the next connect.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Drop the current socket, reset the retry budget and connect again.
    pub async fn reconnect(&self) -> bool {
        self.inner.disconnect();
        {
            let mut state = self.inner.state.lock();
            state.reconnect_attempts = 0;
            self.inner.publish(&state);
        }
        self.inner.connect().await
    }

    /// Subscribe to row changes on `channel`.
    ///
    /// A later subscribe for the same channel and event replaces this one.
    /// The request is sent right away when connected and queued otherwise.
    /// Returns the key to pass to [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<F>(&self, channel: &str, event: EventType, filter: &str, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe_callback(channel, event, filter, Arc::new(callback))
    }

    /// Subscribe with an already shared callback.
    pub fn subscribe_callback(
        &self,
        channel: &str,
        event: EventType,
        filter: &str,
        callback: Callback,
    ) -> SubscriptionKey {
        let subscription = Subscription::new(channel, event, filter, callback);
        let key = subscription.key.clone();
        let request = subscription.request();

        let mut state = self.inner.state.lock();
        if state.subscriptions.insert(key.clone(), subscription).is_some() {
            tracing::debug!(key = %key, "replacing subscription");
        }
        state.queue.remove_subscribe(&key);
        state.send_or_queue(request);

        tracing::debug!(key = %key, filter, queued = state.queue.len(), "subscribed");
        key
    }

    /// Remove a subscription. Returns whether it existed.
    ///
    /// Sends an unsubscribe request only while connected; unknown keys are a
    /// no-op.
    pub fn unsubscribe(&self, key: &SubscriptionKey) -> bool {
        let mut state = self.inner.state.lock();
        let Some(subscription) = state.subscriptions.remove(key) else {
            return false;
        };

        state.queue.remove_subscribe(key);
        if state.phase == Phase::Connected {
            let request = ClientMessage::unsubscribe(subscription.channel.clone(), subscription.event);
            if let Err(e) = state.send(&request) {
                tracing::debug!(key = %key, error = %e, "unsubscribe not sent");
            }
        }

        tracing::debug!(
            key = %key,
            events_delivered = subscription.events_delivered,
            "unsubscribed"
        );
        true
    }

    /// Remove every subscription. Returns how many were removed.
    pub fn clear_all_subscriptions(&self) -> usize {
        let mut state = self.inner.state.lock();
        let removed: Vec<Subscription> = state.subscriptions.drain().map(|(_, sub)| sub).collect();
        state.queue.remove_all_subscribes();

        if state.phase == Phase::Connected {
            for sub in &removed {
                let request = ClientMessage::unsubscribe(sub.channel.clone(), sub.event);
                if let Err(e) = state.send(&request) {
                    tracing::debug!(key = %sub.key, error = %e, "unsubscribe not sent");
                }
            }
        }

        tracing::debug!(count = removed.len(), "cleared subscriptions");
        removed.len()
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().phase == Phase::Connected
    }

    /// Copy of the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().snapshot()
    }

    /// Receiver that observes every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }

    /// Snapshot of the live subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let state = self.inner.state.lock();
        let mut infos: Vec<SubscriptionInfo> = state.subscriptions.values().map(Subscription::info).collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Number of requests waiting for a socket.
    pub fn queued_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// The configuration this manager runs with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url)
            .field("state", &state.snapshot())
            .field("subscriptions", &state.subscriptions.len())
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl Inner {
    fn publish(&self, state: &State) {
        self.state_tx.send_replace(state.snapshot());
    }

    async fn connect(self: &Arc<Self>) -> bool {
        let state_rx = self.state_tx.subscribe();

        {
            let mut state = self.state.lock();
            if let Some(outcome) = self.begin_connect(&mut state) {
                return outcome;
            }
        }

        wait_for_attempt(state_rx).await
    }

    /// Start a connect attempt unless one is already running.
    ///
    /// Returns the outcome when it is known without waiting for the socket.
    fn begin_connect(self: &Arc<Self>, state: &mut State) -> Option<bool> {
        match state.phase {
            Phase::Connected => Some(true),
            Phase::Connecting => {
                tracing::debug!("connect already in progress");
                None
            }
            Phase::Disconnected => {
                state.cancel_reconnect();
                let opened = self.open_socket(state);
                self.publish(state);
                match opened {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::warn!(url = %self.endpoint.url, error = %e, "failed to open socket");
                        Some(false)
                    }
                }
            }
        }
    }

    /// Ask the transport for a socket and start pumping its events.
    fn open_socket(self: &Arc<Self>, state: &mut State) -> Result<(), Error> {
        let socket = self.transport.open(&self.endpoint)?;
        let (writer, mut events) = socket.into_parts();

        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(self);
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.handle_socket_event(generation, event);
            }
        });

        let previous = state.socket.replace(ActiveSocket {
            generation,
            writer,
            pump,
            opened_at: None,
        });
        if let Some(previous) = previous {
            previous.writer.close(CLOSE_NORMAL);
            previous.pump.abort();
        }

        state.phase = Phase::Connecting;
        tracing::debug!(url = %self.endpoint.url, generation, "connecting");
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        self.disconnect_locked(&mut state);
    }

    fn disconnect_locked(&self, state: &mut State) {
        state.stop_heartbeat();
        state.cancel_reconnect();

        if let Some(socket) = state.socket.take() {
            socket.writer.close(CLOSE_NORMAL);
            socket.pump.abort();
            tracing::info!(url = %self.endpoint.url, "disconnected");
        }

        state.phase = Phase::Disconnected;
        self.publish(state);
    }

    fn handle_socket_event(self: &Arc<Self>, generation: u64, event: SocketEvent) {
        match event {
            SocketEvent::Open => self.on_open(generation),
            SocketEvent::Message(text) => self.on_message(generation, &text),
            SocketEvent::Close { code, reason } => self.on_close(generation, code, &reason),
            SocketEvent::Error(error) => self.on_error(generation, &error),
        }
    }

    fn on_open(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if !state.is_current(generation) {
            return;
        }

        let now = Instant::now();
        if let Some(socket) = state.socket.as_mut() {
            socket.opened_at = Some(now);
        }
        state.phase = Phase::Connected;
        state.reconnect_attempts = 0;
        state.last_heartbeat_at = None;
        self.start_heartbeat(&mut state, generation);

        let flushed = state.flush_queue();
        let resubscribed = state.resubscribe_all(&flushed);

        tracing::info!(
            url = %self.endpoint.url,
            flushed = flushed.len(),
            resubscribed,
            "connected"
        );
        self.publish(&state);
    }

    fn on_message(&self, generation: u64, text: &str) {
        let message = match ServerMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match message {
            ServerMessage::Heartbeat => {
                let mut state = self.state.lock();
                if !state.is_current(generation) {
                    return;
                }
                state.last_heartbeat = Some(Utc::now());
                state.last_heartbeat_at = Some(Instant::now());
                self.publish(&state);
            }
            ServerMessage::Error { error } => {
                tracing::warn!(error = %error, "server reported an error");
            }
            push @ ServerMessage::Subscription { .. } => {
                let Some(event) = push.into_change_event() else {
                    return;
                };
                let key = event.key();

                let callback = {
                    let mut state = self.state.lock();
                    if !state.is_current(generation) {
                        return;
                    }
                    state.subscriptions.get_mut(&key).map(|sub| {
                        sub.events_delivered += 1;
                        sub.callback.clone()
                    })
                };

                match callback {
                    Some(callback) => {
                        deliver(&key, &callback, event);
                    }
                    None => tracing::trace!(key = %key, "no subscriber for change"),
                }
            }
        }
    }

    fn on_close(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        let mut state = self.state.lock();
        if !state.is_current(generation) {
            return;
        }

        // The pump is the task running this handler; it exits on its own
        // once the event channel closes.
        state.socket = None;
        self.drop_connection(&mut state, code, reason);
    }

    fn on_error(&self, generation: u64, error: &str) {
        let mut state = self.state.lock();
        if !state.is_current(generation) {
            return;
        }

        tracing::warn!(error, "socket error");
        if state.phase == Phase::Connecting {
            state.phase = Phase::Disconnected;
            self.publish(&state);
        }
    }

    /// Common tail of every unplanned close.
    fn drop_connection(self: &Arc<Self>, state: &mut State, code: u16, reason: &str) {
        state.phase = Phase::Disconnected;
        state.stop_heartbeat();

        if is_clean_close(code) {
            tracing::info!(code, "connection closed");
        } else {
            tracing::warn!(code, reason, "connection lost");
            self.schedule_reconnect(state);
        }
        self.publish(state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut State) {
        state.cancel_reconnect();
        state.reconnect_attempts += 1;
        let attempt = state.reconnect_attempts;

        if attempt >= self.config.max_reconnect_attempts {
            tracing::error!(
                attempts = attempt,
                "giving up on reconnecting; call connect() to try again"
            );
            return;
        }

        let delay = self.config.reconnect_delay(attempt);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        let epoch = state.reconnect_epoch;
        let weak = Arc::downgrade(self);
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let state_rx = inner.state_tx.subscribe();
            {
                // An abort issued while this task waits on the lock does not
                // land until the next await, so the epoch decides.
                let mut state = inner.state.lock();
                if state.reconnect_epoch != epoch || state.phase != Phase::Disconnected {
                    tracing::debug!(attempt, "reconnect cancelled");
                    return;
                }
                // Detach rather than abort: this task is the one running.
                state.reconnect_task = None;
                if let Some(outcome) = inner.begin_connect(&mut state) {
                    if !outcome {
                        tracing::debug!(attempt, "reconnect attempt failed");
                    }
                    return;
                }
            }

            if !wait_for_attempt(state_rx).await {
                tracing::debug!(attempt, "reconnect attempt failed");
            }
        }));
    }

    fn start_heartbeat(self: &Arc<Self>, state: &mut State, generation: u64) {
        state.stop_heartbeat();

        let period = self.config.heartbeat_interval;
        let weak = Arc::downgrade(self);
        state.heartbeat_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.heartbeat_tick(generation) {
                    break;
                }
            }
        }));
    }

    /// Send one heartbeat. Returns `false` when the timer should stop.
    fn heartbeat_tick(self: &Arc<Self>, generation: u64) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(generation) || state.phase != Phase::Connected {
            return false;
        }

        if let Some(timeout) = self.config.heartbeat_timeout {
            let last_seen = state
                .last_heartbeat_at
                .or_else(|| state.socket.as_ref().and_then(|s| s.opened_at));
            if let Some(last_seen) = last_seen {
                if last_seen.elapsed() > timeout {
                    tracing::warn!(
                        silent_ms = last_seen.elapsed().as_millis() as u64,
                        "server heartbeat timed out"
                    );
                    if let Some(socket) = state.socket.take() {
                        socket.writer.close(CLOSE_HEARTBEAT_TIMEOUT);
                        socket.pump.abort();
                    }
                    self.drop_connection(&mut state, CLOSE_HEARTBEAT_TIMEOUT, "heartbeat timeout");
                    return false;
                }
            }
        }

        if let Err(e) = state.send(&ClientMessage::Heartbeat) {
            tracing::debug!(error = %e, "heartbeat not sent");
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.stop_heartbeat();
        state.cancel_reconnect();
        if let Some(socket) = state.socket.take() {
            socket.writer.close(CLOSE_NORMAL);
            socket.pump.abort();
        }
    }
}

/// Feed lifecycle signals from a host environment into a manager.
pub(crate) fn spawn_signal_pump(
    manager: Weak<Inner>,
    mut signals: mpsc::UnboundedReceiver<crate::lifecycle::LifecycleSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            let Some(inner) = manager.upgrade() else {
                break;
            };
            ConnectionManager::from_inner(inner).handle_signal(signal).await;
        }
    })
}

/// Wait for the in-flight connect attempt to settle.
async fn wait_for_attempt(mut state_rx: watch::Receiver<ConnectionState>) -> bool {
    state_rx
        .wait_for(|s| !s.is_connecting)
        .await
        .map(|s| s.is_connected)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = ConnectionState::default();
        assert!(!state.is_connected);
        assert!(!state.is_connecting);
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.phase, ConnectionPhase::Disconnected);
    }

    #[test]
    fn test_snapshot_phase() {
        let mut state = State::new();
        assert_eq!(state.snapshot().phase, ConnectionPhase::Disconnected);

        state.phase = Phase::Connecting;
        let snapshot = state.snapshot();
        assert!(snapshot.is_connecting);
        assert!(!snapshot.is_connected);
        assert_eq!(snapshot.phase, ConnectionPhase::Connecting);
    }

    #[test]
    fn test_send_requires_connection() {
        let state = State::new();
        assert!(state.send(&ClientMessage::Heartbeat).is_err());
    }

    #[test]
    fn test_send_or_queue_while_disconnected() {
        let mut state = State::new();
        state.send_or_queue(ClientMessage::subscribe("projects", EventType::Insert, ""));
        assert_eq!(state.queue.len(), 1);
    }

    #[derive(Default)]
    struct CountingTransport {
        peers: Mutex<Vec<crate::transport::SocketPeer>>,
    }

    impl CountingTransport {
        fn opens(&self) -> usize {
            self.peers.lock().len()
        }

        fn emit(&self, index: usize, event: SocketEvent) {
            assert!(self.peers.lock()[index].emit(event));
        }
    }

    impl Transport for CountingTransport {
        fn open(&self, _endpoint: &Endpoint) -> Result<crate::transport::Socket, Error> {
            let (socket, peer) = crate::transport::Socket::pair();
            self.peers.lock().push(peer);
            Ok(socket)
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disconnect_beats_reconnect_timer_blocked_on_lock() {
        let transport = Arc::new(CountingTransport::default());
        let config = ClientConfig::new("ws://portal.test/realtime")
            .with_reconnect_base_delay(std::time::Duration::from_millis(20));
        let manager = ConnectionManager::with_transport(config, transport.clone()).unwrap();

        let connecting = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect().await }
        });
        wait_until(|| transport.opens() == 1).await;
        transport.emit(0, SocketEvent::Open);
        assert!(connecting.await.unwrap());

        transport.emit(
            0,
            SocketEvent::Close {
                code: portal_realtime_proto::CLOSE_ABNORMAL,
                reason: String::new(),
            },
        );
        wait_until(|| manager.connection_state().phase == ConnectionPhase::Reconnecting).await;

        // Let the timer fire while the lock is held, then disconnect under
        // the same guard.
        {
            let mut state = manager.inner.state.lock();
            std::thread::sleep(std::time::Duration::from_millis(60));
            manager.inner.disconnect_locked(&mut state);
        }

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(transport.opens(), 1);
        let state = manager.connection_state();
        assert_eq!(state.phase, ConnectionPhase::Disconnected);
        assert!(!state.is_connecting);
    }

    #[test]
    fn test_cancel_reconnect_bumps_epoch() {
        let mut state = State::new();
        state.cancel_reconnect();
        state.cancel_reconnect();
        assert_eq!(state.reconnect_epoch, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClientConfig::default().with_max_reconnect_attempts(0);
        assert!(ConnectionManager::new(config).is_err());
    }
}
