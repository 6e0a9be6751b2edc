//! Client configuration.

use std::time::Duration;

use crate::error::Error;
use crate::transport::Endpoint;

/// Default realtime endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:4000/realtime";

/// Interval between client heartbeats while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Base delay for linear reconnect backoff.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Abnormal closes tolerated before the manager stops retrying.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the realtime endpoint.
    pub url: String,

    /// Bearer token presented during the handshake.
    pub token: Option<String>,

    /// Heartbeat period while connected.
    pub heartbeat_interval: Duration,

    /// Reconnect delay is `reconnect_base_delay * attempt`.
    pub reconnect_base_delay: Duration,

    /// Attempt count at which reconnecting stops.
    pub max_reconnect_attempts: u32,

    /// Force a reconnect when no server heartbeat arrived for this long.
    /// `None` leaves dead-peer detection to the socket.
    pub heartbeat_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Create a new client configuration for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_timeout: None,
        }
    }

    /// Create a configuration for a relay on localhost.
    pub fn localhost() -> Self {
        Self::new(DEFAULT_URL)
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the reconnect base delay.
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Set the reconnect attempt cap.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Enable forced reconnects after heartbeat silence.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base_delay.saturating_mul(attempt)
    }

    /// Check the configuration for values the manager cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("url must not be empty".to_string()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat interval must be non-zero".to_string()));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(Error::Config(
                "max reconnect attempts must be at least 1".to_string(),
            ));
        }
        if let Some(timeout) = self.heartbeat_timeout {
            if timeout <= self.heartbeat_interval {
                return Err(Error::Config(format!(
                    "heartbeat timeout ({:?}) must exceed the heartbeat interval ({:?})",
                    timeout, self.heartbeat_interval
                )));
            }
        }
        Ok(())
    }

    /// Where and how the transport should connect.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: self.url.clone(),
            token: self.token.clone(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::localhost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(1000));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.token.is_none());
        assert!(config.heartbeat_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("wss://portal.example.com/realtime")
            .with_token("secret")
            .with_heartbeat_interval(Duration::from_secs(10))
            .with_reconnect_base_delay(Duration::from_millis(250))
            .with_max_reconnect_attempts(3)
            .with_heartbeat_timeout(Duration::from_secs(25));

        assert_eq!(config.url, "wss://portal.example.com/realtime");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert!(config.validate().is_ok());

        let endpoint = config.endpoint();
        assert_eq!(endpoint.url, config.url);
        assert_eq!(endpoint.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_linear_backoff() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::default()
            .with_heartbeat_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClientConfig::default()
            .with_max_reconnect_attempts(0)
            .validate()
            .is_err());
        assert!(ClientConfig::default()
            .with_heartbeat_timeout(Duration::from_secs(5))
            .validate()
            .is_err());
    }
}
