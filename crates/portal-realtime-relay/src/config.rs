use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "portal-realtime-relay")]
#[command(about = "Portal Realtime Relay - development event source for realtime clients")]
#[command(version)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "4000")]
    pub port: u16,

    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// HMAC secret for verifying client tokens (unset: accept anonymous clients)
    #[arg(long, env = "PORTAL_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: Option<String>,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            jwt_secret: args.jwt_secret.filter(|s| !s.is_empty()),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            jwt_secret: None,
        }
    }
}

impl RelayConfig {
    /// Configuration for tests: localhost on an ephemeral port.
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ..Default::default()
        }
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from(["portal-realtime-relay", "--port", "4100", "--jwt-secret", ""]);
        let config: RelayConfig = args.into();
        assert_eq!(config.listen_addr(), "127.0.0.1:4100");
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn test_ephemeral() {
        let config = RelayConfig::ephemeral().with_jwt_secret("s3cret");
        assert_eq!(config.port, 0);
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
    }
}
