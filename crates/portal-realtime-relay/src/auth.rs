//! Bearer token verification.
//!
//! Clients present an HMAC-signed JWT either in the `Authorization` header of
//! the upgrade request or, for environments that cannot set headers on a
//! WebSocket handshake, in a `token` query parameter.
//!
//! # JWT Claims
//!
//! - `sub`: Subject (user identifier)
//! - `exp`: Expiration timestamp (Unix timestamp)
//!
//! Optional claims: `iat`, `role`.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier).
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: u64,

    /// Issued at time (Unix timestamp).
    #[serde(default)]
    pub iat: Option<u64>,

    /// Portal role (client, admin).
    #[serde(default)]
    pub role: Option<String>,
}

/// Verifies HS256 tokens against a shared secret.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    leeway_secs: u64,
}

impl TokenVerifier {
    /// Create a verifier with an HMAC secret string.
    pub fn with_secret_str(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            leeway_secs: 60,
        }
    }

    /// Verify a token and extract its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, RelayError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| RelayError::Unauthorized(format!("JWT verification failed: {}", e)))?;

        Ok(data.claims)
    }
}

/// Pull the bearer token from the request headers, falling back to the
/// `token` query parameter.
pub fn bearer_token<'a>(headers: &'a HeaderMap, query_token: Option<&'a str>) -> Option<&'a str> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
                .unwrap_or(value)
        });

    from_header
        .or(query_token)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
