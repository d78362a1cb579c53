//! Connection authentication
//!
//! The service trusts a verified `{ learnerId, role }` pair per connection.
//! [`Authenticator`] is the seam where that verification happens;
//! [`JwtAuthenticator`] verifies HS256 tokens issued by the surrounding
//! application (and can issue them for local tooling and tests).

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use ptk_common::config::MIN_JWT_SECRET_LEN;
use ptk_common::model::{Identity, Role};
use ptk_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default token lifetime for issued tokens
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 12 * 60 * 60;

/// Resolves a connection token to a verified identity
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `token`; any failure is [`Error::Unauthorized`]
    async fn authenticate(&self, token: &str) -> Result<Identity>;
}

/// Claims carried by a connection token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Learner identity (e.g. an email)
    pub sub: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl JwtAuthenticator {
    /// Returns an error if the secret is shorter than [`MIN_JWT_SECRET_LEN`]
    pub fn new(secret: &str) -> Result<Self> {
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(Error::Config(format!(
                "JWT secret must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        })
    }

    pub fn with_ttl(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Issue a token for `identity`
    pub fn generate_token(&self, identity: &Identity) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: identity.learner_id.clone(),
            role: identity.role,
            iat: now,
            exp: now + self.ttl_secs,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Failed to generate token: {}", e)))
    }

    fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    ErrorKind::InvalidToken => "Invalid token",
                    _ => "Token validation failed",
                };
                Error::Unauthorized(reason.to_string())
            })
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity> {
        let claims = self.verify(token)?;
        if claims.sub.trim().is_empty() {
            return Err(Error::Unauthorized("Token has no subject".to_string()));
        }
        Ok(Identity::new(claims.sub, claims.role))
    }
}
