//! Authentication Module
//!
//! Identity verification sits behind [`IdentityVerifier`]: given the bearer
//! token from `Authorization`, produce a verified [`Identity`] or fail with
//! `Unauthorized`. The shipped implementation is [`JwtVerifier`] (HS256).
//!
//! Signature checking is delegated to `jsonwebtoken`; expiry is checked here
//! against the injected [`Clock`] so tests stay deterministic.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use quill_core::{Clock, SystemClock, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_JWT_EXPIRATION_SECS, DEFAULT_JWT_LEEWAY_SECS};
use crate::error::{ApiError, ApiResult};

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

// ============================================================================
// SECRET
// ============================================================================

/// Type-safe JWT secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret. Empty secrets are rejected.
    pub fn new(secret: String) -> ApiResult<Self> {
        if secret.is_empty() {
            return Err(ApiError::validation("JWT secret must not be empty"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: JwtSecret,
    pub jwt_algorithm: Algorithm,
    /// Lifetime of tokens minted by [`generate_token`].
    pub jwt_expiration_secs: i64,
    /// Clock skew tolerated on `exp`.
    pub jwt_leeway_secs: i64,
    /// Required `iss`, if set.
    pub issuer: Option<String>,
    /// Required `aud`, if set.
    pub audience: Option<String>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.into())),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            jwt_leeway_secs: DEFAULT_JWT_LEEWAY_SECS,
            issuer: None,
            audience: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `QUILL_JWT_SECRET`: HS256 signing secret
    /// - `QUILL_JWT_ISSUER`: required `iss` claim (optional)
    /// - `QUILL_JWT_AUDIENCE`: required `aud` claim (optional)
    /// - `QUILL_JWT_LEEWAY_SECS`: clock skew tolerance (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let jwt_secret = std::env::var("QUILL_JWT_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .and_then(|s| JwtSecret::new(s).ok())
            .unwrap_or(defaults.jwt_secret);

        if jwt_secret.is_insecure_default() {
            tracing::warn!("QUILL_JWT_SECRET is not set; using the insecure default secret");
        }

        Self {
            jwt_secret,
            issuer: std::env::var("QUILL_JWT_ISSUER").ok().filter(|s| !s.is_empty()),
            audience: std::env::var("QUILL_JWT_AUDIENCE").ok().filter(|s| !s.is_empty()),
            jwt_leeway_secs: std::env::var("QUILL_JWT_LEEWAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JWT_LEEWAY_SECS),
            ..defaults
        }
    }

    /// Build a config around an explicit secret and clock.
    pub fn with_secret(secret: &str, clock: Arc<dyn Clock>) -> ApiResult<Self> {
        Ok(Self {
            jwt_secret: JwtSecret::new(secret.to_string())?,
            clock,
            ..Self::default()
        })
    }
}

// ============================================================================
// CLAIMS AND IDENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: Option<String>,
}

/// Turns a bearer token into a verified identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> ApiResult<Identity>;
}

// ============================================================================
// JWT VERIFIER
// ============================================================================

#[derive(Debug, Clone)]
pub struct JwtVerifier {
    config: AuthConfig,
}

impl JwtVerifier {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Signature, issuer and audience checks, then our own expiry check.
    pub fn validate(&self, token: &str) -> ApiResult<Claims> {
        let config = &self.config;
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

        let mut validation = Validation::new(config.jwt_algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ApiError::unauthorized("Token signature is invalid")
                }
                _ => ApiError::unauthorized(format!("Token validation failed: {}", e)),
            })?
            .claims;

        let now = config.clock.now().timestamp();
        if claims.exp < now - config.jwt_leeway_secs {
            return Err(ApiError::unauthorized("Token has expired"));
        }

        Ok(claims)
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> ApiResult<Identity> {
        let claims = self.validate(token)?;
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| ApiError::unauthorized("Token subject is not a user id"))?;
        Ok(Identity {
            user_id,
            email: claims.email,
        })
    }
}

/// Mint a token for `user_id`. Used by tests and local tooling.
pub fn generate_token(
    config: &AuthConfig,
    user_id: UserId,
    email: Option<String>,
) -> ApiResult<String> {
    let now = config.clock.now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email,
        iat: now,
        exp: now + config.jwt_expiration_secs,
        iss: config.issuer.clone(),
        aud: config.audience.clone(),
    };

    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    encode(&Header::new(config.jwt_algorithm), &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> ApiResult<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Authorization header must use Bearer scheme"))
}
