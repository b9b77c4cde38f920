//! JWT session tokens.
//!
//! - [`JwtClaims`]: standard claims plus the user's email
//! - [`JwtConfig`]: HS256 signing and validation settings
//! - [`JwtManager`]: issues and validates tokens

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tm_booking::UserId;

use crate::error::{AuthError, Result};

/// Default token lifetime in hours.
const DEFAULT_EXPIRY_HOURS: i64 = 24;

/// Minimum HS256 secret length in bytes.
const MIN_SECRET_LEN: usize = 32;

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Audience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Not before (Unix timestamp).
    pub nbf: i64,
    /// Token ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// The user's email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl JwtClaims {
    /// Claims for `user_id`, valid from now for the default lifetime.
    #[must_use]
    pub fn new(user_id: &UserId, issuer: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            iss: issuer.into(),
            aud: None,
            exp: (now + Duration::hours(DEFAULT_EXPIRY_HOURS)).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
            email: None,
        }
    }

    /// Set the expiration to `duration` from now.
    #[must_use]
    pub fn with_expiry_duration(mut self, duration: Duration) -> Self {
        self.exp = (Utc::now() + duration).timestamp();
        self
    }

    /// Set the audience.
    #[must_use]
    pub fn with_audience(mut self, aud: impl Into<String>) -> Self {
        self.aud = Some(aud.into());
        self
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The user ID in the subject claim.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject is blank.
    pub fn user_id(&self) -> Result<UserId> {
        let user = UserId::from_string(self.sub.trim());
        if user.is_blank() {
            return Err(AuthError::InvalidSubject {
                reason: "subject claim is empty".to_string(),
            });
        }
        Ok(user)
    }

    /// Check if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// JWT settings as they appear in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Expected `iss`.
    pub issuer: String,
    /// Expected `aud`, if any.
    #[serde(default)]
    pub audience: Option<String>,
    /// HS256 secret, at least 32 bytes.
    pub secret: String,
    /// Lifetime of issued tokens.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
}

const fn default_expiry_hours() -> i64 {
    DEFAULT_EXPIRY_HOURS
}

impl AuthSettings {
    /// Build the signing configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is too short or the lifetime is not positive.
    pub fn jwt_config(&self) -> Result<JwtConfig> {
        if self.expiry_hours <= 0 {
            return Err(AuthError::JwtError {
                reason: "expiry_hours must be greater than 0".to_string(),
            });
        }
        let mut config = JwtConfig::new_hs256(self.secret.as_bytes(), &self.issuer)?
            .with_default_expiry(Duration::hours(self.expiry_hours));
        if let Some(audience) = &self.audience {
            config = config.with_audience(audience);
        }
        Ok(config)
    }
}

/// Signing and validation settings.
#[derive(Clone)]
pub struct JwtConfig {
    secret: Vec<u8>,
    algorithm: Algorithm,
    issuer: String,
    audience: Option<String>,
    default_expiry: Duration,
}

impl JwtConfig {
    /// HMAC-SHA256 configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is shorter than 32 bytes.
    pub fn new_hs256(secret: impl AsRef<[u8]>, issuer: impl Into<String>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::JwtError {
                reason: format!("secret must be at least {MIN_SECRET_LEN} bytes for HS256"),
            });
        }
        Ok(Self {
            secret: secret.to_vec(),
            algorithm: Algorithm::HS256,
            issuer: issuer.into(),
            audience: None,
            default_expiry: Duration::hours(DEFAULT_EXPIRY_HOURS),
        })
    }

    /// Require this audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the lifetime of issued tokens.
    #[must_use]
    pub fn with_default_expiry(mut self, duration: Duration) -> Self {
        self.default_expiry = duration;
        self
    }

    /// The issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "nbf", "sub"]);
        validation.validate_nbf = true;
        if let Some(aud) = &self.audience {
            validation.set_audience(&[aud]);
        } else {
            validation.validate_aud = false;
        }
        validation
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("default_expiry", &self.default_expiry)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Issues and validates tokens.
#[derive(Debug)]
pub struct JwtManager {
    config: JwtConfig,
}

impl JwtManager {
    /// Create a manager.
    #[must_use]
    pub const fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    /// Issue a token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn create_token(&self, user_id: &UserId, email: Option<&str>) -> Result<String> {
        let mut claims = JwtClaims::new(user_id, &self.config.issuer)
            .with_expiry_duration(self.config.default_expiry);
        if let Some(aud) = &self.config.audience {
            claims = claims.with_audience(aud);
        }
        if let Some(email) = email {
            claims = claims.with_email(email);
        }
        self.create_token_with_claims(&claims)
    }

    /// Issue a token with caller-supplied claims.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn create_token_with_claims(&self, claims: &JwtClaims) -> Result<String> {
        encode(&Header::new(self.config.algorithm), claims, &EncodingKey::from_secret(&self.config.secret))
            .map_err(|e| AuthError::JwtError {
                reason: e.to_string(),
            })
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExpired`] for expired tokens and
    /// [`AuthError::InvalidToken`] for anything else that fails validation.
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        use jsonwebtoken::errors::ErrorKind;

        decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(&self.config.secret),
            &self.config.validation(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken {
                reason: e.to_string(),
            },
        })
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &JwtConfig {
        &self.config
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// Returns an error if the header is empty or uses another scheme.
pub fn extract_jwt_from_header(header: &str) -> Result<&str> {
    let header = header.trim();
    if header.is_empty() {
        return Err(AuthError::InvalidToken {
            reason: "authorization header is empty".to_string(),
        });
    }
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::InvalidToken {
            reason: "invalid authorization header format, expected 'Bearer <token>'".to_string(),
        })
}
