//! Error types for tm-auth.

use thiserror::Error;
use tm_booking::BookingError;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while issuing or checking tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is malformed or its signature does not verify.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// Why the token was rejected.
        reason: String,
    },

    /// The token's `exp` is in the past.
    #[error("token expired")]
    TokenExpired,

    /// The subject claim is not a usable user ID.
    #[error("invalid subject: {reason}")]
    InvalidSubject {
        /// What was wrong with the subject.
        reason: String,
    },

    /// Signing or configuration failure.
    #[error("jwt error: {reason}")]
    JwtError {
        /// Underlying reason.
        reason: String,
    },
}

impl From<AuthError> for BookingError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::JwtError { reason } => Self::Config(reason),
            other => Self::Unauthorized {
                reason: other.to_string(),
            },
        }
    }
}
