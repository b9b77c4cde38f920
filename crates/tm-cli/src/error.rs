//! CLI error types.

use thiserror::Error;
use tm_auth::AuthError;
use tm_booking::BookingError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A booking operation failed.
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// Token handling failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code: 2 for rejected requests, 1 for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Booking(e) if e.status_code() < 500 => 2,
            Self::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}
