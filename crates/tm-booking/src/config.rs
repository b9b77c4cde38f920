//! Booking service configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};

/// Upper bound for any configured timeout.
const MAX_TIMEOUT_MS: u64 = 60_000;

/// Tunables for [`BookingService`](crate::service::BookingService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// Bound on each durable-store and task-repository call, in milliseconds.
    pub store_timeout_ms: u64,
    /// Bound on resolving the caller's identity, in milliseconds.
    pub identity_timeout_ms: u64,
    /// Accept create requests whose quoted credits differ from the task price.
    /// The task price is charged either way.
    pub allow_price_mismatch: bool,
    /// Persist the escrow ledger next to the other state files.
    pub snapshot_escrow: bool,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 5_000,
            identity_timeout_ms: 2_000,
            allow_price_mismatch: false,
            snapshot_escrow: true,
        }
    }
}

impl BookingConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BookingError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BookingError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is zero or unreasonably large.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("store_timeout_ms", self.store_timeout_ms),
            ("identity_timeout_ms", self.identity_timeout_ms),
        ] {
            if value == 0 {
                return Err(BookingError::Config(format!("{name} must be greater than 0")));
            }
            if value > MAX_TIMEOUT_MS {
                return Err(BookingError::Config(format!(
                    "{name} cannot exceed {MAX_TIMEOUT_MS}"
                )));
            }
        }
        Ok(())
    }

    /// Store call timeout.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Identity resolution timeout.
    #[must_use]
    pub const fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }
}
