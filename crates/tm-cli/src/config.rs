//! CLI configuration file.
//!
//! ```toml
//! [booking]
//! store_timeout_ms = 2000
//!
//! [auth]
//! issuer = "trademinutes"
//! secret = "at-least-thirty-two-bytes-of-secret!!"
//! ```

use std::path::Path;

use serde::Deserialize;
use tm_auth::AuthSettings;
use tm_booking::BookingConfig;

use crate::error::CliError;

/// Issuer used when only a secret is supplied.
pub const DEFAULT_ISSUER: &str = "trademinutes";

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Booking service tunables.
    pub booking: BookingConfig,
    /// Token settings.
    pub auth: Option<AuthSettings>,
}

impl CliConfig {
    /// Load from `path`, or defaults when no file is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the booking section fails validation.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: Self =
            toml::from_str(content).map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;
        config.booking.validate()?;
        Ok(config)
    }

    /// Token settings from the file, or built from `secret` if the file has none.
    ///
    /// # Errors
    ///
    /// Returns an error if neither source provides a secret.
    pub fn auth_settings(&self, secret: Option<&str>) -> Result<AuthSettings, CliError> {
        if let Some(auth) = &self.auth {
            return Ok(auth.clone());
        }
        let secret = secret.ok_or_else(|| {
            CliError::Config("no [auth] table in config and no --jwt-secret / TM_JWT_SECRET".to_string())
        })?;
        Ok(AuthSettings {
            issuer: DEFAULT_ISSUER.to_string(),
            audience: None,
            secret: secret.to_string(),
            expiry_hours: 24,
        })
    }
}
