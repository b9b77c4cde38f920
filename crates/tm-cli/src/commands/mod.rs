//! Command implementations.
//!
//! Every command runs against a [`AppContext`]: the JSON-file state under
//! `--state-dir`, the escrow ledger, and the JWT identity provider.

mod account;
mod booking;
mod task;

use std::io::Write;
use std::sync::Arc;

use tm_auth::{JwtIdentityProvider, JwtManager};
use tm_booking::{
    BookingService, CreditEscrow, JsonBookingStore, JsonTaskRepository, RequestContext,
};
use tracing::debug;

pub use account::AccountCommand;
pub use booking::BookingCommand;
pub use task::TaskCommand;

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;
use crate::error::CliError;
use crate::output::{IssuedToken, OutputFormat};

/// The service type the CLI drives.
pub type Service = BookingService<JsonTaskRepository, JsonBookingStore, JwtIdentityProvider>;

/// Shared state for one CLI invocation.
pub struct AppContext {
    service: Service,
    identity: Arc<JwtIdentityProvider>,
    token: Option<String>,
}

impl AppContext {
    /// Open the state directory and build the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file or token settings are invalid.
    pub fn open(cli: &Cli) -> Result<Self, CliError> {
        let config = CliConfig::load(cli.config.as_deref())?;
        let settings = config.auth_settings(cli.jwt_secret.as_deref())?;
        let identity = Arc::new(JwtIdentityProvider::new(JwtManager::new(settings.jwt_config()?)));

        let escrow = if config.booking.snapshot_escrow {
            CreditEscrow::open(&cli.state_dir)
        } else {
            CreditEscrow::new()
        };
        debug!(state_dir = %cli.state_dir.display(), "opening state");

        let service = BookingService::new(
            Arc::new(JsonTaskRepository::open(&cli.state_dir)),
            Arc::new(JsonBookingStore::open(&cli.state_dir)),
            Arc::clone(&identity),
            config.booking,
        )
        .with_escrow(Arc::new(escrow));

        Ok(Self {
            service,
            identity,
            token: cli.token.clone(),
        })
    }

    /// The booking service.
    #[must_use]
    pub const fn service(&self) -> &Service {
        &self.service
    }

    /// Request context carrying the caller's token, if any.
    #[must_use]
    pub fn request(&self) -> RequestContext {
        self.token
            .as_deref()
            .map(RequestContext::bearer)
            .unwrap_or_default()
    }

    /// Issue a token for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_token(&self, user: &str, email: Option<&str>) -> Result<IssuedToken, CliError> {
        let user_id = tm_booking::UserId::from(user);
        let token = self.identity.manager().create_token(&user_id, email)?;
        Ok(IssuedToken {
            user: user.to_string(),
            token,
        })
    }
}

/// Execute the parsed command line, writing results to `out`.
///
/// # Errors
///
/// Returns an error if the command fails.
pub async fn run<W: Write>(cli: Cli, out: &mut W) -> Result<(), CliError> {
    let format = OutputFormat::new(cli.format);
    let ctx = AppContext::open(&cli)?;

    match cli.command {
        Commands::Task { command } => TaskCommand::new(&ctx).execute(out, &format, &command).await,
        Commands::Account { command } => AccountCommand::new(&ctx).execute(out, &format, &command),
        Commands::Token { user, email } => {
            let issued = ctx.issue_token(&user, email.as_deref())?;
            format.write(out, &issued)
        }
        other => BookingCommand::new(&ctx).execute(out, &format, other).await,
    }
}
