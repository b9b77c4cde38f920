//! Credit account commands.

use std::io::Write;

use tm_booking::UserId;

use super::AppContext;
use crate::cli::AccountCommands;
use crate::error::CliError;
use crate::output::{BalanceReport, OutputFormat};

/// Handler for `account` subcommands.
pub struct AccountCommand<'a> {
    ctx: &'a AppContext,
}

impl<'a> AccountCommand<'a> {
    /// Creates a new account command handler.
    #[must_use]
    pub const fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    /// Executes the account command.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &AccountCommands,
    ) -> Result<(), CliError> {
        let escrow = self.ctx.service().escrow();
        let (user, balance) = match command {
            AccountCommands::Deposit { user, amount } => {
                let balance = escrow.deposit(&UserId::from(user.as_str()), *amount)?;
                (user, balance)
            }
            AccountCommands::Balance { user } => (user, escrow.balance(&UserId::from(user.as_str()))),
        };
        format.write(
            out,
            &BalanceReport {
                user: user.clone(),
                available: balance.available,
                held: balance.held,
            },
        )
    }
}
