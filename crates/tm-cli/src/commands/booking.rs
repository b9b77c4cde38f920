//! Booking lifecycle commands.

use std::io::Write;

use tm_booking::{BookingAction, BookingId, CreateBookingRequest, TaskId};

use super::AppContext;
use crate::cli::{BookArgs, Commands};
use crate::error::CliError;
use crate::output::{BookingList, OutputFormat};

/// Handler for `book`, `confirm`, `cancel`, `complete`, `rate`, `show`,
/// `list` and `delete`.
pub struct BookingCommand<'a> {
    ctx: &'a AppContext,
}

impl<'a> BookingCommand<'a> {
    /// Creates a new booking command handler.
    #[must_use]
    pub const fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    /// Executes a booking command.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or is not a booking command.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: Commands,
    ) -> Result<(), CliError> {
        let service = self.ctx.service();
        let request = self.ctx.request();

        let action = match command {
            Commands::Book(args) => {
                let booking = service
                    .create_booking_as(&request, Self::create_request(args))
                    .await?;
                return format.write(out, &booking);
            }
            Commands::Show { id } => {
                let booking = service.get_booking_as(&request, &BookingId::from(id)).await?;
                return format.write(out, &booking);
            }
            Commands::List { role } => {
                let bookings = service.list_bookings_as(&request, role.into()).await?;
                return format.write(out, &BookingList { bookings });
            }
            Commands::Delete { id } => {
                let booking = service.delete_booking_as(&request, &BookingId::from(id)).await?;
                return format.write(out, &booking);
            }
            Commands::Confirm { id } => (id, BookingAction::Confirm),
            Commands::Cancel { id } => (id, BookingAction::Cancel),
            Commands::Complete { id } => (id, BookingAction::Complete),
            Commands::Rate { id, rating, review } => (id, BookingAction::Rate { rating, review }),
            other => {
                return Err(CliError::InvalidArgument(format!(
                    "not a booking command: {other:?}"
                )));
            }
        };

        let (id, action) = action;
        let booking = service
            .transition_as(&request, &BookingId::from(id), action)
            .await?;
        format.write(out, &booking)
    }

    fn create_request(args: BookArgs) -> CreateBookingRequest {
        CreateBookingRequest {
            task_id: TaskId::from(args.task_id),
            booker_id: tm_booking::UserId::default(),
            task_owner_id: None,
            credits: args.credits,
            timeslot: args.slot,
            notes: args.notes,
            idempotency_key: args.key,
        }
    }
}
