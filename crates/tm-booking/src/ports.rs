//! Collaborator traits consumed by the booking service.
//!
//! Each trait is the only way the core reaches a suspending collaborator.
//! Implementations live in [`memory`](crate::memory), [`file`](crate::file)
//! and the `tm-auth` crate.

use std::future::Future;

use crate::booking::{Booking, BookingFilter, StatusUpdate};
use crate::error::Result;
use crate::ids::{BookingId, TaskId, UserId};
use crate::slot::Slot;
use crate::task::{SlotState, Task, TaskUpdate};

/// Per-request context handed to the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Raw `Authorization` header value, if any.
    pub authorization: Option<String>,
    /// Correlation ID for logs.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Context carrying a bearer token.
    #[must_use]
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self {
            authorization: Some(format!("Bearer {}", token.as_ref())),
            request_id: None,
        }
    }

    /// Attach a request ID.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Caller's user ID.
    pub user_id: UserId,
    /// Caller's email, when known.
    pub email: Option<String>,
}

/// Resolves the authenticated caller of a request.
#[allow(async_fn_in_trait)]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolve the caller.
    ///
    /// Fails with [`BookingError::Unauthorized`](crate::BookingError::Unauthorized)
    /// when the request carries no valid credentials.
    fn resolve_caller(&self, ctx: &RequestContext) -> impl Future<Output = Result<Caller>> + Send;
}

/// Read/write access to task documents.
#[allow(async_fn_in_trait)]
pub trait TaskRepository: Send + Sync + 'static {
    /// Fetch a task, or `None` if it does not exist.
    fn get_task(&self, id: &TaskId) -> impl Future<Output = Result<Option<Task>>> + Send;

    /// Store a new task.
    fn insert_task(&self, task: Task) -> impl Future<Output = Result<()>> + Send;

    /// Mirror the claim state of one slot.
    fn update_availability(
        &self,
        id: &TaskId,
        slot: &Slot,
        state: SlotState,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Set the task's `is_bookable` flag.
    fn set_bookable(&self, id: &TaskId, bookable: bool) -> impl Future<Output = Result<()>> + Send;

    /// Apply an owner edit and return the updated task.
    fn update_task(
        &self,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> impl Future<Output = Result<Task>> + Send;
}

/// Durable storage for bookings.
#[allow(async_fn_in_trait)]
pub trait BookingStore: Send + Sync + 'static {
    /// Store a new booking.
    fn insert_booking(&self, booking: &Booking) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a booking, or `None` if it does not exist.
    fn get_booking(&self, id: &BookingId) -> impl Future<Output = Result<Option<Booking>>> + Send;

    /// Write the mutable fields of a booking.
    fn update_booking_status(
        &self,
        id: &BookingId,
        update: &StatusUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Bookings matching `filter`, oldest first.
    fn query_bookings(
        &self,
        filter: &BookingFilter,
    ) -> impl Future<Output = Result<Vec<Booking>>> + Send;

    /// Remove a booking. Returns `false` if it did not exist.
    fn delete_booking(&self, id: &BookingId) -> impl Future<Output = Result<bool>> + Send;
}
