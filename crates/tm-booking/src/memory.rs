//! In-memory collaborators.
//!
//! Used by tests and by embedders that keep state elsewhere. The store and
//! repository carry fault toggles so callers can exercise the service's
//! compensation paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::booking::{Booking, BookingFilter, StatusUpdate};
use crate::error::{BookingError, Result};
use crate::ids::{BookingId, TaskId, UserId};
use crate::ports::{BookingStore, Caller, IdentityProvider, RequestContext, TaskRepository};
use crate::slot::Slot;
use crate::task::{SlotState, Task, TaskUpdate};

/// Fault switches shared by the in-memory adapters.
#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    read_only: AtomicBool,
    latency_ms: AtomicU64,
}

impl Faults {
    async fn check_read(&self, what: &str) -> Result<()> {
        self.delay().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BookingError::store(format!("{what}: store unavailable")));
        }
        Ok(())
    }

    async fn check_write(&self, what: &str) -> Result<()> {
        self.check_read(what).await?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(BookingError::store(format!("{what}: store is read-only")));
        }
        Ok(())
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// Task repository backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<TaskId, Task>>,
    faults: Faults,
}

impl InMemoryTaskRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding `tasks`.
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let repo = Self::new();
        repo.tasks
            .write()
            .extend(tasks.into_iter().map(|task| (task.id.clone(), task)));
        repo
    }

    /// Make every call fail with [`BookingError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes fail while reads keep working.
    pub fn set_read_only(&self, read_only: bool) {
        self.faults.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Snapshot of a task without going through the async interface.
    #[must_use]
    pub fn peek(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().get(id).cloned()
    }
}

impl TaskRepository for InMemoryTaskRepository {
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.faults.check_read("get_task").await?;
        Ok(self.tasks.read().get(id).cloned())
    }

    async fn insert_task(&self, task: Task) -> Result<()> {
        self.faults.check_write("insert_task").await?;
        task.validate()?;
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(BookingError::validation(format!("task {} already exists", task.id)));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_availability(&self, id: &TaskId, slot: &Slot, state: SlotState) -> Result<()> {
        self.faults.check_write("update_availability").await?;
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(id).ok_or_else(|| BookingError::task_not_found(id))?;
        task.set_slot_state(slot, state)
    }

    async fn set_bookable(&self, id: &TaskId, bookable: bool) -> Result<()> {
        self.faults.check_write("set_bookable").await?;
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(id).ok_or_else(|| BookingError::task_not_found(id))?;
        task.is_bookable = bookable;
        Ok(())
    }

    async fn update_task(&self, id: &TaskId, update: &TaskUpdate) -> Result<Task> {
        self.faults.check_write("update_task").await?;
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(id).ok_or_else(|| BookingError::task_not_found(id))?;
        update.apply(task)?;
        Ok(task.clone())
    }
}

/// Booking store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<BookingId, Booking>>,
    faults: Faults,
}

impl InMemoryBookingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`BookingError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes fail while reads keep working.
    pub fn set_read_only(&self, read_only: bool) {
        self.faults.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.faults.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of stored bookings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bookings.read().len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bookings.read().is_empty()
    }
}

pub(crate) fn sorted(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| a.booked_at.cmp(&b.booked_at).then_with(|| a.id.cmp(&b.id)));
    bookings
}

impl BookingStore for InMemoryBookingStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        self.faults.check_write("insert_booking").await?;
        let mut bookings = self.bookings.write();
        if bookings.contains_key(&booking.id) {
            return Err(BookingError::validation(format!(
                "booking {} already exists",
                booking.id
            )));
        }
        bookings.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>> {
        self.faults.check_read("get_booking").await?;
        Ok(self.bookings.read().get(id).cloned())
    }

    async fn update_booking_status(&self, id: &BookingId, update: &StatusUpdate) -> Result<()> {
        self.faults.check_write("update_booking_status").await?;
        let mut bookings = self.bookings.write();
        let booking = bookings
            .get_mut(id)
            .ok_or_else(|| BookingError::booking_not_found(id))?;
        update.apply_to(booking);
        Ok(())
    }

    async fn query_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        self.faults.check_read("query_bookings").await?;
        let matching = self
            .bookings
            .read()
            .values()
            .filter(|booking| filter.matches(booking))
            .cloned()
            .collect();
        Ok(sorted(matching))
    }

    async fn delete_booking(&self, id: &BookingId) -> Result<bool> {
        self.faults.check_write("delete_booking").await?;
        Ok(self.bookings.write().remove(id).is_some())
    }
}

/// Identity provider mapping fixed bearer tokens to users.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    tokens: RwLock<HashMap<String, Caller>>,
}

impl StaticIdentityProvider {
    /// Create a provider with no known tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user`.
    pub fn register(&self, token: impl Into<String>, user: impl Into<UserId>) {
        let caller = Caller {
            user_id: user.into(),
            email: None,
        };
        self.tokens.write().insert(token.into(), caller);
    }

    /// Stop accepting `token`.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    async fn resolve_caller(&self, ctx: &RequestContext) -> Result<Caller> {
        let header = ctx
            .authorization
            .as_deref()
            .ok_or_else(|| BookingError::Unauthorized {
                reason: "missing authorization header".to_string(),
            })?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| BookingError::Unauthorized {
                reason: "authorization header must use the Bearer scheme".to_string(),
            })?;
        self.tokens
            .read()
            .get(token.trim())
            .cloned()
            .ok_or_else(|| BookingError::Unauthorized {
                reason: "unknown token".to_string(),
            })
    }
}
