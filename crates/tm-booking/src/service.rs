//! Booking service: orchestrates the availability index, the credit escrow,
//! and the booking state machine against the injected collaborators.
//!
//! Every operation follows the same shape: validate and authorize with no
//! side effects, stage in-memory effects, persist, then commit. If the
//! persist step fails the staged effects are undone before the error is
//! returned, so callers never observe a claim or a hold without a stored
//! booking behind it.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::availability::{AvailabilityIndex, ClaimToken};
use crate::booking::{Booking, BookingAction, BookingFilter, Effect, Role, StatusUpdate};
use crate::config::BookingConfig;
use crate::error::{BookingError, Result};
use crate::escrow::CreditEscrow;
use crate::ids::{BookingId, TaskId, UserId};
use crate::ports::{BookingStore, Caller, IdentityProvider, RequestContext, TaskRepository};
use crate::slot::Slot;
use crate::task::{SlotState, Task, TaskUpdate};

/// Lock map size above which idle per-booking locks are pruned.
const LOCK_PRUNE_THRESHOLD: usize = 256;

/// Completed idempotency keys remembered before the oldest are forgotten.
const IDEMPOTENCY_CAPACITY: usize = 4096;

/// A request to reserve one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    /// Task to book.
    pub task_id: TaskId,
    /// Who is booking. Overwritten with the resolved caller in
    /// [`BookingService::create_booking_as`].
    #[serde(default)]
    pub booker_id: UserId,
    /// Owner as the client saw it; must match the task if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_owner_id: Option<UserId>,
    /// Price as the client saw it; must match the task if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<u64>,
    /// The slot to reserve.
    pub timeslot: Slot,
    /// Note to the owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Client-chosen key making retries safe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl CreateBookingRequest {
    /// A minimal request.
    #[must_use]
    pub fn new(task_id: impl Into<TaskId>, booker_id: impl Into<UserId>, timeslot: Slot) -> Self {
        Self {
            task_id: task_id.into(),
            booker_id: booker_id.into(),
            task_owner_id: None,
            credits: None,
            timeslot,
            notes: None,
            idempotency_key: None,
        }
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach a note to the owner.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check that the request is well formed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank IDs, an invalid slot, a zero
    /// quoted price, or a blank idempotency key.
    pub fn validate(&self) -> Result<()> {
        if self.task_id.is_blank() {
            return Err(BookingError::validation("taskId is required"));
        }
        if self.booker_id.is_blank() {
            return Err(BookingError::validation("bookerId is required"));
        }
        if self.credits == Some(0) {
            return Err(BookingError::validation("credits must be positive"));
        }
        if self
            .idempotency_key
            .as_deref()
            .is_some_and(|key| key.trim().is_empty())
        {
            return Err(BookingError::validation("idempotency key cannot be blank"));
        }
        self.timeslot.validate()
    }
}

#[derive(Debug, Clone)]
enum Idempotency {
    InFlight,
    Done(BookingId),
}

type IdempotencyKey = (UserId, String);

/// Keys in flight plus the most recent completed keys, oldest evicted first.
#[derive(Debug)]
struct IdempotencyKeys {
    entries: HashMap<IdempotencyKey, Idempotency>,
    done: VecDeque<IdempotencyKey>,
    capacity: usize,
}

impl IdempotencyKeys {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            done: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &IdempotencyKey) -> Option<&Idempotency> {
        self.entries.get(key)
    }

    fn start(&mut self, key: IdempotencyKey) {
        self.entries.insert(key, Idempotency::InFlight);
    }

    fn finish(&mut self, key: IdempotencyKey, booking_id: BookingId) {
        self.entries.insert(key.clone(), Idempotency::Done(booking_id));
        self.done.push_back(key);
        while self.done.len() > self.capacity {
            if let Some(oldest) = self.done.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, key: &IdempotencyKey) {
        self.entries.remove(key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Marks an idempotency key as in flight; forgets it on drop unless completed.
struct InFlightKey<'a> {
    keys: &'a Mutex<IdempotencyKeys>,
    key: Option<IdempotencyKey>,
}

impl InFlightKey<'_> {
    fn complete(mut self, booking_id: BookingId) {
        if let Some(key) = self.key.take() {
            self.keys.lock().finish(key, booking_id);
        }
    }
}

impl Drop for InFlightKey<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.keys.lock().forget(&key);
        }
    }
}

/// A claimed slot plus held credits not yet backed by a stored booking.
///
/// Dropping it without calling [`keep`](Self::keep) hands both back, which
/// covers early returns and cancelled futures alike.
struct Reservation<'a> {
    index: &'a AvailabilityIndex,
    escrow: &'a CreditEscrow,
    token: Option<ClaimToken>,
    booker: UserId,
    held: bool,
}

impl<'a> Reservation<'a> {
    fn new(index: &'a AvailabilityIndex, escrow: &'a CreditEscrow, token: ClaimToken, booker: UserId) -> Self {
        Self {
            index,
            escrow,
            token: Some(token),
            booker,
            held: false,
        }
    }

    fn hold(&mut self, owner: &UserId, amount: u64) -> Result<()> {
        if let Some(token) = &self.token {
            self.escrow.hold(&token.booking_id, &self.booker, owner, amount)?;
            self.held = true;
        }
        Ok(())
    }

    fn keep(mut self) {
        self.token = None;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        if self.held {
            if let Err(e) = self.escrow.drop_hold(&self.booker, &token.booking_id) {
                error!(booking_id = %token.booking_id, error = %e, "failed to return held credits");
            }
        }
        self.index.release_token(&token);
        warn!(
            task_id = %token.task_id,
            slot = %token.slot,
            booking_id = %token.booking_id,
            "reservation compensated"
        );
    }
}

/// The booking core.
pub struct BookingService<R, S, I> {
    tasks: Arc<R>,
    store: Arc<S>,
    identity: Arc<I>,
    config: BookingConfig,
    index: AvailabilityIndex,
    escrow: Arc<CreditEscrow>,
    locks: Mutex<HashMap<BookingId, Arc<tokio::sync::Mutex<()>>>>,
    idempotency: Mutex<IdempotencyKeys>,
}

impl<R, S, I> std::fmt::Debug for BookingService<R, S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingService")
            .field("config", &self.config)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<R, S, I> BookingService<R, S, I>
where
    R: TaskRepository,
    S: BookingStore,
    I: IdentityProvider,
{
    /// Create a service over the given collaborators with a memory-only escrow.
    #[must_use]
    pub fn new(tasks: Arc<R>, store: Arc<S>, identity: Arc<I>, config: BookingConfig) -> Self {
        Self {
            tasks,
            store,
            identity,
            config,
            index: AvailabilityIndex::new(),
            escrow: Arc::new(CreditEscrow::new()),
            locks: Mutex::new(HashMap::new()),
            idempotency: Mutex::new(IdempotencyKeys::new(IDEMPOTENCY_CAPACITY)),
        }
    }

    /// Use `escrow` instead of the default memory-only ledger.
    #[must_use]
    pub fn with_escrow(mut self, escrow: Arc<CreditEscrow>) -> Self {
        self.escrow = escrow;
        self
    }

    /// The availability index.
    #[must_use]
    pub const fn index(&self) -> &AvailabilityIndex {
        &self.index
    }

    /// The credit escrow.
    #[must_use]
    pub fn escrow(&self) -> &CreditEscrow {
        &self.escrow
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &BookingConfig {
        &self.config
    }

    /// The task repository.
    #[must_use]
    pub fn tasks(&self) -> &R {
        &self.tasks
    }

    /// The booking store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    /// Reserve a slot and hold the task's price from the booker.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for malformed input, self-booking, or a
    ///   quoted owner/price that does not match the task
    /// - [`BookingError::NotFound`] if the task does not exist
    /// - [`BookingError::SlotUnavailable`] if the slot cannot be claimed
    /// - [`BookingError::InsufficientCredits`] if the booker cannot pay
    /// - [`BookingError::DuplicateRequest`] if the same idempotency key is in flight
    /// - [`BookingError::StoreUnavailable`] if the booking could not be stored;
    ///   the claim and hold are released first
    pub async fn create_booking(&self, request: CreateBookingRequest) -> Result<Booking> {
        request.validate()?;

        let Some(key) = request.idempotency_key.clone() else {
            return self.create_new(&request).await;
        };
        let key = (request.booker_id.clone(), key);
        let in_flight = match self.begin_idempotent(key)? {
            Ok(guard) => guard,
            Err(existing) => {
                debug!(booking_id = %existing, "idempotent retry");
                return self.get_booking(&existing).await;
            }
        };
        let booking = self.create_new(&request).await?;
        in_flight.complete(booking.id.clone());
        Ok(booking)
    }

    fn begin_idempotent(
        &self,
        key: IdempotencyKey,
    ) -> Result<std::result::Result<InFlightKey<'_>, BookingId>> {
        let mut keys = self.idempotency.lock();
        match keys.get(&key) {
            Some(Idempotency::InFlight) => Err(BookingError::DuplicateRequest { key: key.1 }),
            Some(Idempotency::Done(id)) => Ok(Err(id.clone())),
            None => {
                keys.start(key.clone());
                Ok(Ok(InFlightKey {
                    keys: &self.idempotency,
                    key: Some(key),
                }))
            }
        }
    }

    async fn create_new(&self, request: &CreateBookingRequest) -> Result<Booking> {
        let task = self.load_task(&request.task_id).await?;
        self.check_bookable(&task, request)?;

        let mut booking = Booking::pending(
            BookingId::new(),
            task.id.clone(),
            request.booker_id.clone(),
            task.owner_id().clone(),
            request.timeslot.clone(),
            task.credits,
            Utc::now().timestamp(),
        )?;
        booking.notes.clone_from(&request.notes);

        let token = self.index.try_claim(&task, &booking.timeslot, &booking.id)?;
        let mut reservation =
            Reservation::new(&self.index, &self.escrow, token, booking.booker_id.clone());
        reservation.hold(&booking.task_owner_id, booking.credits)?;

        self.bounded("insert_booking", self.store.insert_booking(&booking))
            .await?;
        reservation.keep();

        self.mirror_slot(
            &booking.task_id,
            &booking.timeslot,
            SlotState::Claimed {
                booking_id: booking.id.clone(),
            },
        )
        .await;

        info!(
            booking_id = %booking.id,
            task_id = %booking.task_id,
            booker = %booking.booker_id,
            slot = %booking.timeslot,
            credits = booking.credits,
            "booking created"
        );
        Ok(booking)
    }

    fn check_bookable(&self, task: &Task, request: &CreateBookingRequest) -> Result<()> {
        if task.owner_id() == &request.booker_id {
            return Err(BookingError::validation("owners cannot book their own task"));
        }
        if let Some(owner) = &request.task_owner_id {
            if owner != task.owner_id() {
                return Err(BookingError::validation(format!(
                    "task {} is owned by {}, not {owner}",
                    task.id,
                    task.owner_id()
                )));
            }
        }
        if let Some(quoted) = request.credits {
            if quoted != task.credits {
                if !self.config.allow_price_mismatch {
                    return Err(BookingError::validation(format!(
                        "task {} costs {} credits, request quoted {quoted}",
                        task.id, task.credits
                    )));
                }
                warn!(task_id = %task.id, quoted, price = task.credits, "charging task price over quoted credits");
            }
        }
        if !task.is_bookable {
            return Err(BookingError::slot_unavailable(&task.id, "task is not bookable"));
        }
        Ok(())
    }

    /// Apply `action` by `actor` to a booking.
    ///
    /// Transitions on the same booking are serialized. A rejected request
    /// changes nothing.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] if the booking does not exist
    /// - [`BookingError::Authorization`] if `actor` may not perform `action`
    /// - [`BookingError::InvalidTransition`] if the action is not legal now
    /// - [`BookingError::Validation`] for an out-of-range rating
    /// - [`BookingError::StoreUnavailable`] if the new status could not be
    ///   stored; staged escrow effects are undone first
    pub async fn transition(
        &self,
        booking_id: &BookingId,
        actor: &UserId,
        action: BookingAction,
    ) -> Result<Booking> {
        let lock = self.booking_lock(booking_id);
        let _serialized = lock.lock().await;
        let booking = self.load_booking(booking_id).await?;
        self.transition_locked(booking, actor, &action).await
    }

    async fn transition_locked(
        &self,
        booking: Booking,
        actor: &UserId,
        action: &BookingAction,
    ) -> Result<Booking> {
        let transition = booking.plan(actor, action).inspect_err(|e| {
            warn!(booking_id = %booking.id, %actor, %action, error = %e, "transition rejected");
        })?;

        let mut next = booking.clone();
        next.apply(&transition, Utc::now().timestamp())?;

        if transition.effect != Effect::None {
            // The index must know the task before it can release or consume.
            if let Some(task) = self.find_task(&booking.task_id).await? {
                self.index.observe(&task);
            }
        }

        match transition.effect {
            Effect::None => {}
            Effect::Release => self.escrow.begin_release(&booking.booker_id, &booking.id)?,
            Effect::Settle => self.escrow.begin_settle(&booking.booker_id, &booking.id)?,
        }

        let update = StatusUpdate::of(&next);
        if let Err(e) = self
            .bounded("update_booking_status", self.store.update_booking_status(&next.id, &update))
            .await
        {
            if transition.effect != Effect::None {
                self.escrow.abort(&booking.booker_id, &booking.id);
            }
            warn!(booking_id = %booking.id, %action, error = %e, "status not stored, transition undone");
            return Err(e);
        }

        match transition.effect {
            Effect::None => {}
            Effect::Release => self.commit_release(&next).await,
            Effect::Settle => self.commit_settle(&next).await,
        }

        info!(
            booking_id = %next.id,
            %actor,
            from = %transition.from,
            to = %transition.to,
            %action,
            "booking transitioned"
        );
        Ok(next)
    }

    async fn commit_release(&self, booking: &Booking) {
        if let Err(e) = self.escrow.commit(&booking.booker_id, &booking.id) {
            error!(booking_id = %booking.id, error = %e, "escrow release failed after status was stored");
        }
        if self
            .index
            .release(&booking.task_id, &booking.timeslot, &booking.id)
        {
            self.mirror_slot(&booking.task_id, &booking.timeslot, SlotState::Open)
                .await;
        }
    }

    async fn commit_settle(&self, booking: &Booking) {
        if let Err(e) = self.escrow.commit(&booking.booker_id, &booking.id) {
            error!(booking_id = %booking.id, error = %e, "escrow settlement failed after status was stored");
        }
        let open = match self
            .index
            .finalize(&booking.task_id, &booking.timeslot, &booking.id)
        {
            Ok(open) => open,
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "slot not consumed");
                return;
            }
        };
        self.mirror_slot(
            &booking.task_id,
            &booking.timeslot,
            SlotState::Consumed {
                booking_id: booking.id.clone(),
            },
        )
        .await;
        if open == 0 && self.still_fully_consumed(&booking.task_id).await {
            match self
                .bounded("set_bookable", self.tasks.set_bookable(&booking.task_id, false))
                .await
            {
                Ok(()) => info!(task_id = %booking.task_id, "all slots consumed, task closed"),
                Err(e) => warn!(task_id = %booking.task_id, error = %e, "failed to close task"),
            }
        }
    }

    /// Reload the task and merge any slots the owner added since the booking
    /// was claimed. Only a task with nothing left to offer gets closed.
    async fn still_fully_consumed(&self, task_id: &TaskId) -> bool {
        match self.find_task(task_id).await {
            Ok(Some(task)) => {
                self.index.observe(&task);
                let open = self.index.open_slots(task_id);
                if !open.is_empty() {
                    debug!(task_id = %task_id, open = open.len(), "new slots offered, task stays open");
                }
                open.is_empty()
            }
            Ok(None) => false,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "could not reload task, leaving it open");
                false
            }
        }
    }

    /// Rate a completed booking. Shorthand for a [`BookingAction::Rate`] transition.
    ///
    /// # Errors
    ///
    /// See [`transition`](Self::transition).
    pub async fn rate(
        &self,
        booking_id: &BookingId,
        actor: &UserId,
        rating: u8,
        review: Option<String>,
    ) -> Result<Booking> {
        self.transition(booking_id, actor, BookingAction::Rate { rating, review })
            .await
    }

    /// Fetch a booking.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::NotFound`] if it does not exist, or a store error.
    pub async fn get_booking(&self, booking_id: &BookingId) -> Result<Booking> {
        self.load_booking(booking_id).await
    }

    /// Bookings where `user` plays `role`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    pub async fn list_bookings(&self, user: &UserId, role: Role) -> Result<Vec<Booking>> {
        let filter = BookingFilter::new(user.clone(), role);
        self.bounded("query_bookings", self.store.query_bookings(&filter))
            .await
    }

    /// Remove a booking. A booking that is still pending or confirmed is
    /// cancelled first, returning its slot and credits.
    ///
    /// Returns the booking as it was when removed.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Authorization`] for non-participants, or any
    /// error from the implicit cancel or the store.
    pub async fn delete_booking(&self, booking_id: &BookingId, actor: &UserId) -> Result<Booking> {
        let lock = self.booking_lock(booking_id);
        let _serialized = lock.lock().await;
        let mut booking = self.load_booking(booking_id).await?;
        if booking.party(actor).is_none() {
            return Err(BookingError::Authorization {
                actor: actor.to_string(),
                action: format!("delete booking {booking_id}"),
            });
        }
        if !booking.status.is_terminal() {
            booking = self
                .transition_locked(booking, actor, &BookingAction::Cancel)
                .await?;
        }
        self.bounded("delete_booking", self.store.delete_booking(booking_id))
            .await?;
        info!(%booking_id, %actor, "booking deleted");
        Ok(booking)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Owner edit of a task. Existing bookings keep their slot and price.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Authorization`] if `actor` is not the owner,
    /// [`BookingError::Validation`] for an empty or invalid edit, or a store error.
    pub async fn update_task(
        &self,
        task_id: &TaskId,
        actor: &UserId,
        update: &TaskUpdate,
    ) -> Result<Task> {
        if update.is_empty() {
            return Err(BookingError::validation("task update changes nothing"));
        }
        let task = self.load_task(task_id).await?;
        if task.owner_id() != actor {
            return Err(BookingError::Authorization {
                actor: actor.to_string(),
                action: format!("edit task {task_id}"),
            });
        }
        let updated = self
            .bounded("update_task", self.tasks.update_task(task_id, update))
            .await?;
        self.index.observe(&updated);
        info!(%task_id, %actor, "task updated");
        Ok(updated)
    }

    // ========================================================================
    // Caller-scoped variants
    // ========================================================================

    /// Resolve the caller behind `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Unauthorized`] if the identity provider
    /// rejects the request or does not answer in time.
    pub async fn caller(&self, ctx: &RequestContext) -> Result<Caller> {
        let resolved =
            tokio::time::timeout(self.config.identity_timeout(), self.identity.resolve_caller(ctx))
                .await
                .map_err(|_| BookingError::Unauthorized {
                    reason: "identity provider timed out".to_string(),
                })?;
        resolved.inspect_err(|e| {
            warn!(request_id = ctx.request_id.as_deref().unwrap_or("-"), error = %e, "caller rejected");
        })
    }

    /// [`create_booking`](Self::create_booking) on behalf of the resolved caller.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Authorization`] if the request names a
    /// different booker than the caller, or any `create_booking` error.
    pub async fn create_booking_as(
        &self,
        ctx: &RequestContext,
        mut request: CreateBookingRequest,
    ) -> Result<Booking> {
        let caller = self.caller(ctx).await?;
        if !request.booker_id.is_blank() && request.booker_id != caller.user_id {
            return Err(BookingError::Authorization {
                actor: caller.user_id.to_string(),
                action: format!("book on behalf of {}", request.booker_id),
            });
        }
        request.booker_id = caller.user_id;
        self.create_booking(request).await
    }

    /// [`transition`](Self::transition) by the resolved caller.
    ///
    /// # Errors
    ///
    /// See [`caller`](Self::caller) and [`transition`](Self::transition).
    pub async fn transition_as(
        &self,
        ctx: &RequestContext,
        booking_id: &BookingId,
        action: BookingAction,
    ) -> Result<Booking> {
        let caller = self.caller(ctx).await?;
        self.transition(booking_id, &caller.user_id, action).await
    }

    /// [`get_booking`](Self::get_booking) restricted to participants.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Authorization`] if the caller is not a participant.
    pub async fn get_booking_as(&self, ctx: &RequestContext, booking_id: &BookingId) -> Result<Booking> {
        let caller = self.caller(ctx).await?;
        let booking = self.load_booking(booking_id).await?;
        if booking.party(&caller.user_id).is_none() {
            return Err(BookingError::Authorization {
                actor: caller.user_id.to_string(),
                action: format!("view booking {booking_id}"),
            });
        }
        Ok(booking)
    }

    /// [`list_bookings`](Self::list_bookings) for the resolved caller.
    ///
    /// # Errors
    ///
    /// See [`caller`](Self::caller) and [`list_bookings`](Self::list_bookings).
    pub async fn list_bookings_as(&self, ctx: &RequestContext, role: Role) -> Result<Vec<Booking>> {
        let caller = self.caller(ctx).await?;
        self.list_bookings(&caller.user_id, role).await
    }

    /// [`delete_booking`](Self::delete_booking) by the resolved caller.
    ///
    /// # Errors
    ///
    /// See [`caller`](Self::caller) and [`delete_booking`](Self::delete_booking).
    pub async fn delete_booking_as(
        &self,
        ctx: &RequestContext,
        booking_id: &BookingId,
    ) -> Result<Booking> {
        let caller = self.caller(ctx).await?;
        self.delete_booking(booking_id, &caller.user_id).await
    }

    /// [`update_task`](Self::update_task) by the resolved caller.
    ///
    /// # Errors
    ///
    /// See [`caller`](Self::caller) and [`update_task`](Self::update_task).
    pub async fn update_task_as(
        &self,
        ctx: &RequestContext,
        task_id: &TaskId,
        update: &TaskUpdate,
    ) -> Result<Task> {
        let caller = self.caller(ctx).await?;
        self.update_task(task_id, &caller.user_id, update).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn bounded<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.store_timeout();
        tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            warn!(operation, timeout_ms = self.config.store_timeout_ms, "store call timed out");
            Err(BookingError::store(format!(
                "{operation} timed out after {}ms",
                self.config.store_timeout_ms
            )))
        })
    }

    async fn find_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        self.bounded("get_task", self.tasks.get_task(task_id)).await
    }

    async fn load_task(&self, task_id: &TaskId) -> Result<Task> {
        self.find_task(task_id)
            .await?
            .ok_or_else(|| BookingError::task_not_found(task_id))
    }

    async fn load_booking(&self, booking_id: &BookingId) -> Result<Booking> {
        self.bounded("get_booking", self.store.get_booking(booking_id))
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))
    }

    /// Best-effort copy of the index's view into the task document.
    async fn mirror_slot(&self, task_id: &TaskId, slot: &Slot, state: SlotState) {
        if let Err(e) = self
            .bounded("update_availability", self.tasks.update_availability(task_id, slot, state))
            .await
        {
            warn!(%task_id, %slot, error = %e, "failed to mirror slot state");
        }
    }

    fn booking_lock(&self, booking_id: &BookingId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(booking_id) {
            return Arc::clone(lock);
        }
        if locks.len() >= LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(booking_id.clone()).or_default())
    }
}
