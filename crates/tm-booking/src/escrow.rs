//! Credit escrow.
//!
//! Every account has an `available` and a `held` bucket. Reserving moves
//! credits from available to held, releasing moves them back, and settling
//! moves them from the booker's held bucket into the owner's available bucket.
//!
//! On top of the raw buckets the escrow keeps a per-booking [`Hold`] ledger in
//! the booker's account, so the held bucket always equals the sum of the
//! booker's live holds. A transition stages its effect first
//! ([`begin_release`](CreditEscrow::begin_release) /
//! [`begin_settle`](CreditEscrow::begin_settle)), then either
//! [`commit`](CreditEscrow::commit)s it once the new status is durable or
//! [`abort`](CreditEscrow::abort)s it. Neither step can fail on a consistent
//! ledger, so a failed status write never needs a reversal that could itself
//! fail.
//!
//! Locking is per account. Settlement locks both accounts in user-id order.
//!
//! An escrow opened with a snapshot file serializes its mutations and writes
//! the whole ledger after each one. A refusable mutation (deposit, reserve,
//! release, settle, hold) whose write fails is rolled back and reported as
//! [`BookingError::StoreUnavailable`]. [`commit`](CreditEscrow::commit) and
//! [`drop_hold`](CreditEscrow::drop_hold) follow a step that already happened,
//! so they keep their effect in memory and report the failed write. Staged
//! hold states are not durable: a ledger loaded from disk starts every hold
//! as active.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tm_persist::JsonStore;
use tracing::{debug, error, warn};

use crate::error::{BookingError, Result};
use crate::ids::{BookingId, UserId};

/// Escrow state of a single booking's credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    /// Credits held for a pending or confirmed booking.
    Active,
    /// Cancellation staged; credits still held.
    Releasing,
    /// Returned to the booker.
    Released,
    /// Completion staged; credits still held.
    Settling,
    /// Paid out to the owner.
    Settled,
}

impl HoldState {
    /// Check if the hold is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Settled)
    }

    /// Check if a transition to the target state is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use HoldState::{Active, Released, Releasing, Settled, Settling};

        matches!(
            (self, target),
            (Active, Releasing | Settling)
                | (Releasing | Settling, Active)
                | (Releasing, Released)
                | (Settling, Settled)
        )
    }
}

impl fmt::Display for HoldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Releasing => write!(f, "releasing"),
            Self::Released => write!(f, "released"),
            Self::Settling => write!(f, "settling"),
            Self::Settled => write!(f, "settled"),
        }
    }
}

/// Credits held against one booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Who receives the credits on settlement.
    pub owner: UserId,
    /// Amount held.
    pub amount: u64,
    /// Current state.
    pub state: HoldState,
}

/// Snapshot of an account's buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Spendable credits.
    pub available: u64,
    /// Credits reserved for live bookings.
    pub held: u64,
}

impl Balance {
    /// Available plus held.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.available.saturating_add(self.held)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Account {
    #[serde(flatten)]
    balance: Balance,
    #[serde(default)]
    holds: HashMap<BookingId, Hold>,
}

impl Account {
    fn reserve(&mut self, user: &UserId, amount: u64) -> Result<()> {
        if self.balance.available < amount {
            return Err(BookingError::InsufficientCredits {
                required: amount,
                available: self.balance.available,
            });
        }
        self.balance.available -= amount;
        self.balance.held += amount;
        debug!(%user, amount, available = self.balance.available, "credits reserved");
        Ok(())
    }

    fn release(&mut self, user: &UserId, amount: u64) -> Result<()> {
        if self.balance.held < amount {
            return Err(BookingError::escrow(format!(
                "cannot release {amount} for {user}: only {} held",
                self.balance.held
            )));
        }
        self.balance.held -= amount;
        self.balance.available += amount;
        debug!(%user, amount, available = self.balance.available, "credits released");
        Ok(())
    }

    fn hold_mut(&mut self, booking_id: &BookingId) -> Result<&mut Hold> {
        self.holds
            .get_mut(booking_id)
            .ok_or_else(|| BookingError::escrow(format!("no hold for booking {booking_id}")))
    }

    fn held_by_holds(&self) -> u64 {
        self.holds.values().map(|h| h.amount).sum()
    }
}

fn credit(account: &mut Account, amount: u64) -> Result<()> {
    account.balance.available = account
        .balance
        .available
        .checked_add(amount)
        .ok_or_else(|| BookingError::escrow("balance overflow"))?;
    Ok(())
}

fn move_held(booker: &mut Account, owner: &mut Account, amount: u64) -> Result<()> {
    if booker.balance.held < amount {
        return Err(BookingError::escrow(format!(
            "cannot settle {amount}: only {} held",
            booker.balance.held
        )));
    }
    credit(owner, amount)?;
    booker.balance.held -= amount;
    Ok(())
}

/// In-memory credit ledger with optional JSON snapshots.
#[derive(Debug, Default)]
pub struct CreditEscrow {
    accounts: RwLock<HashMap<UserId, Arc<Mutex<Account>>>>,
    store: Option<JsonStore>,
    write_lock: Mutex<()>,
}

impl CreditEscrow {
    /// Create an empty, memory-only escrow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an escrow that snapshots to `<state_path>/escrow.json`,
    /// loading any existing ledger.
    pub fn open(state_path: &Path) -> Self {
        let store = JsonStore::new(state_path, "escrow");
        let mut loaded: HashMap<UserId, Account> = store.load();
        debug!(count = loaded.len(), "loaded escrow accounts from disk");
        for hold in loaded.values_mut().flat_map(|account| account.holds.values_mut()) {
            if hold.state.can_transition_to(&HoldState::Active) {
                hold.state = HoldState::Active;
            }
        }
        let accounts = loaded
            .into_iter()
            .map(|(user, account)| (user, Arc::new(Mutex::new(account))))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
            store: Some(store),
            write_lock: Mutex::new(()),
        }
    }

    fn account(&self, user: &UserId) -> Arc<Mutex<Account>> {
        if let Some(account) = self.accounts.read().get(user) {
            return Arc::clone(account);
        }
        Arc::clone(self.accounts.write().entry(user.clone()).or_default())
    }

    /// Held for every mutation of a snapshotted ledger.
    fn serialized(&self) -> Option<MutexGuard<'_, ()>> {
        self.store.as_ref().map(|_| self.write_lock.lock())
    }

    // Callers hold `serialized()`.
    fn snapshot(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let state: HashMap<UserId, Account> = self
            .accounts
            .read()
            .iter()
            .map(|(user, account)| (user.clone(), account.lock().clone()))
            .collect();
        store.save(&state).map_err(|e| {
            warn!(path = %store.path().display(), error = %e, "failed to snapshot escrow ledger");
            BookingError::store(format!(
                "failed to write {}: {e}",
                store.path().display()
            ))
        })
    }

    /// Run `op` over `users`' accounts and write the snapshot. If the write
    /// fails those accounts are put back as they were.
    fn persisted<T>(&self, users: &[&UserId], op: impl FnOnce() -> Result<T>) -> Result<T> {
        let Some(_serialized) = self.serialized() else {
            return op();
        };
        let before: Vec<(UserId, Option<Account>)> = {
            let accounts = self.accounts.read();
            users
                .iter()
                .map(|user| {
                    let prior = accounts.get(*user).map(|account| account.lock().clone());
                    ((*user).clone(), prior)
                })
                .collect()
        };
        let out = op()?;
        if let Err(e) = self.snapshot() {
            self.restore(before);
            return Err(e);
        }
        Ok(out)
    }

    fn restore(&self, before: Vec<(UserId, Option<Account>)>) {
        let mut accounts = self.accounts.write();
        for (user, prior) in before {
            match prior {
                Some(prior) => {
                    if let Some(account) = accounts.get(&user) {
                        *account.lock() = prior;
                    }
                }
                None => {
                    accounts.remove(&user);
                }
            }
            debug!(%user, "escrow account rolled back");
        }
    }

    /// Current balance of `user` (zero for unknown users).
    #[must_use]
    pub fn balance(&self, user: &UserId) -> Balance {
        self.accounts
            .read()
            .get(user)
            .map(|account| account.lock().balance)
            .unwrap_or_default()
    }

    /// Add credits to `user`'s available balance.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero amount, an escrow error on
    /// overflow, or [`BookingError::StoreUnavailable`] if the ledger could not
    /// be written; the deposit is undone then.
    pub fn deposit(&self, user: &UserId, amount: u64) -> Result<Balance> {
        if amount == 0 {
            return Err(BookingError::validation("deposit amount must be positive"));
        }
        let balance = self.persisted(&[user], || {
            let account = self.account(user);
            let mut account = account.lock();
            credit(&mut account, amount)?;
            Ok(account.balance)
        })?;
        debug!(%user, amount, available = balance.available, "credits deposited");
        Ok(balance)
    }

    /// Move `amount` from `booker`'s available bucket to held.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InsufficientCredits`] if the available balance
    /// is too small; nothing changes then.
    pub fn reserve(&self, booker: &UserId, amount: u64) -> Result<()> {
        self.persisted(&[booker], || self.account(booker).lock().reserve(booker, amount))
    }

    /// Move `amount` from `booker`'s held bucket back to available.
    ///
    /// # Errors
    ///
    /// Returns an escrow error if less than `amount` is held.
    pub fn release(&self, booker: &UserId, amount: u64) -> Result<()> {
        self.persisted(&[booker], || self.account(booker).lock().release(booker, amount))
    }

    /// Move `amount` from `booker`'s held bucket into `owner`'s available bucket.
    ///
    /// # Errors
    ///
    /// Returns an escrow error if less than `amount` is held.
    pub fn settle(&self, booker: &UserId, owner: &UserId, amount: u64) -> Result<()> {
        self.persisted(&[booker, owner], || {
            self.with_pair(booker, owner, |b, o| move_held(b, o, amount))
        })?;
        debug!(%booker, %owner, amount, "credits settled");
        Ok(())
    }

    // Locks booker and owner in user-id order so concurrent settlements in
    // opposite directions cannot deadlock.
    fn with_pair<T>(
        &self,
        booker: &UserId,
        owner: &UserId,
        f: impl FnOnce(&mut Account, &mut Account) -> Result<T>,
    ) -> Result<T> {
        if booker == owner {
            return Err(BookingError::escrow("booker and owner must differ"));
        }
        let b = self.account(booker);
        let o = self.account(owner);
        if booker < owner {
            let mut bg = b.lock();
            let mut og = o.lock();
            f(&mut *bg, &mut *og)
        } else {
            let mut og = o.lock();
            let mut bg = b.lock();
            f(&mut *bg, &mut *og)
        }
    }

    /// Reserve `amount` for `booking_id` and record an active hold.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InsufficientCredits`] if the booker cannot
    /// cover the amount, an escrow error if the booking already has a hold,
    /// or [`BookingError::StoreUnavailable`] if the ledger could not be
    /// written. Nothing changes on error.
    pub fn hold(
        &self,
        booking_id: &BookingId,
        booker: &UserId,
        owner: &UserId,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Err(BookingError::validation("hold amount must be positive"));
        }
        self.persisted(&[booker], || {
            let account = self.account(booker);
            let mut account = account.lock();
            if account.holds.contains_key(booking_id) {
                return Err(BookingError::escrow(format!(
                    "booking {booking_id} already has a hold"
                )));
            }
            account.reserve(booker, amount)?;
            account.holds.insert(
                booking_id.clone(),
                Hold {
                    owner: owner.clone(),
                    amount,
                    state: HoldState::Active,
                },
            );
            Ok(())
        })
    }

    fn stage(&self, booker: &UserId, booking_id: &BookingId, target: HoldState) -> Result<()> {
        let _serialized = self.serialized();
        let account = self.account(booker);
        let mut account = account.lock();
        let hold = account.hold_mut(booking_id)?;
        if !hold.state.can_transition_to(&target) {
            return Err(BookingError::escrow(format!(
                "hold for booking {booking_id} cannot go from {} to {target}",
                hold.state
            )));
        }
        hold.state = target;
        debug!(%booking_id, state = %target, "hold staged");
        Ok(())
    }

    /// Stage returning a booking's credits to the booker.
    ///
    /// # Errors
    ///
    /// Returns an escrow error if the booking has no active hold.
    pub fn begin_release(&self, booker: &UserId, booking_id: &BookingId) -> Result<()> {
        self.stage(booker, booking_id, HoldState::Releasing)
    }

    /// Stage paying a booking's credits to its owner.
    ///
    /// # Errors
    ///
    /// Returns an escrow error if the booking has no active hold.
    pub fn begin_settle(&self, booker: &UserId, booking_id: &BookingId) -> Result<()> {
        self.stage(booker, booking_id, HoldState::Settling)
    }

    /// Undo a staged release or settlement. A no-op for active holds.
    ///
    /// Staging is never written to disk, so neither is its undo.
    pub fn abort(&self, booker: &UserId, booking_id: &BookingId) {
        let _serialized = self.serialized();
        let account = self.account(booker);
        let mut account = account.lock();
        let Some(hold) = account.holds.get_mut(booking_id) else {
            return;
        };
        if !hold.state.can_transition_to(&HoldState::Active) {
            return;
        }
        debug!(%booking_id, from = %hold.state, "staged hold aborted");
        hold.state = HoldState::Active;
    }

    /// Apply a staged release or settlement and drop the hold.
    ///
    /// Returns the terminal state reached.
    ///
    /// # Errors
    ///
    /// Returns an escrow error if nothing is staged for the booking, or
    /// [`BookingError::StoreUnavailable`] if the ledger could not be written;
    /// the commit still stands in memory then.
    pub fn commit(&self, booker: &UserId, booking_id: &BookingId) -> Result<HoldState> {
        let _serialized = self.serialized();
        let (owner, state) = {
            let account = self.account(booker);
            let mut account = account.lock();
            let hold = account.hold_mut(booking_id)?.clone();
            match hold.state {
                HoldState::Releasing => {
                    account.release(booker, hold.amount)?;
                    account.holds.remove(booking_id);
                    (None, HoldState::Released)
                }
                HoldState::Settling => (Some(hold.owner), HoldState::Settled),
                other => {
                    return Err(BookingError::escrow(format!(
                        "hold for booking {booking_id} is {other}, nothing staged"
                    )));
                }
            }
        };

        if let Some(owner) = owner {
            self.with_pair(booker, &owner, |b, o| {
                let hold = b.hold_mut(booking_id)?.clone();
                move_held(b, o, hold.amount)?;
                b.holds.remove(booking_id);
                Ok(())
            })?;
            debug!(%booking_id, %booker, %owner, "hold settled");
        }

        self.snapshot()?;
        Ok(state)
    }

    /// Release an active hold outright. Used to compensate a reservation
    /// whose booking could not be persisted.
    ///
    /// # Errors
    ///
    /// Returns an escrow error if the booking has no hold, or
    /// [`BookingError::StoreUnavailable`] if the ledger could not be written;
    /// the hold is still gone from memory then.
    pub fn drop_hold(&self, booker: &UserId, booking_id: &BookingId) -> Result<()> {
        let _serialized = self.serialized();
        {
            let account = self.account(booker);
            let mut account = account.lock();
            let amount = account.hold_mut(booking_id)?.amount;
            account.release(booker, amount)?;
            account.holds.remove(booking_id);
        }
        warn!(%booking_id, %booker, "hold dropped");
        self.snapshot()
    }

    /// The live hold for a booking, if any.
    #[must_use]
    pub fn hold_for(&self, booker: &UserId, booking_id: &BookingId) -> Option<Hold> {
        self.accounts
            .read()
            .get(booker)
            .and_then(|account| account.lock().holds.get(booking_id).cloned())
    }

    /// Check that every account's held bucket equals the sum of its holds.
    ///
    /// # Errors
    ///
    /// Returns an escrow error naming the first inconsistent account.
    pub fn verify(&self) -> Result<()> {
        for (user, account) in self.accounts.read().iter() {
            let account = account.lock();
            let expected = account.held_by_holds();
            if account.balance.held != expected {
                error!(%user, held = account.balance.held, expected, "escrow ledger inconsistent");
                return Err(BookingError::escrow(format!(
                    "account {user} holds {} but live holds total {expected}",
                    account.balance.held
                )));
            }
        }
        Ok(())
    }
}
