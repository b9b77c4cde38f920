//! Booking entity and its state machine.
//!
//! ```text
//!   (created) ──► pending ──confirm (owner)──► confirmed ──complete (either)──► completed
//!                    │                             │                              │
//!                    └──────cancel (either)────────┴──► cancelled          rate (booker, once)
//! ```
//!
//! [`Booking::plan`] checks an action against the table without touching the
//! booking; [`Booking::apply`] then commits the planned [`Transition`]. Keeping
//! the two apart lets the service stage escrow and index effects between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::ids::{BookingId, TaskId, UserId};
use crate::slot::Slot;

/// Lowest accepted rating.
pub const MIN_RATING: u8 = 1;

/// Highest accepted rating.
pub const MAX_RATING: u8 = 5;

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Reserved, awaiting the owner.
    Pending,
    /// Accepted by the owner.
    Confirmed,
    /// Done; credits paid to the owner. Terminal.
    Completed,
    /// Called off; slot and credits returned. Terminal.
    Cancelled,
}

impl BookingStatus {
    /// Check if the status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// All statuses, in lifecycle order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Pending, Self::Confirmed, Self::Completed, Self::Cancelled]
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Which side of a booking a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    /// The user who reserved the slot.
    Booker,
    /// The task owner.
    Owner,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Booker => write!(f, "booker"),
            Self::Owner => write!(f, "owner"),
        }
    }
}

/// An action requested on an existing booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BookingAction {
    /// Owner accepts a pending booking.
    Confirm,
    /// Either party calls the booking off.
    Cancel,
    /// Either party marks a confirmed booking done.
    Complete,
    /// Booker rates a completed booking.
    Rate {
        /// 1 to 5.
        rating: u8,
        /// Optional free text.
        #[serde(default)]
        review: Option<String>,
    },
}

impl BookingAction {
    /// Short verb used in errors and logs.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Rate { .. } => "rate",
        }
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Side effect a transition has outside the booking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing beyond the status write.
    None,
    /// Return the slot to open and the credits to the booker.
    Release,
    /// Consume the slot and pay the owner.
    Settle,
}

/// A validated, not yet applied, state change.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Transition {
    /// Status before.
    pub from: BookingStatus,
    /// Status after.
    pub to: BookingStatus,
    /// The action that triggered it.
    pub action: BookingAction,
    /// Who acted.
    pub by: Party,
    /// Escrow/index consequence.
    pub effect: Effect,
}

/// A reservation of one slot on one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking ID.
    pub id: BookingId,
    /// The booked task.
    pub task_id: TaskId,
    /// User who booked.
    pub booker_id: UserId,
    /// Task owner at booking time.
    pub task_owner_id: UserId,
    /// Copy of the reserved slot; later task edits do not touch it.
    pub timeslot: Slot,
    /// Current status.
    pub status: BookingStatus,
    /// Price at booking time.
    pub credits: u64,
    /// Unix seconds.
    pub booked_at: i64,
    /// Unix seconds, once confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<i64>,
    /// Unix seconds, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Unix seconds, once cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    /// Who cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<Party>,
    /// Booker's note to the owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// 1 to 5, set once after completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    /// Review text accompanying the rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

impl Booking {
    /// Create a pending booking.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `credits` is zero, the slot is invalid,
    /// or booker and owner are the same user.
    pub fn pending(
        id: BookingId,
        task_id: TaskId,
        booker_id: UserId,
        task_owner_id: UserId,
        timeslot: Slot,
        credits: u64,
        booked_at: i64,
    ) -> Result<Self> {
        if credits == 0 {
            return Err(BookingError::validation("booking credits must be positive"));
        }
        if booker_id == task_owner_id {
            return Err(BookingError::validation("owners cannot book their own task"));
        }
        timeslot.validate()?;
        Ok(Self {
            id,
            task_id,
            booker_id,
            task_owner_id,
            timeslot,
            status: BookingStatus::Pending,
            credits,
            booked_at,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            notes: None,
            rating: None,
            review: None,
        })
    }

    /// Which side `user` is on, if any.
    #[must_use]
    pub fn party(&self, user: &UserId) -> Option<Party> {
        if user == &self.booker_id {
            Some(Party::Booker)
        } else if user == &self.task_owner_id {
            Some(Party::Owner)
        } else {
            None
        }
    }

    /// Check `action` by `actor` against the transition table.
    ///
    /// Checks run in a fixed order: the actor must be a participant, the
    /// action must be legal from the current status, then the role guard
    /// applies. Nothing is modified.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Authorization`] for non-participants or the wrong party
    /// - [`BookingError::InvalidTransition`] for any pair not in the table
    /// - [`BookingError::Validation`] for an out-of-range rating
    pub fn plan(&self, actor: &UserId, action: &BookingAction) -> Result<Transition> {
        let by = self.party(actor).ok_or_else(|| self.forbidden(actor, action))?;

        let (to, effect) = match (self.status, action) {
            (BookingStatus::Pending, BookingAction::Confirm) => (BookingStatus::Confirmed, Effect::None),
            (BookingStatus::Pending | BookingStatus::Confirmed, BookingAction::Cancel) => {
                (BookingStatus::Cancelled, Effect::Release)
            }
            (BookingStatus::Confirmed, BookingAction::Complete) => {
                (BookingStatus::Completed, Effect::Settle)
            }
            (BookingStatus::Completed, BookingAction::Rate { .. }) if self.rating.is_none() => {
                (BookingStatus::Completed, Effect::None)
            }
            _ => {
                return Err(BookingError::InvalidTransition {
                    from: self.status.to_string(),
                    action: action.verb().to_string(),
                });
            }
        };

        match action {
            BookingAction::Confirm if by != Party::Owner => return Err(self.forbidden(actor, action)),
            BookingAction::Rate { rating, .. } => {
                if by != Party::Booker {
                    return Err(self.forbidden(actor, action));
                }
                if !(MIN_RATING..=MAX_RATING).contains(rating) {
                    return Err(BookingError::validation(format!(
                        "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
                    )));
                }
            }
            _ => {}
        }

        Ok(Transition {
            from: self.status,
            to,
            action: action.clone(),
            by,
            effect,
        })
    }

    /// Commit a transition produced by [`plan`](Self::plan) on this booking.
    ///
    /// Timestamps are only ever set once and never move backwards relative to
    /// `booked_at`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidTransition`] if the booking changed
    /// status since the transition was planned.
    pub fn apply(&mut self, transition: &Transition, now: i64) -> Result<()> {
        if transition.from != self.status {
            return Err(BookingError::InvalidTransition {
                from: self.status.to_string(),
                action: transition.action.verb().to_string(),
            });
        }
        let now = now.max(self.booked_at);
        match &transition.action {
            BookingAction::Confirm => {
                self.confirmed_at.get_or_insert(now);
            }
            BookingAction::Cancel => {
                self.cancelled_at.get_or_insert(now);
                self.cancelled_by.get_or_insert(transition.by);
            }
            BookingAction::Complete => {
                let floor = self.confirmed_at.unwrap_or(self.booked_at);
                self.completed_at.get_or_insert(now.max(floor));
            }
            BookingAction::Rate { rating, review } => {
                self.rating.get_or_insert(*rating);
                if self.review.is_none() {
                    self.review.clone_from(review);
                }
            }
        }
        self.status = transition.to;
        Ok(())
    }

    fn forbidden(&self, actor: &UserId, action: &BookingAction) -> BookingError {
        BookingError::Authorization {
            actor: actor.to_string(),
            action: format!("{} booking {}", action.verb(), self.id),
        }
    }
}

/// Which bookings to list for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Bookings on tasks the user owns.
    Owner,
    /// Bookings the user made.
    Booker,
}

impl std::str::FromStr for Role {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "owner" => Ok(Self::Owner),
            "booker" => Ok(Self::Booker),
            _ => Err(BookingError::validation(format!(
                "role must be 'owner' or 'booker', got '{s}'"
            ))),
        }
    }
}

/// Durable-store query filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingFilter {
    /// Bookings on tasks owned by this user.
    Owner(UserId),
    /// Bookings made by this user.
    Booker(UserId),
}

impl BookingFilter {
    /// Build a filter for `user` in `role`.
    #[must_use]
    pub fn new(user: UserId, role: Role) -> Self {
        match role {
            Role::Owner => Self::Owner(user),
            Role::Booker => Self::Booker(user),
        }
    }

    /// Check whether `booking` matches.
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        match self {
            Self::Owner(user) => &booking.task_owner_id == user,
            Self::Booker(user) => &booking.booker_id == user,
        }
    }
}

/// The closed set of fields a status write may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// New status.
    pub status: BookingStatus,
    /// Set once confirmed.
    pub confirmed_at: Option<i64>,
    /// Set once completed.
    pub completed_at: Option<i64>,
    /// Set once cancelled.
    pub cancelled_at: Option<i64>,
    /// Who cancelled.
    pub cancelled_by: Option<Party>,
    /// Rating.
    pub rating: Option<u8>,
    /// Review.
    pub review: Option<String>,
}

impl StatusUpdate {
    /// Capture the mutable fields of `booking`.
    #[must_use]
    pub fn of(booking: &Booking) -> Self {
        Self {
            status: booking.status,
            confirmed_at: booking.confirmed_at,
            completed_at: booking.completed_at,
            cancelled_at: booking.cancelled_at,
            cancelled_by: booking.cancelled_by,
            rating: booking.rating,
            review: booking.review.clone(),
        }
    }

    /// Write these fields onto a stored booking. Fields already set are kept.
    pub fn apply_to(&self, booking: &mut Booking) {
        booking.status = self.status;
        booking.confirmed_at = booking.confirmed_at.or(self.confirmed_at);
        booking.completed_at = booking.completed_at.or(self.completed_at);
        booking.cancelled_at = booking.cancelled_at.or(self.cancelled_at);
        booking.cancelled_by = booking.cancelled_by.or(self.cancelled_by);
        booking.rating = booking.rating.or(self.rating);
        if booking.review.is_none() {
            booking.review.clone_from(&self.review);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn booker() -> UserId {
        UserId::from("booker")
    }

    fn owner() -> UserId {
        UserId::from("owner")
    }

    fn booking_in(status: BookingStatus) -> Booking {
        let mut b = Booking::pending(
            BookingId::from("bk-1"),
            TaskId::from("task-1"),
            booker(),
            owner(),
            Slot::new("2025-06-15", "14:00", "16:00").unwrap(),
            10,
            1_000,
        )
        .unwrap();
        b.status = status;
        b
    }

    fn rate(rating: u8) -> BookingAction {
        BookingAction::Rate {
            rating,
            review: Some("great".into()),
        }
    }

    #[test]
    fn pending_rejects_zero_credits_and_self_booking() {
        let slot = Slot::new("2025-06-15", "14:00", "16:00").unwrap();
        assert!(
            Booking::pending(BookingId::new(), "t".into(), booker(), owner(), slot.clone(), 0, 0)
                .is_err()
        );
        assert!(
            Booking::pending(BookingId::new(), "t".into(), owner(), owner(), slot, 5, 0).is_err()
        );
    }

    #[test_case(BookingStatus::Pending, BookingAction::Confirm, owner(), BookingStatus::Confirmed ; "owner confirms")]
    #[test_case(BookingStatus::Pending, BookingAction::Cancel, booker(), BookingStatus::Cancelled ; "booker cancels pending")]
    #[test_case(BookingStatus::Pending, BookingAction::Cancel, owner(), BookingStatus::Cancelled ; "owner cancels pending")]
    #[test_case(BookingStatus::Confirmed, BookingAction::Cancel, booker(), BookingStatus::Cancelled ; "booker cancels confirmed")]
    #[test_case(BookingStatus::Confirmed, BookingAction::Complete, owner(), BookingStatus::Completed ; "owner completes")]
    #[test_case(BookingStatus::Confirmed, BookingAction::Complete, booker(), BookingStatus::Completed ; "booker completes")]
    #[test_case(BookingStatus::Completed, rate(5), booker(), BookingStatus::Completed ; "booker rates")]
    fn legal_transitions(from: BookingStatus, action: BookingAction, actor: UserId, to: BookingStatus) {
        let booking = booking_in(from);
        let transition = booking.plan(&actor, &action).unwrap();
        assert_eq!(transition.to, to);
    }

    #[test_case(BookingStatus::Pending, BookingAction::Complete ; "complete pending")]
    #[test_case(BookingStatus::Pending, rate(4) ; "rate pending")]
    #[test_case(BookingStatus::Confirmed, BookingAction::Confirm ; "confirm confirmed")]
    #[test_case(BookingStatus::Confirmed, rate(4) ; "rate confirmed")]
    #[test_case(BookingStatus::Completed, BookingAction::Confirm ; "confirm completed")]
    #[test_case(BookingStatus::Completed, BookingAction::Cancel ; "cancel completed")]
    #[test_case(BookingStatus::Completed, BookingAction::Complete ; "complete completed")]
    #[test_case(BookingStatus::Cancelled, BookingAction::Confirm ; "confirm cancelled")]
    #[test_case(BookingStatus::Cancelled, BookingAction::Cancel ; "cancel cancelled")]
    #[test_case(BookingStatus::Cancelled, BookingAction::Complete ; "complete cancelled")]
    #[test_case(BookingStatus::Cancelled, rate(4) ; "rate cancelled")]
    fn unlisted_pairs_are_invalid_for_both_parties(from: BookingStatus, action: BookingAction) {
        let booking = booking_in(from);
        for actor in [booker(), owner()] {
            let err = booking.plan(&actor, &action).unwrap_err();
            assert!(
                matches!(err, BookingError::InvalidTransition { .. }),
                "{from} + {action} by {actor}: {err}"
            );
        }
    }

    #[test]
    fn guard_table_is_total() {
        let actions = [
            BookingAction::Confirm,
            BookingAction::Cancel,
            BookingAction::Complete,
            rate(3),
        ];
        for status in BookingStatus::all() {
            for action in &actions {
                for actor in [booker(), owner()] {
                    let booking = booking_in(status);
                    match booking.plan(&actor, action) {
                        Ok(t) => assert_eq!(t.from, status),
                        Err(
                            BookingError::InvalidTransition { .. }
                            | BookingError::Authorization { .. },
                        ) => {}
                        Err(other) => panic!("{status} + {action}: unexpected {other}"),
                    }
                }
            }
        }
    }

    #[test]
    fn booker_cannot_confirm() {
        let err = booking_in(BookingStatus::Pending)
            .plan(&booker(), &BookingAction::Confirm)
            .unwrap_err();
        assert!(matches!(err, BookingError::Authorization { .. }));
    }

    #[test]
    fn strangers_are_forbidden_everything() {
        let stranger = UserId::from("stranger");
        let booking = booking_in(BookingStatus::Pending);
        for action in [BookingAction::Confirm, BookingAction::Cancel] {
            assert!(matches!(
                booking.plan(&stranger, &action),
                Err(BookingError::Authorization { .. })
            ));
        }
    }

    #[test]
    fn only_booker_rates_once_in_range() {
        let mut booking = booking_in(BookingStatus::Completed);
        assert!(matches!(
            booking.plan(&owner(), &rate(5)),
            Err(BookingError::Authorization { .. })
        ));
        assert!(matches!(
            booking.plan(&booker(), &rate(0)),
            Err(BookingError::Validation { .. })
        ));
        assert!(matches!(
            booking.plan(&booker(), &rate(6)),
            Err(BookingError::Validation { .. })
        ));

        let t = booking.plan(&booker(), &rate(4)).unwrap();
        booking.apply(&t, 2_000).unwrap();
        assert_eq!(booking.rating, Some(4));
        assert_eq!(booking.review.as_deref(), Some("great"));

        assert!(matches!(
            booking.plan(&booker(), &rate(5)),
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn apply_sets_timestamps_once_and_monotonically() {
        let mut booking = booking_in(BookingStatus::Pending);
        let t = booking.plan(&owner(), &BookingAction::Confirm).unwrap();
        booking.apply(&t, 500).unwrap();
        assert_eq!(booking.confirmed_at, Some(1_000), "clamped to booked_at");

        let t = booking.plan(&booker(), &BookingAction::Complete).unwrap();
        booking.apply(&t, 3_000).unwrap();
        assert_eq!(booking.completed_at, Some(3_000));
        assert_eq!(booking.status, BookingStatus::Completed);
        assert!(booking.cancelled_at.is_none());
        assert!(booking.cancelled_by.is_none());
    }

    #[test]
    fn apply_records_canceller() {
        let mut booking = booking_in(BookingStatus::Confirmed);
        let t = booking.plan(&booker(), &BookingAction::Cancel).unwrap();
        assert_eq!(t.effect, Effect::Release);
        booking.apply(&t, 2_000).unwrap();
        assert_eq!(booking.cancelled_by, Some(Party::Booker));
        assert_eq!(booking.cancelled_at, Some(2_000));
    }

    #[test]
    fn stale_transition_rejected() {
        let mut booking = booking_in(BookingStatus::Pending);
        let t = booking.plan(&owner(), &BookingAction::Confirm).unwrap();
        booking.status = BookingStatus::Cancelled;
        assert!(booking.apply(&t, 2_000).is_err());
    }

    #[test]
    fn status_update_never_overwrites_timestamps() {
        let mut stored = booking_in(BookingStatus::Confirmed);
        stored.confirmed_at = Some(1_500);
        let mut update = StatusUpdate::of(&stored);
        update.confirmed_at = Some(9_999);
        update.status = BookingStatus::Completed;
        update.completed_at = Some(2_000);

        update.apply_to(&mut stored);
        assert_eq!(stored.confirmed_at, Some(1_500));
        assert_eq!(stored.completed_at, Some(2_000));
    }

    #[test]
    fn role_parsing_and_filter() {
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert!("admin".parse::<Role>().is_err());

        let booking = booking_in(BookingStatus::Pending);
        assert!(BookingFilter::new(owner(), Role::Owner).matches(&booking));
        assert!(!BookingFilter::new(owner(), Role::Booker).matches(&booking));
    }

    #[test]
    fn booking_json_uses_document_field_names() {
        let json = serde_json::to_value(booking_in(BookingStatus::Pending)).unwrap();
        assert_eq!(json["taskOwnerId"], "owner");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["timeslot"]["timeFrom"], "14:00");
        assert!(json.get("cancelledBy").is_none());
    }
}
