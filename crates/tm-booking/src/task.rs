//! Task documents as seen by the booking core.
//!
//! The booking core reads tasks from the [`TaskRepository`](crate::ports::TaskRepository)
//! and writes back only two things: per-slot claim state and the
//! `is_bookable` flag. Owner edits go through [`TaskUpdate`], a closed set of
//! mutable fields; identity, authorship and slot state are server-controlled.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::ids::{BookingId, TaskId, UserId};
use crate::slot::Slot;

/// Lifecycle of the task itself (independent of its bookings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Accepting help.
    #[default]
    #[serde(rename = "open")]
    Open,
    /// Someone is helping.
    #[serde(rename = "in progress")]
    InProgress,
    /// Done.
    #[serde(rename = "completed")]
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in progress" | "in-progress" | "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(BookingError::validation(format!("unknown task status: {s}"))),
        }
    }
}

/// Claim state of one advertised slot, mirrored into the task document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    /// Free to book.
    #[default]
    Open,
    /// Held by a pending or confirmed booking.
    Claimed {
        /// Holder of the claim.
        booking_id: BookingId,
    },
    /// Used up by a completed booking. Never reopens.
    Consumed {
        /// The booking that consumed it.
        booking_id: BookingId,
    },
}

impl SlotState {
    /// True for [`SlotState::Open`].
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Booking holding this slot, if any.
    #[must_use]
    pub const fn booking_id(&self) -> Option<&BookingId> {
        match self {
            Self::Open => None,
            Self::Claimed { booking_id } | Self::Consumed { booking_id } => Some(booking_id),
        }
    }
}

/// An advertised slot and its mirrored claim state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    /// The offered window.
    #[serde(flatten)]
    pub slot: Slot,
    /// Claim state as last mirrored by the availability index.
    #[serde(default)]
    pub state: SlotState,
}

impl AvailabilitySlot {
    /// An open slot.
    #[must_use]
    pub fn open(slot: Slot) -> Self {
        Self {
            slot,
            state: SlotState::Open,
        }
    }
}

/// The user who created a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAuthor {
    /// Owner's user ID.
    pub id: UserId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
}

/// A task offering bookable help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task ID.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Where the help happens ("Downtown Library", "Zoom").
    #[serde(default)]
    pub location: String,
    /// "online" or "in-person".
    #[serde(default)]
    pub location_type: String,
    /// Free-form category ("education", "errand").
    #[serde(default)]
    pub category: String,
    /// Price per booking in credits.
    pub credits: u64,
    /// The owner.
    pub author: TaskAuthor,
    /// Offered slots, in the owner's order. Never shrinks.
    #[serde(default)]
    pub availability: Vec<AvailabilitySlot>,
    /// Whether new reservations are accepted.
    pub is_bookable: bool,
    /// Task lifecycle.
    #[serde(default)]
    pub status: TaskStatus,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
}

impl Task {
    /// Create an open, bookable task with the given slots.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the price is zero, a slot is invalid, or
    /// a slot is listed twice.
    pub fn new(
        id: TaskId,
        title: impl Into<String>,
        author: TaskAuthor,
        credits: u64,
        slots: Vec<Slot>,
    ) -> Result<Self> {
        let mut task = Self {
            id,
            title: title.into(),
            description: None,
            location: String::new(),
            location_type: String::new(),
            category: String::new(),
            credits,
            author,
            availability: Vec::new(),
            is_bookable: true,
            status: TaskStatus::Open,
            created_at: Utc::now().timestamp(),
        };
        task.append_slots(slots)?;
        task.validate()?;
        Ok(task)
    }

    /// The owner's user ID.
    #[must_use]
    pub const fn owner_id(&self) -> &UserId {
        &self.author.id
    }

    /// Check the task's invariants.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_blank() {
            return Err(BookingError::validation("task id is required"));
        }
        if self.author.id.is_blank() {
            return Err(BookingError::validation("task author is required"));
        }
        if self.credits == 0 {
            return Err(BookingError::validation("task credits must be positive"));
        }
        for entry in &self.availability {
            entry.slot.validate()?;
        }
        Ok(())
    }

    /// Find the advertised entry equal to `slot`.
    #[must_use]
    pub fn find_slot(&self, slot: &Slot) -> Option<&AvailabilitySlot> {
        self.availability.iter().find(|entry| &entry.slot == slot)
    }

    /// Number of slots still open according to the mirrored state.
    #[must_use]
    pub fn open_slot_count(&self) -> usize {
        self.availability.iter().filter(|e| e.state.is_open()).count()
    }

    /// Set the mirrored state of an advertised slot.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the slot is not advertised.
    pub fn set_slot_state(&mut self, slot: &Slot, state: SlotState) -> Result<()> {
        let entry = self
            .availability
            .iter_mut()
            .find(|entry| &entry.slot == slot)
            .ok_or_else(|| {
                BookingError::validation(format!("slot {slot} is not offered by task {}", self.id))
            })?;
        entry.state = state;
        Ok(())
    }

    fn append_slots(&mut self, slots: Vec<Slot>) -> Result<()> {
        for slot in slots {
            slot.validate()?;
            if self.find_slot(&slot).is_some() {
                return Err(BookingError::validation(format!(
                    "slot {slot} is already offered by task {}",
                    self.id
                )));
            }
            self.availability.push(AvailabilitySlot::open(slot));
        }
        Ok(())
    }
}

/// Owner-editable task fields.
///
/// Anything not listed here (`id`, `author`, `created_at`, slot states) is
/// server-controlled and cannot be overwritten through an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskUpdate {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// New category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// New price. Existing bookings keep the price they were made at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<u64>,
    /// Open or close the task for new reservations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bookable: Option<bool>,
    /// New task status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Extra slots to offer. Existing slots cannot be removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_slots: Vec<Slot>,
}

impl TaskUpdate {
    /// True if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.category.is_none()
            && self.credits.is_none()
            && self.is_bookable.is_none()
            && self.status.is_none()
            && self.add_slots.is_empty()
    }

    /// Apply the update to `task`. On error `task` is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title, a zero price, or an
    /// invalid or duplicate slot.
    pub fn apply(&self, task: &mut Task) -> Result<()> {
        let mut next = task.clone();
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(BookingError::validation("task title cannot be blank"));
            }
            next.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            next.description = Some(description.clone());
        }
        if let Some(location) = &self.location {
            next.location.clone_from(location);
        }
        if let Some(category) = &self.category {
            next.category.clone_from(category);
        }
        if let Some(credits) = self.credits {
            next.credits = credits;
        }
        if let Some(flag) = self.is_bookable {
            next.is_bookable = flag;
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        next.append_slots(self.add_slots.clone())?;
        next.validate()?;
        *task = next;
        Ok(())
    }
}
