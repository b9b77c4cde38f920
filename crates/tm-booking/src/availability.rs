//! Task availability index.
//!
//! The index is the single authority on which advertised slots are claimed.
//! Each task gets its own [`Mutex`]; every check-and-claim for that task
//! happens inside it, so two overlapping claims can never both succeed while
//! claims on unrelated tasks proceed in parallel.
//!
//! The outer map is only locked long enough to find or create a task's entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{BookingError, Result};
use crate::ids::{BookingId, TaskId};
use crate::slot::Slot;
use crate::task::{SlotState, Task};

/// Proof that a slot was claimed for a booking.
///
/// Returned by [`AvailabilityIndex::try_claim`]; the holder must either turn
/// it into a persisted booking or hand it back through
/// [`AvailabilityIndex::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ClaimToken {
    /// Task the slot belongs to.
    pub task_id: TaskId,
    /// The claimed slot.
    pub slot: Slot,
    /// Booking the claim was made for.
    pub booking_id: BookingId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimKind {
    Claimed,
    Consumed,
}

#[derive(Debug, Clone)]
struct Claim {
    booking_id: BookingId,
    kind: ClaimKind,
}

#[derive(Debug, Default)]
struct TaskSlots {
    advertised: Vec<Slot>,
    claims: HashMap<Slot, Claim>,
}

impl TaskSlots {
    fn seed(task: &Task) -> Self {
        let mut slots = Self::default();
        for entry in &task.availability {
            slots.advertised.push(entry.slot.clone());
            let claim = match &entry.state {
                SlotState::Open => continue,
                SlotState::Claimed { booking_id } => Claim {
                    booking_id: booking_id.clone(),
                    kind: ClaimKind::Claimed,
                },
                SlotState::Consumed { booking_id } => Claim {
                    booking_id: booking_id.clone(),
                    kind: ClaimKind::Consumed,
                },
            };
            slots.claims.insert(entry.slot.clone(), claim);
        }
        slots
    }

    // Slots are only ever appended, so merging can't drop anything.
    fn merge_advertised(&mut self, task: &Task) {
        for entry in &task.availability {
            if !self.advertised.contains(&entry.slot) {
                self.advertised.push(entry.slot.clone());
            }
        }
    }

    fn conflict(&self, slot: &Slot) -> Option<(&Slot, &Claim)> {
        self.claims.iter().find(|(claimed, _)| claimed.overlaps(slot))
    }

    fn open_slots(&self) -> Vec<Slot> {
        self.advertised
            .iter()
            .filter(|slot| self.conflict(slot).is_none())
            .cloned()
            .collect()
    }
}

/// Per-task claim state for all tasks seen by this process.
#[derive(Debug, Default)]
pub struct AvailabilityIndex {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<TaskSlots>>>>,
}

impl AvailabilityIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_for(&self, task: &Task) -> Arc<Mutex<TaskSlots>> {
        if let Some(entry) = self.tasks.read().get(&task.id) {
            return Arc::clone(entry);
        }
        let mut tasks = self.tasks.write();
        Arc::clone(tasks.entry(task.id.clone()).or_insert_with(|| {
            debug!(task_id = %task.id, slots = task.availability.len(), "seeding availability");
            Arc::new(Mutex::new(TaskSlots::seed(task)))
        }))
    }

    fn existing(&self, task_id: &TaskId) -> Option<Arc<Mutex<TaskSlots>>> {
        self.tasks.read().get(task_id).map(Arc::clone)
    }

    /// Make sure `task` is tracked, seeding it from its mirrored slot states
    /// if this index has not seen it yet, and pick up newly offered slots.
    pub fn observe(&self, task: &Task) {
        self.entry_for(task).lock().merge_advertised(task);
    }

    /// Claim `slot` on `task` for `booking_id`.
    ///
    /// The first call for a task seeds its state from the task document's
    /// mirrored slot states.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::SlotUnavailable`] if the task is not bookable,
    /// the slot is not advertised, or it overlaps a claimed or consumed slot.
    pub fn try_claim(&self, task: &Task, slot: &Slot, booking_id: &BookingId) -> Result<ClaimToken> {
        if !task.is_bookable {
            return Err(BookingError::slot_unavailable(&task.id, "task is not bookable"));
        }

        let entry = self.entry_for(task);
        let mut slots = entry.lock();
        slots.merge_advertised(task);

        if !slots.advertised.contains(slot) {
            return Err(BookingError::slot_unavailable(
                &task.id,
                format!("slot {slot} is not offered"),
            ));
        }
        if let Some((claimed, claim)) = slots.conflict(slot) {
            return Err(BookingError::slot_unavailable(
                &task.id,
                format!("slot {slot} overlaps {claimed} held by booking {}", claim.booking_id),
            ));
        }

        slots.claims.insert(
            slot.clone(),
            Claim {
                booking_id: booking_id.clone(),
                kind: ClaimKind::Claimed,
            },
        );
        debug!(task_id = %task.id, %slot, %booking_id, "slot claimed");

        Ok(ClaimToken {
            task_id: task.id.clone(),
            slot: slot.clone(),
            booking_id: booking_id.clone(),
        })
    }

    /// Revert a claim held by `booking_id` back to open.
    ///
    /// Returns `false` if the slot is not claimed by that booking (already
    /// released, consumed, or held by someone else); nothing changes then.
    pub fn release(&self, task_id: &TaskId, slot: &Slot, booking_id: &BookingId) -> bool {
        let Some(entry) = self.existing(task_id) else {
            return false;
        };
        let mut slots = entry.lock();
        let held = slots.claims.get(slot).map(|c| (c.kind, c.booking_id.clone()));
        match held {
            Some((ClaimKind::Claimed, holder)) if &holder == booking_id => {
                slots.claims.remove(slot);
                debug!(%task_id, %slot, %booking_id, "claim released");
                true
            }
            Some((_, holder)) => {
                warn!(
                    %task_id, %slot, %booking_id, %holder,
                    "release ignored: slot not claimed by this booking"
                );
                false
            }
            None => false,
        }
    }

    /// Release using the token returned by [`try_claim`](Self::try_claim).
    pub fn release_token(&self, token: &ClaimToken) -> bool {
        self.release(&token.task_id, &token.slot, &token.booking_id)
    }

    /// Mark a claimed slot as permanently consumed.
    ///
    /// Returns the number of advertised slots still open afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::SlotUnavailable`] if `booking_id` does not hold
    /// a live claim on the slot.
    pub fn finalize(&self, task_id: &TaskId, slot: &Slot, booking_id: &BookingId) -> Result<usize> {
        let entry = self
            .existing(task_id)
            .ok_or_else(|| BookingError::slot_unavailable(task_id, "task has no claims"))?;
        let mut slots = entry.lock();
        match slots.claims.get_mut(slot) {
            Some(claim) if claim.kind == ClaimKind::Claimed && &claim.booking_id == booking_id => {
                claim.kind = ClaimKind::Consumed;
            }
            _ => {
                return Err(BookingError::slot_unavailable(
                    task_id,
                    format!("slot {slot} is not claimed by booking {booking_id}"),
                ));
            }
        }
        let open = slots.open_slots().len();
        debug!(%task_id, %slot, %booking_id, open, "slot consumed");
        Ok(open)
    }

    /// Current state of `slot` on `task_id`, or `None` if the task has never
    /// been seen by this index.
    #[must_use]
    pub fn slot_state(&self, task_id: &TaskId, slot: &Slot) -> Option<SlotState> {
        let entry = self.existing(task_id)?;
        let slots = entry.lock();
        Some(match slots.claims.get(slot) {
            None => SlotState::Open,
            Some(claim) if claim.kind == ClaimKind::Claimed => SlotState::Claimed {
                booking_id: claim.booking_id.clone(),
            },
            Some(claim) => SlotState::Consumed {
                booking_id: claim.booking_id.clone(),
            },
        })
    }

    /// Advertised slots that neither are nor overlap a claim.
    #[must_use]
    pub fn open_slots(&self, task_id: &TaskId) -> Vec<Slot> {
        self.existing(task_id)
            .map(|entry| entry.lock().open_slots())
            .unwrap_or_default()
    }
}
