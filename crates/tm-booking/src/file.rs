//! JSON-file collaborators for single-process deployments and the CLI.
//!
//! Each adapter keeps its documents in memory and rewrites its snapshot file
//! (`tasks.json`, `bookings.json`) on every mutation. A mutation only becomes
//! visible once its snapshot has been written.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use tm_persist::JsonStore;
use tracing::debug;

use crate::booking::{Booking, BookingFilter, StatusUpdate};
use crate::error::{BookingError, Result};
use crate::ids::{BookingId, TaskId};
use crate::memory::sorted;
use crate::ports::{BookingStore, TaskRepository};
use crate::slot::Slot;
use crate::task::{SlotState, Task, TaskUpdate};

/// A map of documents mirrored to one snapshot file.
#[derive(Debug)]
struct Snapshot<K, V> {
    docs: Mutex<HashMap<K, V>>,
    store: JsonStore,
}

impl<K, V> Snapshot<K, V>
where
    K: std::hash::Hash + Eq + Clone + serde::Serialize + serde::de::DeserializeOwned,
    V: Clone + serde::Serialize + serde::de::DeserializeOwned,
{
    fn open(state_dir: &Path, name: &str) -> Self {
        let store = JsonStore::new(state_dir, name);
        let docs: HashMap<K, V> = store.load();
        debug!(name, count = docs.len(), "loaded snapshot");
        Self {
            docs: Mutex::new(docs),
            store,
        }
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<K, V>) -> T) -> T {
        f(&self.docs.lock())
    }

    /// Run `f` on a copy of the documents; keep the copy only if it both
    /// succeeds and is written to disk.
    fn mutate<T>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> Result<T>) -> Result<T> {
        let mut docs = self.docs.lock();
        let mut next = docs.clone();
        let out = f(&mut next)?;
        self.store.save(&next).map_err(|e| {
            BookingError::store(format!(
                "failed to write {}: {e}",
                self.store.path().display()
            ))
        })?;
        *docs = next;
        Ok(out)
    }
}

/// Task repository persisted to `<state_dir>/tasks.json`.
#[derive(Debug)]
pub struct JsonTaskRepository {
    tasks: Snapshot<TaskId, Task>,
}

impl JsonTaskRepository {
    /// Open the repository, loading any existing tasks.
    #[must_use]
    pub fn open(state_dir: &Path) -> Self {
        Self {
            tasks: Snapshot::open(state_dir, "tasks"),
        }
    }

    /// All tasks, ordered by creation time.
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read(|docs| docs.values().cloned().collect());
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }
}

impl TaskRepository for JsonTaskRepository {
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read(|docs| docs.get(id).cloned()))
    }

    async fn insert_task(&self, task: Task) -> Result<()> {
        task.validate()?;
        self.tasks.mutate(|docs| {
            if docs.contains_key(&task.id) {
                return Err(BookingError::validation(format!("task {} already exists", task.id)));
            }
            docs.insert(task.id.clone(), task);
            Ok(())
        })
    }

    async fn update_availability(&self, id: &TaskId, slot: &Slot, state: SlotState) -> Result<()> {
        self.tasks.mutate(|docs| {
            docs.get_mut(id)
                .ok_or_else(|| BookingError::task_not_found(id))?
                .set_slot_state(slot, state)
        })
    }

    async fn set_bookable(&self, id: &TaskId, bookable: bool) -> Result<()> {
        self.tasks.mutate(|docs| {
            docs.get_mut(id)
                .ok_or_else(|| BookingError::task_not_found(id))?
                .is_bookable = bookable;
            Ok(())
        })
    }

    async fn update_task(&self, id: &TaskId, update: &TaskUpdate) -> Result<Task> {
        self.tasks.mutate(|docs| {
            let task = docs.get_mut(id).ok_or_else(|| BookingError::task_not_found(id))?;
            update.apply(task)?;
            Ok(task.clone())
        })
    }
}

/// Booking store persisted to `<state_dir>/bookings.json`.
#[derive(Debug)]
pub struct JsonBookingStore {
    bookings: Snapshot<BookingId, Booking>,
}

impl JsonBookingStore {
    /// Open the store, loading any existing bookings.
    #[must_use]
    pub fn open(state_dir: &Path) -> Self {
        Self {
            bookings: Snapshot::open(state_dir, "bookings"),
        }
    }
}

impl BookingStore for JsonBookingStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        self.bookings.mutate(|docs| {
            if docs.contains_key(&booking.id) {
                return Err(BookingError::validation(format!(
                    "booking {} already exists",
                    booking.id
                )));
            }
            docs.insert(booking.id.clone(), booking.clone());
            Ok(())
        })
    }

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Booking>> {
        Ok(self.bookings.read(|docs| docs.get(id).cloned()))
    }

    async fn update_booking_status(&self, id: &BookingId, update: &StatusUpdate) -> Result<()> {
        self.bookings.mutate(|docs| {
            let booking = docs
                .get_mut(id)
                .ok_or_else(|| BookingError::booking_not_found(id))?;
            update.apply_to(booking);
            Ok(())
        })
    }

    async fn query_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let matching = self.bookings.read(|docs| {
            docs.values()
                .filter(|booking| filter.matches(booking))
                .cloned()
                .collect()
        });
        Ok(sorted(matching))
    }

    async fn delete_booking(&self, id: &BookingId) -> Result<bool> {
        self.bookings.mutate(|docs| Ok(docs.remove(id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingStatus;
    use crate::ids::UserId;
    use crate::task::TaskAuthor;
    use tempfile::TempDir;

    fn slot() -> Slot {
        Slot::new("2025-06-15", "14:00", "16:00").unwrap()
    }

    fn task() -> Task {
        Task::new(
            TaskId::from("task-1"),
            "Bike repair",
            TaskAuthor {
                id: UserId::from("owner"),
                name: String::new(),
                email: String::new(),
            },
            10,
            vec![slot()],
        )
        .unwrap()
    }

    fn booking() -> Booking {
        Booking::pending(
            BookingId::from("bk-1"),
            TaskId::from("task-1"),
            UserId::from("booker"),
            UserId::from("owner"),
            slot(),
            10,
            1_000,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn tasks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let repo = JsonTaskRepository::open(dir.path());
            repo.insert_task(task()).await.unwrap();
            repo.set_bookable(&"task-1".into(), false).await.unwrap();
        }
        let repo = JsonTaskRepository::open(dir.path());
        let task = repo.get_task(&"task-1".into()).await.unwrap().unwrap();
        assert!(!task.is_bookable);
        assert_eq!(repo.list().len(), 1);
    }

    #[tokio::test]
    async fn bookings_survive_reopen_and_filter() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonBookingStore::open(dir.path());
            store.insert_booking(&booking()).await.unwrap();
            let mut update = StatusUpdate::of(&booking());
            update.status = BookingStatus::Confirmed;
            update.confirmed_at = Some(1_100);
            store
                .update_booking_status(&"bk-1".into(), &update)
                .await
                .unwrap();
        }
        let store = JsonBookingStore::open(dir.path());
        let found = store
            .query_bookings(&BookingFilter::Booker(UserId::from("booker")))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, BookingStatus::Confirmed);
        assert!(
            store
                .query_bookings(&BookingFilter::Booker(UserId::from("owner")))
                .await
                .unwrap()
                .is_empty()
        );

        assert!(store.delete_booking(&"bk-1".into()).await.unwrap());
        assert!(!store.delete_booking(&"bk-1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        // A regular file where the state directory should be makes every save fail.
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, b"").unwrap();

        let store = JsonBookingStore::open(&blocker);
        let err = store.insert_booking(&booking()).await.unwrap_err();
        assert!(matches!(err, BookingError::StoreUnavailable { .. }));
        assert!(store.get_booking(&"bk-1".into()).await.unwrap().is_none());
    }
}
