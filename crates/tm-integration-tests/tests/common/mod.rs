//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tm_booking::{
    BookingConfig, BookingService, InMemoryBookingStore, InMemoryTaskRepository, Slot,
    StaticIdentityProvider, Task, TaskAuthor, TaskId, UserId,
};

pub type MemoryService =
    BookingService<InMemoryTaskRepository, InMemoryBookingStore, StaticIdentityProvider>;

pub const TASK: &str = "task-math";
pub const PRICE: u64 = 10;

pub fn owner() -> UserId {
    UserId::from("olga")
}

pub fn booker() -> UserId {
    UserId::from("ben")
}

pub fn slot(date: &str, from: &str, to: &str) -> Slot {
    Slot::new(date, from, to).expect("valid slot")
}

pub fn afternoon() -> Slot {
    slot("2025-06-15", "14:00", "16:00")
}

pub fn task_with(id: &str, slots: Vec<Slot>) -> Task {
    Task::new(
        TaskId::from(id),
        "Math tutoring",
        TaskAuthor {
            id: owner(),
            name: "Olga".into(),
            email: "olga@example.com".into(),
        },
        PRICE,
        slots,
    )
    .expect("valid task")
}

pub fn service_with_tasks(tasks: Vec<Task>) -> MemoryService {
    BookingService::new(
        Arc::new(InMemoryTaskRepository::with_tasks(tasks)),
        Arc::new(InMemoryBookingStore::new()),
        Arc::new(StaticIdentityProvider::new()),
        BookingConfig::default(),
    )
}

/// One task offering the 14:00-16:00 slot, and a booker holding 100 credits.
pub fn funded_service() -> MemoryService {
    let service = service_with_tasks(vec![task_with(TASK, vec![afternoon()])]);
    service.escrow().deposit(&booker(), 100).expect("deposit");
    service
}
