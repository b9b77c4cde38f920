//! Property tests over random operation sequences.
//!
//! Whatever mix of bookings, transitions and injected store failures runs,
//! credits are conserved, every held credit belongs to a live booking, and
//! every claimed slot belongs to a pending or confirmed booking.

mod common;

use common::{owner, service_with_tasks, slot, task_with, MemoryService, TASK};
use proptest::prelude::*;
use tm_booking::{BookingAction, BookingStatus, CreateBookingRequest, Role, SlotState, TaskId, UserId};

const BOOKERS: [&str; 3] = ["ana", "bo", "cy"];
const FUNDS: u64 = 30;

#[derive(Debug, Clone)]
enum Op {
    Book { booker: usize, slot: usize },
    Confirm(usize),
    Cancel { booking: usize, by_owner: bool },
    Complete(usize),
    StoreDown(bool),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..BOOKERS.len(), 0..4usize).prop_map(|(booker, slot)| Op::Book { booker, slot }),
        2 => (0..8usize).prop_map(Op::Confirm),
        2 => (0..8usize, any::<bool>()).prop_map(|(booking, by_owner)| Op::Cancel { booking, by_owner }),
        2 => (0..8usize).prop_map(Op::Complete),
        1 => any::<bool>().prop_map(Op::StoreDown),
    ]
}

fn slots() -> Vec<tm_booking::Slot> {
    vec![
        slot("2025-06-15", "09:00", "10:00"),
        slot("2025-06-15", "10:00", "11:00"),
        slot("2025-06-15", "10:30", "11:30"),
        slot("2025-06-16", "09:00", "10:00"),
    ]
}

fn service() -> MemoryService {
    let service = service_with_tasks(vec![task_with(TASK, slots())]);
    for name in BOOKERS {
        service.escrow().deposit(&UserId::from(name), FUNDS).expect("deposit");
    }
    service
}

async fn run(ops: Vec<Op>) {
    let service = service();
    let slots = slots();
    let mut created = Vec::new();

    for op in ops {
        match op {
            Op::Book { booker, slot } => {
                let request = CreateBookingRequest::new(TASK, BOOKERS[booker], slots[slot].clone());
                if let Ok(booking) = service.create_booking(request).await {
                    created.push(booking);
                }
            }
            Op::Confirm(i) => {
                if let Some(b) = created.get(i) {
                    let _ = service.transition(&b.id, &owner(), BookingAction::Confirm).await;
                }
            }
            Op::Cancel { booking, by_owner } => {
                if let Some(b) = created.get(booking) {
                    let actor = if by_owner { owner() } else { b.booker_id.clone() };
                    let _ = service.transition(&b.id, &actor, BookingAction::Cancel).await;
                }
            }
            Op::Complete(i) => {
                if let Some(b) = created.get(i) {
                    let _ = service.transition(&b.id, &owner(), BookingAction::Complete).await;
                }
            }
            Op::StoreDown(down) => service.store().set_unavailable(down),
        }
    }
    service.store().set_unavailable(false);

    service.escrow().verify().expect("held buckets match holds");

    let total: u64 = BOOKERS
        .iter()
        .map(|name| service.escrow().balance(&UserId::from(*name)).total())
        .sum::<u64>()
        + service.escrow().balance(&owner()).total();
    assert_eq!(total, FUNDS * BOOKERS.len() as u64, "credits conserved");

    let stored = service
        .list_bookings(&owner(), Role::Owner)
        .await
        .expect("list");
    let paid: u64 = stored
        .iter()
        .filter(|b| b.status == BookingStatus::Completed)
        .map(|b| b.credits)
        .sum();
    assert_eq!(service.escrow().balance(&owner()).available, paid);

    for booking in &stored {
        let live = matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed);
        let hold = service.escrow().hold_for(&booking.booker_id, &booking.id);
        assert_eq!(hold.is_some(), live, "hold for {} ({})", booking.id, booking.status);
    }

    let task_id = TaskId::from(TASK);
    for s in &slots {
        if let Some(SlotState::Claimed { booking_id }) = service.index().slot_state(&task_id, s) {
            let owner_of_claim = stored.iter().find(|b| b.id == booking_id).expect("claim has booking");
            assert!(!owner_of_claim.status.is_terminal());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_operation_sequences_keep_ledger_consistent(ops in prop::collection::vec(op(), 1..40)) {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime")
            .block_on(run(ops));
    }
}
