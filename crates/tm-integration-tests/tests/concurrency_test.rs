//! Concurrent access tests.
//!
//! Races many requests on a multi-threaded runtime and checks that claims
//! stay exclusive and the escrow ledger balances.

mod common;

use std::sync::Arc;

use common::{afternoon, booker, owner, service_with_tasks, slot, task_with, TASK};
use futures::future::join_all;
use tm_booking::{BookingAction, BookingError, BookingStatus, CreateBookingRequest, UserId};

// ============================================================================
// Same slot
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_for_one_slot_have_one_winner() {
    let service = Arc::new(service_with_tasks(vec![task_with(TASK, vec![afternoon()])]));
    let bookers: Vec<UserId> = (0..16).map(|i| UserId::from(format!("booker-{i}"))).collect();
    for user in &bookers {
        service.escrow().deposit(user, 10).expect("deposit");
    }

    let handles = bookers.iter().cloned().map(|user| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .create_booking(CreateBookingRequest::new(TASK, user, afternoon()))
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].status, BookingStatus::Pending);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, BookingError::SlotUnavailable { .. }), "{err}");
        }
    }

    let held: u64 = bookers.iter().map(|u| service.escrow().balance(u).held).sum();
    assert_eq!(held, 10, "only the winner is debited");
    service.escrow().verify().expect("ledger consistent");
}

// ============================================================================
// Overlapping slots
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_slots_are_mutually_exclusive() {
    let first = slot("2025-06-15", "14:00", "16:00");
    let second = slot("2025-06-15", "15:00", "17:00");
    let service = Arc::new(service_with_tasks(vec![task_with(
        TASK,
        vec![first.clone(), second.clone()],
    )]));
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");
    service.escrow().deposit(&alice, 10).expect("deposit");
    service.escrow().deposit(&bob, 10).expect("deposit");

    for _ in 0..20 {
        let a = {
            let service = Arc::clone(&service);
            let request = CreateBookingRequest::new(TASK, alice.clone(), first.clone());
            tokio::spawn(async move { service.create_booking(request).await })
        };
        let b = {
            let service = Arc::clone(&service);
            let request = CreateBookingRequest::new(TASK, bob.clone(), second.clone());
            tokio::spawn(async move { service.create_booking(request).await })
        };
        let (a, b) = (a.await.expect("join"), b.await.expect("join"));
        assert!(a.is_ok() ^ b.is_ok(), "exactly one overlapping claim wins");

        // Reset for the next round.
        let winner = a.or(b).expect("one winner");
        service
            .transition(&winner.id, &winner.booker_id, BookingAction::Cancel)
            .await
            .expect("cancel");
    }

    assert_eq!(service.escrow().balance(&alice).available, 10);
    assert_eq!(service.escrow().balance(&bob).available, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_slots_all_succeed() {
    let slots: Vec<_> = (8..16)
        .map(|h| slot("2025-06-15", &format!("{h:02}:00"), &format!("{:02}:00", h + 1)))
        .collect();
    let service = Arc::new(service_with_tasks(vec![task_with(TASK, slots.clone())]));
    service.escrow().deposit(&booker(), 1_000).expect("deposit");

    let handles = slots.into_iter().map(|s| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .create_booking(CreateBookingRequest::new(TASK, booker(), s))
                .await
        })
    });
    for joined in join_all(handles).await {
        joined.expect("join").expect("disjoint slot");
    }
    assert_eq!(service.escrow().balance(&booker()).held, 80);
}

// ============================================================================
// Same booking
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancels_release_credits_once() {
    let service = Arc::new(service_with_tasks(vec![task_with(TASK, vec![afternoon()])]));
    service.escrow().deposit(&booker(), 10).expect("deposit");
    let booking = service
        .create_booking(CreateBookingRequest::new(TASK, booker(), afternoon()))
        .await
        .expect("create");

    let handles = [booker(), owner(), booker(), owner()].map(|actor| {
        let service = Arc::clone(&service);
        let id = booking.id.clone();
        tokio::spawn(async move { service.transition(&id, &actor, BookingAction::Cancel).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("join"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BookingError::InvalidTransition { .. }))
    );
    let balance = service.escrow().balance(&booker());
    assert_eq!(balance.available, 10);
    assert_eq!(balance.held, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_completes_pay_owner_once() {
    let service = Arc::new(service_with_tasks(vec![task_with(TASK, vec![afternoon()])]));
    service.escrow().deposit(&booker(), 10).expect("deposit");
    let booking = service
        .create_booking(CreateBookingRequest::new(TASK, booker(), afternoon()))
        .await
        .expect("create");
    service
        .transition(&booking.id, &owner(), BookingAction::Confirm)
        .await
        .expect("confirm");

    let handles = (0..8).map(|i| {
        let service = Arc::clone(&service);
        let id = booking.id.clone();
        let actor = if i % 2 == 0 { owner() } else { booker() };
        tokio::spawn(async move { service.transition(&id, &actor, BookingAction::Complete).await })
    });
    let succeeded = join_all(handles)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(succeeded, 1);
    assert_eq!(service.escrow().balance(&owner()).available, 10);
    service.escrow().verify().expect("ledger consistent");
}
