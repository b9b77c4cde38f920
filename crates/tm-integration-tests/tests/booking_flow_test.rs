//! End-to-end booking lifecycle tests.
//!
//! Walks bookings through create, confirm, cancel, complete and rate, and
//! checks the slot claim and escrow balances at every step.

mod common;

use common::{afternoon, booker, funded_service, owner, service_with_tasks, slot, task_with, PRICE, TASK};
use tm_booking::{
    BookingAction, BookingError, BookingStatus, CreateBookingRequest, Party, Role, SlotState,
    TaskId, TaskUpdate, UserId,
};

fn request() -> CreateBookingRequest {
    CreateBookingRequest::new(TASK, booker(), afternoon())
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn create_pending_booking_claims_slot_and_debits_booker() {
    let service = funded_service();

    let booking = service
        .create_booking(request().with_notes("bring the worksheet"))
        .await
        .expect("create");

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.credits, PRICE);
    assert_eq!(booking.task_owner_id, owner());
    assert_eq!(booking.notes.as_deref(), Some("bring the worksheet"));
    assert_eq!(
        service.index().slot_state(&TaskId::from(TASK), &afternoon()),
        Some(SlotState::Claimed {
            booking_id: booking.id.clone()
        })
    );
    let balance = service.escrow().balance(&booker());
    assert_eq!(balance.available, 90);
    assert_eq!(balance.held, PRICE);
}

#[tokio::test]
async fn owner_cannot_book_own_task() {
    let service = funded_service();
    let err = service
        .create_booking(CreateBookingRequest::new(TASK, owner(), afternoon()))
        .await
        .expect_err("self booking");
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn unadvertised_slot_is_unavailable() {
    let service = funded_service();
    let err = service
        .create_booking(CreateBookingRequest::new(
            TASK,
            booker(),
            slot("2025-06-15", "09:00", "10:00"),
        ))
        .await
        .expect_err("not offered");
    assert!(matches!(err, BookingError::SlotUnavailable { .. }));
    assert_eq!(service.escrow().balance(&booker()).held, 0);
}

#[tokio::test]
async fn closed_task_is_unavailable() {
    let service = funded_service();
    service
        .update_task(
            &TaskId::from(TASK),
            &owner(),
            &TaskUpdate {
                is_bookable: Some(false),
                ..TaskUpdate::default()
            },
        )
        .await
        .expect("close task");

    let err = service.create_booking(request()).await.expect_err("closed");
    assert_eq!(err.status_code(), 409);
}

// ============================================================================
// Confirm / cancel
// ============================================================================

#[tokio::test]
async fn non_owner_cannot_confirm() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");

    for actor in [booker(), UserId::from("mallory")] {
        let err = service
            .transition(&booking.id, &actor, BookingAction::Confirm)
            .await
            .expect_err("not owner");
        assert!(matches!(err, BookingError::Authorization { .. }), "{err}");
    }

    let stored = service.get_booking(&booking.id).await.expect("get");
    assert_eq!(stored.status, BookingStatus::Pending);
    assert!(stored.confirmed_at.is_none());
}

#[tokio::test]
async fn booker_cancels_confirmed_booking() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");
    service
        .transition(&booking.id, &owner(), BookingAction::Confirm)
        .await
        .expect("confirm");

    let cancelled = service
        .transition(&booking.id, &booker(), BookingAction::Cancel)
        .await
        .expect("cancel");

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(Party::Booker));
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(
        service.index().slot_state(&TaskId::from(TASK), &afternoon()),
        Some(SlotState::Open)
    );
    let balance = service.escrow().balance(&booker());
    assert_eq!(balance.available, 100);
    assert_eq!(balance.held, 0);

    let mirrored = service.tasks().peek(&TaskId::from(TASK)).expect("task");
    assert_eq!(mirrored.find_slot(&afternoon()).expect("slot").state, SlotState::Open);
    assert!(mirrored.is_bookable);
}

#[tokio::test]
async fn cancelled_booking_cannot_be_revived() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");
    service
        .transition(&booking.id, &owner(), BookingAction::Cancel)
        .await
        .expect("cancel");

    for action in [BookingAction::Confirm, BookingAction::Cancel, BookingAction::Complete] {
        let err = service
            .transition(&booking.id, &owner(), action)
            .await
            .expect_err("terminal");
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
    }
    assert_eq!(service.escrow().balance(&booker()).available, 100);
}

// ============================================================================
// Complete / rate
// ============================================================================

#[tokio::test]
async fn owner_completes_and_is_paid_once() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");
    service
        .transition(&booking.id, &owner(), BookingAction::Confirm)
        .await
        .expect("confirm");

    let completed = service
        .transition(&booking.id, &owner(), BookingAction::Complete)
        .await
        .expect("complete");
    let completed_at = completed.completed_at.expect("completed_at");
    assert!(completed_at >= completed.confirmed_at.expect("confirmed_at"));
    assert_eq!(service.escrow().balance(&owner()).available, PRICE);
    assert_eq!(service.escrow().balance(&booker()).total(), 100 - PRICE);

    let err = service
        .transition(&booking.id, &owner(), BookingAction::Complete)
        .await
        .expect_err("second complete");
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    assert_eq!(service.escrow().balance(&owner()).available, PRICE);

    let stored = service.get_booking(&booking.id).await.expect("get");
    assert_eq!(stored.completed_at, Some(completed_at));
    assert!(matches!(
        service.index().slot_state(&TaskId::from(TASK), &afternoon()),
        Some(SlotState::Consumed { .. })
    ));
    service.escrow().verify().expect("ledger consistent");
}

#[tokio::test]
async fn task_stays_bookable_while_slots_remain() {
    let morning = slot("2025-06-16", "09:00", "10:00");
    let service = service_with_tasks(vec![task_with(TASK, vec![afternoon(), morning.clone()])]);
    service.escrow().deposit(&booker(), 100).expect("deposit");

    let first = service.create_booking(request()).await.expect("first");
    service
        .transition(&first.id, &owner(), BookingAction::Confirm)
        .await
        .expect("confirm");
    service
        .transition(&first.id, &owner(), BookingAction::Complete)
        .await
        .expect("complete");
    assert!(service.tasks().peek(&TaskId::from(TASK)).expect("task").is_bookable);

    let second = service
        .create_booking(CreateBookingRequest::new(TASK, booker(), morning))
        .await
        .expect("second");
    service
        .transition(&second.id, &owner(), BookingAction::Confirm)
        .await
        .expect("confirm");
    service
        .transition(&second.id, &booker(), BookingAction::Complete)
        .await
        .expect("complete");
    assert!(!service.tasks().peek(&TaskId::from(TASK)).expect("task").is_bookable);
}

#[tokio::test]
async fn booker_rates_completed_booking_once() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");
    service
        .transition(&booking.id, &owner(), BookingAction::Confirm)
        .await
        .expect("confirm");
    service
        .transition(&booking.id, &owner(), BookingAction::Complete)
        .await
        .expect("complete");

    let err = service
        .rate(&booking.id, &owner(), 5, None)
        .await
        .expect_err("owner rating");
    assert!(matches!(err, BookingError::Authorization { .. }));

    let rated = service
        .rate(&booking.id, &booker(), 4, Some("patient and clear".into()))
        .await
        .expect("rate");
    assert_eq!(rated.rating, Some(4));
    assert_eq!(rated.status, BookingStatus::Completed);

    let err = service
        .rate(&booking.id, &booker(), 5, None)
        .await
        .expect_err("second rating");
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    let stored = service.get_booking(&booking.id).await.expect("get");
    assert_eq!(stored.rating, Some(4));
    assert_eq!(stored.review.as_deref(), Some("patient and clear"));
}

// ============================================================================
// Listing, deletion, task edits
// ============================================================================

#[tokio::test]
async fn list_by_role() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");

    let as_booker = service.list_bookings(&booker(), Role::Booker).await.expect("list");
    let as_owner = service.list_bookings(&owner(), Role::Owner).await.expect("list");
    assert_eq!(as_booker.len(), 1);
    assert_eq!(as_owner[0].id, booking.id);
    assert!(
        service
            .list_bookings(&booker(), Role::Owner)
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn deleting_live_booking_frees_slot() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");

    let removed = service
        .delete_booking(&booking.id, &owner())
        .await
        .expect("delete");
    assert_eq!(removed.cancelled_by, Some(Party::Owner));
    assert_eq!(service.escrow().balance(&booker()).available, 100);

    service.create_booking(request()).await.expect("slot free again");
}

#[tokio::test]
async fn price_edit_does_not_touch_existing_booking() {
    let service = funded_service();
    let booking = service.create_booking(request()).await.expect("create");

    service
        .update_task(
            &TaskId::from(TASK),
            &owner(),
            &TaskUpdate {
                credits: Some(99),
                ..TaskUpdate::default()
            },
        )
        .await
        .expect("edit price");

    service
        .transition(&booking.id, &owner(), BookingAction::Confirm)
        .await
        .expect("confirm");
    let completed = service
        .transition(&booking.id, &owner(), BookingAction::Complete)
        .await
        .expect("complete");
    assert_eq!(completed.credits, PRICE);
    assert_eq!(service.escrow().balance(&owner()).available, PRICE);
}

#[tokio::test]
async fn added_slot_becomes_bookable() {
    let service = funded_service();
    let evening = slot("2025-06-15", "18:00", "19:00");
    let err = service
        .create_booking(CreateBookingRequest::new(TASK, booker(), evening.clone()))
        .await
        .expect_err("not yet offered");
    assert!(matches!(err, BookingError::SlotUnavailable { .. }));

    service
        .update_task(
            &TaskId::from(TASK),
            &owner(),
            &TaskUpdate {
                add_slots: vec![evening.clone()],
                ..TaskUpdate::default()
            },
        )
        .await
        .expect("add slot");
    service
        .create_booking(CreateBookingRequest::new(TASK, booker(), evening))
        .await
        .expect("now offered");
}
