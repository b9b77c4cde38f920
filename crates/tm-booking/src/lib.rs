//! # tm-booking
//!
//! Booking core for the TradeMinutes time-credit marketplace.
//!
//! This crate provides:
//!
//! - [`Slot`] and [`Task`] documents with per-slot claim state
//! - [`AvailabilityIndex`], the authority on which slots are claimed
//! - [`CreditEscrow`], holding a booker's credits until settlement or release
//! - [`Booking`] and its guarded state machine
//! - [`BookingService`], which ties them together over the collaborator
//!   traits in [`ports`]
//!
//! In-memory and JSON-file collaborators live in [`memory`] and [`file`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod availability;
pub mod booking;
pub mod config;
pub mod error;
pub mod escrow;
pub mod file;
pub mod ids;
pub mod memory;
pub mod ports;
pub mod service;
pub mod slot;
pub mod task;

pub use availability::{AvailabilityIndex, ClaimToken};
pub use booking::{
    Booking, BookingAction, BookingFilter, BookingStatus, Effect, Party, Role, StatusUpdate,
    Transition,
};
pub use config::BookingConfig;
pub use error::{BookingError, Result};
pub use escrow::{Balance, CreditEscrow, Hold, HoldState};
pub use file::{JsonBookingStore, JsonTaskRepository};
pub use ids::{BookingId, TaskId, UserId};
pub use memory::{InMemoryBookingStore, InMemoryTaskRepository, StaticIdentityProvider};
pub use ports::{BookingStore, Caller, IdentityProvider, RequestContext, TaskRepository};
pub use service::{BookingService, CreateBookingRequest};
pub use slot::Slot;
pub use task::{AvailabilitySlot, SlotState, Task, TaskAuthor, TaskStatus, TaskUpdate};
