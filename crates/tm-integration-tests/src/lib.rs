//! Integration test crate for the TradeMinutes booking core.
//!
//! This crate exists solely to run tests that span the booking core, its
//! storage adapters and the JWT identity provider. It has no public API.

#![forbid(unsafe_code)]
