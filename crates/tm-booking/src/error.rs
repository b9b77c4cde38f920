//! Error types for tm-booking.

use thiserror::Error;

/// Result type alias for booking operations.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Errors that can occur in booking operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// Malformed or missing input. Never retried.
    #[error("validation failed: {reason}")]
    Validation {
        /// What was wrong with the input.
        reason: String,
    },

    /// The caller could not be identified.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Why identification failed.
        reason: String,
    },

    /// The caller is identified but may not perform this action.
    #[error("user {actor} is not allowed to {action}")]
    Authorization {
        /// The acting user.
        actor: String,
        /// The attempted action.
        action: String,
    },

    /// The requested slot cannot be claimed.
    #[error("slot unavailable on task {task_id}: {reason}")]
    SlotUnavailable {
        /// Task the slot belongs to.
        task_id: String,
        /// Why the claim was refused.
        reason: String,
    },

    /// The booker cannot cover the price.
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        /// Credits required.
        required: u64,
        /// Credits currently available.
        available: u64,
    },

    /// The booking state machine does not allow this action.
    #[error("invalid transition: cannot {action} a {from} booking")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// The attempted action.
        action: String,
    },

    /// A request with the same idempotency key is still being processed.
    #[error("duplicate request in flight: {key}")]
    DuplicateRequest {
        /// The idempotency key.
        key: String,
    },

    /// Unknown task or booking.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// "task" or "booking".
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The durable store or repository failed or timed out.
    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        /// Underlying failure.
        reason: String,
    },

    /// Escrow ledger is inconsistent with the booking.
    #[error("escrow error: {reason}")]
    Escrow {
        /// Description of the inconsistency.
        reason: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BookingError {
    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a slot-unavailable error.
    pub fn slot_unavailable(task_id: impl ToString, reason: impl Into<String>) -> Self {
        Self::SlotUnavailable {
            task_id: task_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a store-unavailable error.
    pub fn store(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an escrow error.
    pub fn escrow(reason: impl Into<String>) -> Self {
        Self::Escrow {
            reason: reason.into(),
        }
    }

    /// Create a task-not-found error.
    pub fn task_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }

    /// Create a booking-not-found error.
    pub fn booking_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "booking",
            id: id.to_string(),
        }
    }

    /// HTTP status code for the exposed booking contract.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::InsufficientCredits { .. } => 402,
            Self::Authorization { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::SlotUnavailable { .. }
            | Self::InvalidTransition { .. }
            | Self::DuplicateRequest { .. } => 409,
            Self::StoreUnavailable { .. } => 503,
            Self::Escrow { .. } | Self::Config(_) => 500,
        }
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::DuplicateRequest { .. })
    }
}
