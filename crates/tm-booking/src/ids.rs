//! Identifier newtypes.
//!
//! Identifiers are opaque strings; the core never parses them. New booking
//! identifiers are random UUIDs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from a string.
            #[must_use]
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the ID as a string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True if the identifier is empty or only whitespace.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// A user (booker or task owner).
    UserId
);

string_id!(
    /// A task document.
    TaskId
);

string_id!(
    /// A booking record.
    BookingId
);

// Blank until resolved from the caller.
impl Default for UserId {
    fn default() -> Self {
        Self(String::new())
    }
}

impl BookingId {
    /// Create a new random booking ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("bk-{}", Uuid::new_v4()))
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}
