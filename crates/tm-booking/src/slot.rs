//! Time slot value type.
//!
//! A [`Slot`] is an opaque calendar window: `date`, `timeFrom` and `timeTo`
//! are kept as the strings the owner entered (e.g. `"2025-06-15"`, `"14:00"`)
//! and compared lexicographically. No timezone conversion happens anywhere in
//! the core, so validation insists on the zero-padded `YYYY-MM-DD` and
//! `HH:MM` forms that sort correctly. `24:00` is accepted as an end time.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};

/// A discrete, non-subdividable bookable window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Calendar date, e.g. `2025-06-15`.
    pub date: String,
    /// Inclusive start, e.g. `14:00`.
    pub time_from: String,
    /// Exclusive end, e.g. `16:00`.
    pub time_to: String,
}

impl Slot {
    /// Create a validated slot.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a field is not in its fixed format or
    /// `time_from >= time_to`.
    pub fn new(
        date: impl Into<String>,
        time_from: impl Into<String>,
        time_to: impl Into<String>,
    ) -> Result<Self> {
        let slot = Self {
            date: date.into(),
            time_from: time_from.into(),
            time_to: time_to.into(),
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Check the slot's own invariants.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a field is blank or malformed, or the
    /// range is empty.
    pub fn validate(&self) -> Result<()> {
        if self.date.trim().is_empty() {
            return Err(BookingError::validation("slot date is required"));
        }
        if self.time_from.trim().is_empty() || self.time_to.trim().is_empty() {
            return Err(BookingError::validation("slot timeFrom and timeTo are required"));
        }
        if self.date.len() != 10 || NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").is_err() {
            return Err(BookingError::validation(format!(
                "slot date '{}' must be YYYY-MM-DD",
                self.date
            )));
        }
        check_time("timeFrom", &self.time_from, false)?;
        check_time("timeTo", &self.time_to, true)?;
        if self.time_from >= self.time_to {
            return Err(BookingError::validation(format!(
                "slot timeFrom {} must be before timeTo {}",
                self.time_from, self.time_to
            )));
        }
        Ok(())
    }

    /// True iff both slots are on the same date and their half-open
    /// `[time_from, time_to)` ranges intersect.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.date == other.date && self.time_from < other.time_to && other.time_from < self.time_to
    }
}

fn check_time(field: &str, value: &str, end_of_day_ok: bool) -> Result<()> {
    let well_formed = value.len() == 5
        && (NaiveTime::parse_from_str(value, "%H:%M").is_ok() || (end_of_day_ok && value == "24:00"));
    if well_formed {
        Ok(())
    } else {
        Err(BookingError::validation(format!(
            "slot {field} '{value}' must be HH:MM"
        )))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.date, self.time_from, self.time_to)
    }
}

impl std::str::FromStr for Slot {
    type Err = BookingError;

    /// Parses `date,timeFrom,timeTo`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(',').map(str::trim);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(date), Some(from), Some(to), None) => Self::new(date, from, to),
            _ => Err(BookingError::validation(format!(
                "expected 'date,timeFrom,timeTo', got '{s}'"
            ))),
        }
    }
}
