//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;
use tm_booking::{Booking, SlotState, Task};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl TableDisplay for Booking {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Booking {}", self.id)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Task:         {}", self.task_id)?;
        writeln!(writer, "Slot:         {}", self.timeslot)?;
        writeln!(writer, "Status:       {}", self.status)?;
        writeln!(writer, "Credits:      {}", self.credits)?;
        writeln!(writer, "Booker:       {}", self.booker_id)?;
        writeln!(writer, "Owner:        {}", self.task_owner_id)?;
        writeln!(writer, "Booked at:    {}", self.booked_at)?;
        writeln!(writer, "Confirmed at: {}", or_dash(self.confirmed_at))?;
        writeln!(writer, "Completed at: {}", or_dash(self.completed_at))?;
        if let Some(at) = self.cancelled_at {
            writeln!(writer, "Cancelled at: {at} by {}", or_dash(self.cancelled_by))?;
        }
        if let Some(notes) = &self.notes {
            writeln!(writer, "Notes:        {notes}")?;
        }
        if let Some(rating) = self.rating {
            writeln!(writer, "Rating:       {rating}/5 {}", self.review.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }
}

/// Bookings for listing.
#[derive(Debug, Clone, Serialize)]
pub struct BookingList {
    /// The bookings, oldest first.
    pub bookings: Vec<Booking>,
}

impl TableDisplay for BookingList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.bookings.is_empty() {
            writeln!(writer, "No bookings")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<40}  {:<16}  {:<24}  {:<10}  {:>7}",
            "ID", "TASK", "SLOT", "STATUS", "CREDITS"
        )?;
        writeln!(writer, "{}", "─".repeat(106))?;
        for booking in &self.bookings {
            writeln!(
                writer,
                "{:<40}  {:<16}  {:<24}  {:<10}  {:>7}",
                booking.id,
                booking.task_id,
                booking.timeslot.to_string(),
                booking.status.to_string(),
                booking.credits
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "Total: {} booking(s)", self.bookings.len())?;
        Ok(())
    }
}

fn slot_state_label(state: &SlotState) -> String {
    match state {
        SlotState::Open => "open".to_string(),
        SlotState::Claimed { booking_id } => format!("claimed ({booking_id})"),
        SlotState::Consumed { booking_id } => format!("consumed ({booking_id})"),
    }
}

impl TableDisplay for Task {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Task {}: {}", self.id, self.title)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Owner:     {}", self.author.id)?;
        writeln!(writer, "Credits:   {}", self.credits)?;
        writeln!(writer, "Status:    {}", self.status)?;
        writeln!(writer, "Bookable:  {}", if self.is_bookable { "yes" } else { "no" })?;
        writeln!(writer)?;
        writeln!(writer, "Slots")?;
        for entry in &self.availability {
            writeln!(writer, "  {:<24}  {}", entry.slot.to_string(), slot_state_label(&entry.state))?;
        }
        Ok(())
    }
}

/// Tasks for listing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskList {
    /// The tasks.
    pub tasks: Vec<Task>,
}

impl TableDisplay for TaskList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.tasks.is_empty() {
            writeln!(writer, "No tasks")?;
            return Ok(());
        }
        writeln!(
            writer,
            "{:<16}  {:<28}  {:<12}  {:>7}  {:>5}  {:<8}",
            "ID", "TITLE", "OWNER", "CREDITS", "OPEN", "BOOKABLE"
        )?;
        writeln!(writer, "{}", "─".repeat(86))?;
        for task in &self.tasks {
            writeln!(
                writer,
                "{:<16}  {:<28}  {:<12}  {:>7}  {:>5}  {:<8}",
                task.id,
                truncate(&task.title, 28),
                task.author.id,
                task.credits,
                task.open_slot_count(),
                if task.is_bookable { "yes" } else { "no" }
            )?;
        }
        Ok(())
    }
}

/// A user's credit balance.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    /// User ID.
    pub user: String,
    /// Spendable credits.
    pub available: u64,
    /// Credits held for live bookings.
    pub held: u64,
}

impl TableDisplay for BalanceReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Account {}", self.user)?;
        writeln!(writer, "  Available:  {}", self.available)?;
        writeln!(writer, "  Held:       {}", self.held)?;
        Ok(())
    }
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    /// User the token identifies.
    pub user: String,
    /// The bearer token.
    pub token: String,
}

impl TableDisplay for IssuedToken {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.token)?;
        Ok(())
    }
}

/// Truncate a string to a maximum length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_booking::{BookingId, Slot, TaskId, UserId};

    fn booking() -> Booking {
        Booking::pending(
            BookingId::from("bk-1"),
            TaskId::from("task-1"),
            UserId::from("booker"),
            UserId::from("owner"),
            Slot::new("2025-06-15", "14:00", "16:00").unwrap(),
            10,
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn booking_table_shows_slot_and_status() {
        let mut buf = Vec::new();
        OutputFormat::default().write(&mut buf, &booking()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("2025-06-15 14:00-16:00"));
        assert!(text.contains("pending"));
        assert!(!text.contains("Cancelled at"));
    }

    #[test]
    fn booking_list_json_is_camel_case() {
        let list = BookingList {
            bookings: vec![booking()],
        };
        let mut buf = Vec::new();
        OutputFormat::new(Format::Json).write(&mut buf, &list).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["bookings"][0]["bookerId"], "booker");
    }

    #[test]
    fn empty_list_says_so() {
        let mut buf = Vec::new();
        BookingList { bookings: vec![] }.write_table(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "No bookings\n");
    }

    #[test]
    fn truncate_long_titles() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long task title", 10), "a very ...");
    }
}
