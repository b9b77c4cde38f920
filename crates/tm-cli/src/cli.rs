//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tm_booking::Slot;

/// TradeMinutes booking CLI.
#[derive(Parser, Debug, Clone)]
#[command(name = "tmbook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding tasks.json, bookings.json and escrow.json.
    #[arg(long, env = "TM_STATE_DIR", default_value = ".trademinutes")]
    pub state_dir: PathBuf,

    /// TOML config file with optional [booking] and [auth] tables.
    #[arg(short, long, env = "TM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bearer token identifying the caller.
    #[arg(short, long, env = "TM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// HS256 secret used when the config has no [auth] table.
    #[arg(long, env = "TM_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Task management.
    Task {
        /// Task subcommand to execute.
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Credit accounts.
    Account {
        /// Account subcommand to execute.
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Issue a bearer token for a user.
    Token {
        /// User ID to issue for.
        user: String,

        /// Email to embed in the token.
        #[arg(long)]
        email: Option<String>,
    },

    /// Book a slot on a task.
    Book(BookArgs),

    /// Confirm a pending booking (task owner).
    Confirm {
        /// Booking ID.
        id: String,
    },

    /// Cancel a pending or confirmed booking.
    Cancel {
        /// Booking ID.
        id: String,
    },

    /// Mark a confirmed booking completed and pay the owner.
    Complete {
        /// Booking ID.
        id: String,
    },

    /// Rate a completed booking (booker).
    Rate {
        /// Booking ID.
        id: String,

        /// Rating from 1 to 5.
        rating: u8,

        /// Review text.
        #[arg(long)]
        review: Option<String>,
    },

    /// Show one booking.
    Show {
        /// Booking ID.
        id: String,
    },

    /// List your bookings.
    List {
        /// Which side of the bookings to list.
        #[arg(short, long, value_enum, default_value_t = RoleArg::Booker)]
        role: RoleArg,
    },

    /// Delete a booking, cancelling it first if still live.
    Delete {
        /// Booking ID.
        id: String,
    },
}

/// Arguments for the book command.
#[derive(Parser, Debug, Clone)]
pub struct BookArgs {
    /// Task to book.
    pub task_id: String,

    /// Slot as `date,timeFrom,timeTo`.
    #[arg(short, long)]
    pub slot: Slot,

    /// Price you expect to pay; rejected if the task price differs.
    #[arg(long)]
    pub credits: Option<u64>,

    /// Note to the owner.
    #[arg(short, long)]
    pub notes: Option<String>,

    /// Idempotency key for safe retries.
    #[arg(short, long)]
    pub key: Option<String>,
}

/// Task subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommands {
    /// Create a task owned by the caller.
    Create {
        /// Task ID.
        id: String,

        /// Title.
        #[arg(long)]
        title: String,

        /// Price per booking in credits.
        #[arg(long)]
        credits: u64,

        /// Offered slot as `date,timeFrom,timeTo`. Repeatable.
        #[arg(short, long = "slot", required = true)]
        slots: Vec<Slot>,

        /// Where the help happens.
        #[arg(long)]
        location: Option<String>,

        /// Category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Show a task and its slot states.
    Show {
        /// Task ID.
        id: String,
    },

    /// List all tasks.
    List,

    /// Edit a task you own.
    Update {
        /// Task ID.
        id: String,

        /// New title.
        #[arg(long)]
        title: Option<String>,

        /// New price. Existing bookings keep their price.
        #[arg(long)]
        credits: Option<u64>,

        /// Open or close the task for new bookings.
        #[arg(long)]
        bookable: Option<bool>,

        /// Extra slot to offer. Repeatable.
        #[arg(long = "add-slot")]
        add_slots: Vec<Slot>,
    },
}

/// Account subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum AccountCommands {
    /// Add credits to a user's account.
    Deposit {
        /// User ID.
        user: String,

        /// Credits to add.
        amount: u64,
    },

    /// Show a user's balance.
    Balance {
        /// User ID.
        user: String,
    },
}

/// Booking role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Bookings on tasks you own.
    Owner,
    /// Bookings you made.
    Booker,
}

impl From<RoleArg> for tm_booking::Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Owner => Self::Owner,
            RoleArg::Booker => Self::Booker,
        }
    }
}
