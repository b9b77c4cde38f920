//! # tm-cli
//!
//! Command-line front end for the TradeMinutes booking core.
//!
//! State lives in JSON files under `--state-dir`; callers identify
//! themselves with a bearer token (`--token` / `TM_TOKEN`) issued by
//! `tmbook token <user>`.
//!
//! ```text
//! tmbook token alice            # prints a token for alice
//! tmbook account deposit bob 50
//! TM_TOKEN=... tmbook task create piano --title "Piano" --credits 10 -s 2025-06-15,14:00,16:00
//! TM_TOKEN=... tmbook book piano -s 2025-06-15,14:00,16:00
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format};
pub use config::CliConfig;
pub use error::CliError;
pub use output::OutputFormat;
