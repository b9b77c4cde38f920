//! `tmbook` binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tm_cli::cli::Cli;
use tm_cli::commands;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout().lock();
    match runtime.block_on(commands::run(cli, &mut stdout)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_cli::cli::{Commands, Format, RoleArg, TaskCommands};

    #[test]
    fn cli_parses_book() {
        let cli = Cli::parse_from(["tmbook", "book", "task-1", "-s", "2025-06-15,14:00,16:00"]);
        match cli.command {
            Commands::Book(args) => {
                assert_eq!(args.task_id, "task-1");
                assert_eq!(args.slot.time_to, "16:00");
            }
            other => panic!("expected book command, got {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_malformed_slot() {
        assert!(Cli::try_parse_from(["tmbook", "book", "task-1", "-s", "2025-06-15,16:00"]).is_err());
        assert!(Cli::try_parse_from(["tmbook", "book", "task-1", "-s", "2025-06-15,16:00,14:00"]).is_err());
    }

    #[test]
    fn cli_parses_task_create_with_repeated_slots() {
        let cli = Cli::parse_from([
            "tmbook", "task", "create", "piano", "--title", "Piano", "--credits", "10",
            "-s", "2025-06-15,14:00,16:00", "-s", "2025-06-16,09:00,10:00",
        ]);
        match cli.command {
            Commands::Task {
                command: TaskCommands::Create { slots, credits, .. },
            } => {
                assert_eq!(slots.len(), 2);
                assert_eq!(credits, 10);
            }
            other => panic!("expected task create, got {other:?}"),
        }
    }

    #[test]
    fn cli_respects_format_and_role() {
        let cli = Cli::parse_from(["tmbook", "--format", "json", "list", "--role", "owner"]);
        assert_eq!(cli.format, Format::Json);
        assert!(matches!(cli.command, Commands::List { role: RoleArg::Owner }));
    }

    #[test]
    fn cli_parses_rate() {
        let cli = Cli::parse_from(["tmbook", "rate", "bk-1", "5", "--review", "great"]);
        assert!(matches!(cli.command, Commands::Rate { rating: 5, .. }));
    }
}
