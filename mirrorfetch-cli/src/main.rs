//! mirrorfetch CLI - Command-line interface
//!
//! Downloads large files from a primary URL with mirror fallback, then
//! optionally verifies and extracts them.

mod commands;
mod error;
mod progress;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use console::style;
use mirrorfetch::logging::{init_logging, LogConfig};

use commands::config::ConfigCommands;
use commands::get::GetArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "mirrorfetch", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a file, optionally verifying and extracting it
    Get(GetArgs),

    /// View or modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default().with_level(log_level(cli.verbose));
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_file(path);
    }
    let _logging = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        }
    };

    let result: Result<(), CliError> = match cli.command {
        Commands::Get(args) => commands::get::run(args),
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}
