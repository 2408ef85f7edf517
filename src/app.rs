//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to appropriate command handlers.

use crate::commands;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

/// An interactive assessment-module session player
#[derive(Parser)]
#[command(name = "tessio")]
#[command(version)]
#[command(about = "Interactive assessment-module session player")]
#[command(
    long_about = "Runs test modules as interactive sessions: multiple-choice and fill-in\n\
        questions, timed writing with expiry warnings, and recorded speaking\n\
        sequences with upload and manual retry.\n\n\
        EXAMPLES:\n    \
        # Run a module attempt\n    \
        $ tessio run module.json\n    \n    \
        # Inspect the step plan without starting an attempt\n    \
        $ tessio steps module.json\n    \n    \
        # Validate a module definition and its asset references\n    \
        $ tessio check module.json\n    \n    \
        # Edit configuration file\n    \
        $ tessio config"
)]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/tessio/tessio.toml\n    Logs:               ~/.local/state/tessio/tessio.log.*"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive attempt of a module definition
    ///
    /// Reads commands from stdin: next/back to navigate, answer/text/fill/order
    /// to respond, dismiss to leave instruction screens, retry after a failed
    /// upload, volume to adjust playback, quit to abandon.
    #[command(visible_alias = "r")]
    Run {
        /// Path to the module definition JSON
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the flattened step plan of a module definition
    ///
    /// Shows each navigation step with its bundle variant and the question
    /// numbering the candidate will see.
    #[command(visible_alias = "s")]
    Steps {
        /// Path to the module definition JSON
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Validate a module definition without starting an attempt
    ///
    /// Checks structural invariants (unique ids, non-empty bundles) and
    /// reports asset references that do not resolve.
    Check {
        /// Path to the module definition JSON
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Open configuration file in your preferred editor
    ///
    /// Edit playback, capture, upload and writing settings.
    /// Uses $EDITOR environment variable or falls back to nano/vim.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio input devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// the correct input device in tessio.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    /// Useful for troubleshooting issues.
    Logs,

    /// Generate shell completion script
    ///
    /// Generate completion script for your shell. Save the output to your
    /// shell's completion directory or source it directly.
    ///
    /// Examples:
    ///   tessio completions bash > tessio.bash
    ///   tessio completions zsh > _tessio
    ///   tessio completions fish > tessio.fish
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the main application based on command-line arguments.
///
/// # Exit Codes
/// - 0: Success
/// - 1: General error
/// - 2: Usage error (invalid arguments)
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Handle commands that don't need logging setup
    match &cli.command {
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "tessio", &mut io::stdout());
            return Ok(());
        }
        Commands::ListDevices => {
            return match commands::handle_list_devices() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        Commands::Logs => {
            return match commands::handle_logs() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        _ => {}
    }

    // Initialize logging for all other commands
    logging::init_logging()?;

    match cli.command {
        Commands::Run { file } => {
            commands::handle_run(file).await?;
        }
        Commands::Steps { file } => {
            commands::handle_steps(file)?;
        }
        Commands::Check { file } => {
            commands::handle_check(file)?;
        }
        Commands::Config => {
            commands::handle_config()?;
        }
        Commands::Completions { .. } | Commands::ListDevices | Commands::Logs => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}
