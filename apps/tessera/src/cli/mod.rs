//! # Tessera CLI Module
//!
//! ## Available Commands
//!
//! - `run` - Scan an HTML file and drive every component lifecycle
//! - `discover` - List the components a scan would create, without running them
//! - `components` - List the component registry

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tessera_core::TesseraError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tessera - component lifecycles for HTML documents
///
/// Finds `data-component` markers, binds each to a registered component and
/// runs ready, init and enter with batch-wide barriers.
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Print per-component details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a document and run every lifecycle phase
    Run {
        /// HTML input file
        #[arg(short, long)]
        input: PathBuf,

        /// Write the resulting document here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Drop components whose nodes were removed during the run
        #[arg(long)]
        prune: bool,
    },

    /// Dry scan: list discovered components without running phases
    Discover {
        /// HTML input file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List registered components
    Components,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TesseraError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Run {
            input,
            output,
            prune,
        }) => {
            let options = RunOptions {
                output,
                prune,
                json_mode,
                verbose: cli.verbose,
            };
            cmd_run(&config, &input, &options).await
        }
        Some(Commands::Discover { input }) => cmd_discover(&config, &input, json_mode),
        Some(Commands::Components) | None => cmd_components(&config, json_mode),
    }
}
