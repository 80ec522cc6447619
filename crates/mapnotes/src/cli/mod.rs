//! Command-line interface for mapnotes.
//!
//! This module provides the CLI structure for the `mapnotes` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BuildConfigCommand, ConfigCommand, InitCommand, ListCommand, OutputFormat, ServeCommand,
};

/// mapnotes - Collect map annotations into a spreadsheet-style store
///
/// Serves the read and write endpoints used by the map front-end and
/// generates the front-end's config file.
#[derive(Debug, Parser)]
#[command(name = "mapnotes")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeCommand),

    /// Print the stored records
    List(ListCommand),

    /// Generate the front-end config from its template
    BuildConfig(BuildConfigCommand),

    /// Create the database and sheet with a styled header row
    Init(InitCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
