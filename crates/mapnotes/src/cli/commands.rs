//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind to (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Build-config command arguments.
#[derive(Debug, Args)]
pub struct BuildConfigCommand {
    /// Template to read (overrides frontend.template_path)
    #[arg(short, long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// File to write (overrides frontend.output_path)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Init command arguments.
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Sheet to create (overrides storage.sheet_name)
    #[arg(short, long)]
    pub sheet: Option<String>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Tabular output
    #[default]
    Table,
    /// The same JSON envelope the read endpoint serves
    Json,
}
