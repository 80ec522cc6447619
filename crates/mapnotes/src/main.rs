//! `mapnotes` - CLI for the map annotation backend
//!
//! Runs the HTTP server, inspects the stored records, and generates the
//! front-end config.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use mapnotes::cli::{
    BuildConfigCommand, Cli, Command, ConfigCommand, InitCommand, ListCommand, OutputFormat,
    ServeCommand,
};
use mapnotes::handler::Envelope;
use mapnotes::record::COLUMNS;
use mapnotes::server::{self, AppState};
use mapnotes::{frontend, init_logging, Config, RecordStore, SheetStore, SqliteGrid};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    // Validation reports on its own file instead of failing on the default one.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        return handle_validate(file.clone().or_else(|| cli.config.clone()));
    }

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Serve(cmd) => handle_serve(config, cmd),
        Command::List(cmd) => handle_list(&config, &cmd),
        Command::BuildConfig(cmd) => handle_build_config(&config, cmd),
        Command::Init(cmd) => handle_init(&config, cmd),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

/// Open the configured sheet, failing if a named sheet does not exist.
fn open_store(config: &Config) -> anyhow::Result<SheetStore<SqliteGrid>> {
    let path = config.database_path();
    let grid = SqliteGrid::open(&path, config.storage.sheet_name.as_deref())
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(with_time_zone(config, SheetStore::new(grid))?)
}

fn with_time_zone(
    config: &Config,
    store: SheetStore<SqliteGrid>,
) -> mapnotes::Result<SheetStore<SqliteGrid>> {
    Ok(store.with_zone(config.time_zone()?))
}

fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let store = open_store(&config)?;
    info!(
        "Serving sheet '{}' from {}",
        store.grid().sheet_name(),
        store.grid().path().display()
    );
    let state = Arc::new(AppState::new(store));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(server::serve(state, &config.server))?;
    Ok(())
}

fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let records = store.list_all()?;

    match cmd.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&Envelope::listing(records))?);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                println!("No records in sheet '{}'.", store.grid().sheet_name());
                return Ok(());
            }
            println!(
                "{:<24} {:<20} {:<12} {:<6} {}",
                "ID", "SHOP", "CATEGORY", "RATING", "SUBMITTED"
            );
            for record in &records {
                println!(
                    "{:<24} {:<20} {:<12} {:<6} {}",
                    record.id(),
                    record.get("shopName").unwrap_or_default(),
                    record.get("category").unwrap_or_default(),
                    record.get("rating").unwrap_or_default(),
                    record.timestamp()
                );
            }
            println!();
            println!("{} record(s)", records.len());
        }
    }
    Ok(())
}

fn handle_build_config(config: &Config, cmd: BuildConfigCommand) -> anyhow::Result<()> {
    let template = cmd
        .template
        .unwrap_or_else(|| config.frontend.template_path.clone());
    let output = cmd
        .output
        .unwrap_or_else(|| config.frontend.output_path.clone());

    let report = frontend::build_config(&template, &output)?;
    if !report.has_script_url {
        warn!("{} is not set, the front-end has no backend URL", frontend::GOOGLE_SCRIPT_URL);
    }
    println!("Wrote {}", report.output.display());
    Ok(())
}

fn handle_init(config: &Config, cmd: InitCommand) -> anyhow::Result<()> {
    let path = config.database_path();
    let sheet = cmd.sheet.or_else(|| config.storage.sheet_name.clone());
    let grid = SqliteGrid::open_or_create(&path, sheet.as_deref())
        .with_context(|| format!("initializing {}", path.display()))?;

    let mut store = with_time_zone(config, SheetStore::new(grid))?;
    let wrote_header = store.ensure_header()?;

    println!("Database: {}", path.display());
    println!("Sheet:    {}", store.grid().sheet_name());
    println!("Sheets:   {}", store.grid().sheet_names()?.join(", "));
    if wrote_header {
        println!("Header row written ({} columns).", COLUMNS.len());
    } else {
        println!("Sheet already has a header row.");
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Address:            {}", config.socket_addr());
                if config.server.cors_origins.is_empty() {
                    println!("  CORS origins:       any");
                } else {
                    println!(
                        "  CORS origins:       {}",
                        config.server.cors_origins.join(", ")
                    );
                }
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!(
                    "  Sheet:              {}",
                    config.storage.sheet_name.as_deref().unwrap_or("(first sheet)")
                );
                println!(
                    "  Time zone:          {}",
                    config.storage.time_zone.as_deref().unwrap_or("(local)")
                );
                println!();
                println!("[Frontend]");
                println!(
                    "  Template:           {}",
                    config.frontend.template_path.display()
                );
                println!("  Output:             {}", config.frontend.output_path.display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            handle_validate(file.clone())?;
        }
    }
    Ok(())
}

fn handle_validate(file: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
    Ok(())
}
