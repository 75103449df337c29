//! CLI entry point for vellum.
//!
//! This binary provides the `vellum` command with subcommands for reading
//! and editing durable stores from outside the application that owns them.

mod cli;
mod helpers;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::info;
use vellum_store::{Database, Persistence, State, Store};

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, parse_json, parse_object, store_config};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing("warn");

    let db = Database::open(&cli.db)
        .with_context(|| format!("failed to open store database {}", cli.db.display()))?;
    State::global()
        .install_durable(db)
        .context("failed to prepare store database")?;
    info!(path = %cli.db.display(), "store database ready");

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Get { name, property } => cmd_get(&name, property.as_deref(), config),
        Commands::Set { name, json, action } => cmd_set(&name, &json, &action, config),
        Commands::Clear { name } => cmd_clear(&name, config),
        Commands::Reset { name, json } => cmd_reset(&name, &json, config),
        Commands::Keys => cmd_keys(),
    }
}

fn open_store(name: &str, config: Option<&Path>) -> Result<Store> {
    let config = store_config(name, config)?;
    Store::new(config).with_context(|| format!("failed to open store `{name}`"))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_get(name: &str, property: Option<&str>, config: Option<&Path>) -> Result<()> {
    let store = open_store(name, config)?;
    let value = match property {
        Some(property) => store.get_state_property(property)?,
        None => store.get_state(false)?.map(|state| state.as_ref().clone()),
    };
    print_json(&value.unwrap_or(Value::Null))
}

fn cmd_set(name: &str, json: &str, action: &str, config: Option<&Path>) -> Result<()> {
    let changes = parse_object(json)?;
    let store = open_store(name, config)?;
    let state = store
        .set_state(changes, action)
        .with_context(|| format!("failed to update store `{name}`"))?;
    print_json(state.as_deref().unwrap_or(&Value::Null))
}

fn cmd_clear(name: &str, config: Option<&Path>) -> Result<()> {
    let store = open_store(name, config)?;
    store
        .clear_state(true)
        .with_context(|| format!("failed to clear store `{name}`"))?;
    info!(name, "store cleared");
    Ok(())
}

fn cmd_reset(name: &str, json: &str, config: Option<&Path>) -> Result<()> {
    let state = parse_json(json)?;
    let store = open_store(name, config)?;
    store
        .reset_state(state, true)
        .with_context(|| format!("failed to reset store `{name}`"))?;
    info!(name, "store reset");
    Ok(())
}

fn cmd_keys() -> Result<()> {
    let names = State::global().backend(Persistence::Durable)?.keys()?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}
