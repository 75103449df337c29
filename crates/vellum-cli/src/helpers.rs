//! Shared helper functions used across CLI subcommands.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vellum_store::{Persistence, StoreConfig, load_store_configs};

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` overrides the default when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Store configuration
// ---------------------------------------------------------------------------

/// Configuration for the store called `name`.
///
/// Settings come from the `[stores.<name>]` table of `config_path` when one
/// is given and it has that table. Persistence is always durable, since
/// memory and session state do not outlive the process.
pub fn store_config(name: &str, config_path: Option<&Path>) -> Result<StoreConfig> {
    let from_file = match config_path {
        Some(path) => load_store_configs(path)
            .with_context(|| format!("failed to load store config from {}", path.display()))?
            .into_iter()
            .find(|config| config.name == name),
        None => None,
    };

    if from_file.is_some() {
        debug!(name, "using store config from file");
    }

    Ok(from_file
        .unwrap_or_else(|| StoreConfig::new(name))
        .with_persistence(Persistence::Durable))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Parse a command-line JSON argument.
pub fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("invalid JSON: {text}"))
}

/// Parse a command-line argument that must be a JSON object.
pub fn parse_object(text: &str) -> Result<Value> {
    let value = parse_json(text)?;
    if !value.is_object() {
        bail!("expected a JSON object, got: {text}");
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
