//! CLI argument definitions for vellum.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vellum -- inspect and edit durable state stores.
#[derive(Parser)]
#[command(
    name = "vellum",
    version,
    about = "vellum -- inspect and edit durable state stores",
    long_about = "Reads and writes the SQLite-backed stores that Vellum applications \
                  persist with the `durable` persistence mode."
)]
pub struct Cli {
    /// Path to the durable store database.
    #[arg(long, global = true, env = "VELLUM_STORE_PATH", default_value = "data/vellum.db")]
    pub db: PathBuf,

    /// TOML file with `[stores.<name>]` tables (history, logging, label).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the state of a store as JSON.
    Get {
        /// Store name.
        name: String,

        /// Print only this top-level property.
        #[arg(long, short)]
        property: Option<String>,
    },

    /// Merge a JSON object into the state of a store.
    Set {
        /// Store name.
        name: String,

        /// JSON object whose top-level keys replace the stored ones.
        json: String,

        /// Action name recorded for the change.
        #[arg(long, short, default_value = "CLI_SET")]
        action: String,
    },

    /// Clear the state of a store.
    Clear {
        /// Store name.
        name: String,
    },

    /// Replace the state of a store wholesale (no merge).
    Reset {
        /// Store name.
        name: String,

        /// JSON object, or `null`.
        #[arg(default_value = "null")]
        json: String,
    },

    /// List the names of stores holding state.
    Keys,
}
