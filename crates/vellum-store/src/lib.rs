//! # vellum-store
//!
//! Observable, optionally persisted state containers for Vellum.
//!
//! A [`Store`] is identified by its configured name. Every store built with
//! the same name shares one state slot, one history list and one set of six
//! replay-latest change channels, so independently constructed stores see
//! each other's updates.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Store (facade: get / set / clear / reset)   │
//! ├───────────────────────┬──────────────────────┤
//! │  Dispatcher           │  State               │
//! │  6 ReplaySubjects     │  backends + history  │
//! │  per store name       │  per store name      │
//! ├───────────────────────┴──────────────────────┤
//! │  MemoryBackend │ SessionBackend │ Durable    │
//! │  (DashMap)     │ (JSON, DashMap)│ (SQLite)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```
//! use serde_json::json;
//! use vellum_store::{Store, StoreConfig};
//!
//! let store = Store::new(StoreConfig::new("quick-start").with_state_history(true))?;
//! let _sub = store.state_changed().subscribe(|state| println!("{state:?}"));
//!
//! store.set_state(json!({ "theme": "dark" }), "SET_THEME")?;
//! assert_eq!(store.get_state_property("theme")?, Some(json!("dark")));
//! assert_eq!(store.state_history().len(), 1);
//! # Ok::<(), vellum_store::StoreError>(())
//! ```

pub mod backend;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod migration;
pub mod naming;
pub mod state;
pub mod storage;
pub mod store;
pub mod subject;

// ── re-exports ───────────────────────────────────────────────────────

pub use backend::{
    DurableBackend, JsonBackend, MemoryBackend, SessionBackend, SharedState, StateBackend,
    StateSnapshot,
};
pub use config::{Persistence, StoreConfig, load_store_configs, parse_store_configs};
pub use db::Database;
pub use dispatcher::{
    Channels, Dispatcher, NameOnly, PropertiesChanged, PropertiesChangedWithName,
    STATE_CLEAR_ACTION, STATE_RESET_ACTION, StateWithName,
};
pub use error::{StoreError, StoreResult};
pub use naming::resolve_name;
pub use state::{DEFAULT_STORE_PATH, HistoryEntry, STORE_PATH_ENV, State, StateHistory};
pub use storage::{SessionStorage, SqliteStorage, StorageArea};
pub use store::{SetStateOptions, StateChange, Store};
pub use subject::{Observable, ReplaySubject, Subscription};
