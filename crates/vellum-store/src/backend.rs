//! Persistence backends.
//!
//! | Backend          | Backing               | Identity on read            |
//! |------------------|-----------------------|-----------------------------|
//! | [`MemoryBackend`]  | `DashMap` of `Arc<Value>` | shared unless cloning       |
//! | [`SessionBackend`] | [`SessionStorage`] JSON text | always a fresh parse   |
//! | [`DurableBackend`] | [`SqliteStorage`] JSON text  | always a fresh parse   |
//!
//! A backend is selected once when a store is constructed and held as a
//! trait object; nothing branches on the persistence mode per call.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::config::Persistence;
use crate::error::StoreResult;
use crate::storage::{SessionStorage, SqliteStorage, StorageArea};

/// A state blob as handed out by the store.
///
/// Reads without cloning from the memory backend return the backend's own
/// `Arc`; use `Arc::make_mut` to get a private, mutable copy.
pub type SharedState = Arc<Value>;

/// Get/set/clear of one state blob per store name.
pub trait StateBackend: Send + Sync {
    /// Which persistence mode this backend implements.
    fn persistence(&self) -> Persistence;

    /// Ensure storage for `name` exists. Never clears existing state.
    fn init(&self, name: &str) -> StoreResult<()>;

    /// Current state for `name`.
    ///
    /// With `deep_clone` the result is structurally independent of the
    /// stored value. Without it the memory backend returns its live `Arc`;
    /// string-backed backends always return a fresh deserialization.
    fn get(&self, name: &str, deep_clone: bool) -> StoreResult<Option<SharedState>>;

    /// Replace the state for `name`. `None` stores "no state".
    ///
    /// With `deep_clone` the backend never retains `state`'s allocation if
    /// anyone else still holds it.
    fn set(&self, name: &str, state: Option<SharedState>, deep_clone: bool) -> StoreResult<()>;

    /// Set the state for `name` to `None`.
    fn clear(&self, name: &str) -> StoreResult<()> {
        self.set(name, None, false)
    }

    /// Capture the current state for `name` without copying the value.
    ///
    /// The snapshot is fixed at this call; later writes do not affect it.
    fn snapshot(&self, name: &str) -> StoreResult<StateSnapshot>;

    /// Names with a stored entry, sorted.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// State captured at a point in time, materialised later.
///
/// Memory snapshots hold the stored `Arc`; string snapshots hold the stored
/// JSON text. Either way the deep copy or parse is paid only on
/// [`materialize`](Self::materialize).
#[derive(Debug, Clone, PartialEq)]
pub enum StateSnapshot {
    Live(Option<SharedState>),
    Text(Option<String>),
}

impl StateSnapshot {
    /// A structurally independent copy of the captured state.
    pub fn materialize(&self) -> StoreResult<Option<SharedState>> {
        match self {
            Self::Live(state) => Ok(state
                .as_ref()
                .map(|state| Arc::new(Value::clone(state)))),
            Self::Text(None) => Ok(None),
            Self::Text(Some(text)) => {
                let value: Value = serde_json::from_str(text)?;
                Ok((!value.is_null()).then(|| Arc::new(value)))
            }
        }
    }
}

fn detach(state: SharedState) -> SharedState {
    // A uniquely owned Arc can be kept as is; otherwise copy the value out.
    match Arc::try_unwrap(state) {
        Ok(value) => Arc::new(value),
        Err(shared) => Arc::new(Value::clone(&shared)),
    }
}

// ── memory ───────────────────────────────────────────────────────────

/// Process-wide in-memory state, keyed by store name.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Option<SharedState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn persistence(&self) -> Persistence {
        Persistence::Memory
    }

    fn init(&self, name: &str) -> StoreResult<()> {
        self.entries.entry(name.to_string()).or_insert_with(|| {
            debug!(name, "memory state slot created");
            None
        });
        Ok(())
    }

    fn get(&self, name: &str, deep_clone: bool) -> StoreResult<Option<SharedState>> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        Ok(entry.value().as_ref().map(|state| {
            if deep_clone {
                Arc::new(Value::clone(state))
            } else {
                Arc::clone(state)
            }
        }))
    }

    fn set(&self, name: &str, state: Option<SharedState>, deep_clone: bool) -> StoreResult<()> {
        let state = if deep_clone { state.map(detach) } else { state };
        self.entries.insert(name.to_string(), state);
        Ok(())
    }

    fn snapshot(&self, name: &str) -> StoreResult<StateSnapshot> {
        self.get(name, false).map(StateSnapshot::Live)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ── string-backed ────────────────────────────────────────────────────

/// A backend that keeps state as JSON text in a [`StorageArea`].
///
/// Setting `None` removes the entry. A missing entry and a stored `null`
/// both read as "no state". Malformed stored text surfaces as
/// [`StoreError::Json`](crate::StoreError::Json).
pub struct JsonBackend<S> {
    persistence: Persistence,
    area: S,
}

/// Session-scoped persistence.
pub type SessionBackend = JsonBackend<SessionStorage>;

/// SQLite-backed persistence.
pub type DurableBackend = JsonBackend<SqliteStorage>;

impl<S: StorageArea> JsonBackend<S> {
    /// Wrap `area`, reporting `persistence` as the backend's mode.
    pub fn new(persistence: Persistence, area: S) -> Self {
        Self { persistence, area }
    }

    /// The underlying string storage.
    pub fn area(&self) -> &S {
        &self.area
    }
}

impl SessionBackend {
    pub fn session() -> Self {
        Self::new(Persistence::Session, SessionStorage::new())
    }
}

impl DurableBackend {
    pub fn durable(storage: SqliteStorage) -> Self {
        Self::new(Persistence::Durable, storage)
    }
}

impl<S: StorageArea> StateBackend for JsonBackend<S> {
    fn persistence(&self) -> Persistence {
        self.persistence
    }

    fn init(&self, _name: &str) -> StoreResult<()> {
        // Entries are created on first write; absence already reads as None.
        Ok(())
    }

    fn get(&self, name: &str, _deep_clone: bool) -> StoreResult<Option<SharedState>> {
        self.snapshot(name)?.materialize()
    }

    fn set(&self, name: &str, state: Option<SharedState>, _deep_clone: bool) -> StoreResult<()> {
        match state {
            Some(state) => self.area.set_item(name, &serde_json::to_string(state.as_ref())?),
            None => self.area.remove_item(name).map(|_| ()),
        }
    }

    fn snapshot(&self, name: &str) -> StoreResult<StateSnapshot> {
        self.area.get_item(name).map(StateSnapshot::Text)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.area.keys()
    }
}

// ── tests ────────────────────────────────────────────────────────────
