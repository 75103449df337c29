//! Process-wide state registry.
//!
//! [`State`] owns one backend per persistence mode and one in-memory history
//! list per store name. Entries are created on first use and live for the
//! lifetime of the registry; the [`State::global`] registry lives for the
//! process.
//!
//! History is always kept in memory, even for stores whose state is
//! persisted to session or durable storage.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{DurableBackend, MemoryBackend, SessionBackend, SharedState, StateBackend};
use crate::config::{Persistence, StoreConfig};
use crate::db::Database;
use crate::error::StoreResult;
use crate::naming::resolve_name;
use crate::storage::SqliteStorage;

/// Environment variable naming the durable database file.
pub const STORE_PATH_ENV: &str = "VELLUM_STORE_PATH";

/// Durable database used when [`STORE_PATH_ENV`] is unset.
pub const DEFAULT_STORE_PATH: &str = "data/vellum.db";

// ── history ──────────────────────────────────────────────────────────

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Action name passed to `set_state`.
    pub action: String,
    /// State visible immediately before the change.
    pub begin_state: Option<SharedState>,
    /// State visible immediately after the change.
    pub end_state: Option<SharedState>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        action: impl Into<String>,
        begin_state: Option<SharedState>,
        end_state: Option<SharedState>,
    ) -> Self {
        Self {
            action: action.into(),
            begin_state,
            end_state,
            recorded_at: Utc::now(),
        }
    }
}

/// Live handle to the history list of one store name.
///
/// Every handle for the same name sees the same list; cloning the handle
/// does not copy the entries.
#[derive(Debug, Clone, Default)]
pub struct StateHistory {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl StateHistory {
    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        // Entries are plain data, so a panic mid-push leaves nothing torn.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry.
    pub fn push(&self, entry: HistoryEntry) {
        self.lock().push(entry);
    }

    /// Remove every entry in place.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the current entries, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    /// The most recent entry, if any.
    pub fn last(&self) -> Option<HistoryEntry> {
        self.lock().last().cloned()
    }

    /// Run `f` with mutable access to the list (e.g. to splice it).
    pub fn with_entries_mut<R>(&self, f: impl FnOnce(&mut Vec<HistoryEntry>) -> R) -> R {
        f(&mut self.lock())
    }
}

// ── registry ─────────────────────────────────────────────────────────

/// Backends and history lists shared by every store in a registry.
pub struct State {
    memory: Arc<MemoryBackend>,
    session: Arc<SessionBackend>,
    durable: OnceLock<Arc<DurableBackend>>,
    histories: DashMap<String, StateHistory>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// An isolated registry with empty memory and session storage and no
    /// durable storage installed yet.
    pub fn new() -> Self {
        Self {
            memory: Arc::new(MemoryBackend::new()),
            session: Arc::new(SessionBackend::session()),
            durable: OnceLock::new(),
            histories: DashMap::new(),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        static STATE: OnceLock<Arc<State>> = OnceLock::new();
        Arc::clone(STATE.get_or_init(|| Arc::new(State::new())))
    }

    /// Use `db` for durable persistence.
    ///
    /// Migrations are applied first. Returns `false` (leaving the existing
    /// storage in place) if durable storage was already set up.
    pub fn install_durable(&self, db: Database) -> StoreResult<bool> {
        if self.durable.get().is_some() {
            return Ok(false);
        }
        db.run_migrations()?;
        let backend = Arc::new(DurableBackend::durable(SqliteStorage::new(db)));
        let installed = self.durable.set(backend).is_ok();
        if installed {
            debug!("durable storage installed");
        }
        Ok(installed)
    }

    /// The backend implementing `persistence`.
    ///
    /// Durable storage that was never installed is opened from
    /// [`STORE_PATH_ENV`], falling back to [`DEFAULT_STORE_PATH`].
    pub fn backend(&self, persistence: Persistence) -> StoreResult<Arc<dyn StateBackend>> {
        let backend: Arc<dyn StateBackend> = match persistence {
            Persistence::Memory => self.memory.clone(),
            Persistence::Session => self.session.clone(),
            Persistence::Durable => self.durable()?,
        };
        Ok(backend)
    }

    fn durable(&self) -> StoreResult<Arc<DurableBackend>> {
        if let Some(backend) = self.durable.get() {
            return Ok(Arc::clone(backend));
        }
        let path = std::env::var_os(STORE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
        info!(path = %path.display(), "opening durable state storage");
        let db = Database::open_and_migrate(&path)?;
        let backend = Arc::new(DurableBackend::durable(SqliteStorage::new(db)));
        Ok(Arc::clone(self.durable.get_or_init(|| backend)))
    }

    /// Ensure backend storage exists for `config`'s name.
    pub fn init(&self, config: &StoreConfig) -> StoreResult<()> {
        self.backend(config.persistence)?.init(resolve_name(config))
    }

    /// Whole state for `config`'s name.
    pub fn get(&self, config: &StoreConfig, deep_clone: bool) -> StoreResult<Option<SharedState>> {
        self.backend(config.persistence)?
            .get(resolve_name(config), deep_clone)
    }

    /// One top-level property of the state, `None` if the state or the
    /// property is absent (or `null`).
    pub fn get_property(&self, config: &StoreConfig, property: &str) -> StoreResult<Option<Value>> {
        let state = self.get(config, false)?;
        Ok(property_of(state.as_deref(), property))
    }

    /// Replace the state for `config`'s name.
    pub fn set(
        &self,
        config: &StoreConfig,
        state: Option<SharedState>,
        deep_clone: bool,
    ) -> StoreResult<()> {
        self.backend(config.persistence)?
            .set(resolve_name(config), state, deep_clone)
    }

    /// Set the state for `config`'s name to `None`. History is untouched.
    pub fn clear(&self, config: &StoreConfig) -> StoreResult<()> {
        self.backend(config.persistence)?.clear(resolve_name(config))
    }

    /// The history list for `config`'s name, created empty if absent.
    pub fn history(&self, config: &StoreConfig) -> StateHistory {
        let name = resolve_name(config);
        if let Some(history) = self.histories.get(name) {
            return history.clone();
        }
        self.histories
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Number of history entries recorded for `config`'s name.
    pub fn history_len(&self, config: &StoreConfig) -> usize {
        self.histories
            .get(resolve_name(config))
            .map_or(0, |history| history.len())
    }
}

/// Top-level `property` of `state`, treating JSON `null` as absent.
pub(crate) fn property_of(state: Option<&Value>, property: &str) -> Option<Value> {
    state
        .and_then(|state| state.get(property))
        .filter(|value| !value.is_null())
        .cloned()
}

// ── tests ────────────────────────────────────────────────────────────
