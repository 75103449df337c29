//! String key-value storage areas.
//!
//! Session and durable persistence both store one JSON text entry per store
//! name. The [`StorageArea`] trait is that string-level contract; the JSON
//! round trip lives in [`JsonBackend`](crate::backend::JsonBackend).
//!
//! - [`SessionStorage`]: in-process, lives as long as the process.
//! - [`SqliteStorage`]: rows in the `store_state` table, survives restarts.

use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// A string key-value area holding serialized store state.
pub trait StorageArea: Send + Sync {
    /// Stored text for `key`, or `None` if the key was never written.
    fn get_item(&self, key: &str) -> StoreResult<Option<String>>;

    /// Insert or replace the text stored under `key`.
    fn set_item(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete `key`, returning `true` if it existed.
    fn remove_item(&self, key: &str) -> StoreResult<bool>;

    /// All keys currently holding an entry, sorted.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

// ── session ──────────────────────────────────────────────────────────

/// In-process string storage scoped to the running process.
#[derive(Debug, Default)]
pub struct SessionStorage {
    items: DashMap<String, String>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageArea for SessionStorage {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.items.get(key).map(|item| item.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StoreResult<bool> {
        Ok(self.items.remove(key).is_some())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.items.iter().map(|item| item.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

// ── sqlite ───────────────────────────────────────────────────────────

/// Durable string storage over the `store_state` table.
///
/// The database must have been migrated (see [`Database::run_migrations`]).
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Create a storage area backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl StorageArea for SqliteStorage {
    #[instrument(skip(self))]
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        self.db.execute(|conn| {
            let result = conn.query_row(
                "SELECT state FROM store_state WHERE name = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            );
            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    #[instrument(skip(self, value))]
    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.db.execute(|conn| {
            conn.execute(
                "INSERT INTO store_state (name, state, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(name) DO UPDATE SET state = excluded.state, \
                 updated_at = excluded.updated_at",
                rusqlite::params![key, value, chrono::Utc::now().timestamp_millis()],
            )?;
            debug!(name = %key, bytes = value.len(), "durable state written");
            Ok(())
        })
    }

    #[instrument(skip(self))]
    fn remove_item(&self, key: &str) -> StoreResult<bool> {
        self.db.execute(|conn| {
            let deleted = conn.execute(
                "DELETE FROM store_state WHERE name = ?1",
                rusqlite::params![key],
            )?;
            Ok(deleted > 0)
        })
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.db.execute(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM store_state ORDER BY name")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────
