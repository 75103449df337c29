//! Schema versioning for the durable state database.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! step in [`STEPS`] moves the schema up by one version inside its own
//! transaction, so a partially applied step never becomes visible.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Schema steps; index `i` upgrades version `i` to `i + 1`.
const STEPS: &[&str] = &["CREATE TABLE store_state (
        name       TEXT PRIMARY KEY,
        state      TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );"];

/// Bring the schema on `conn` up to date.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    let current = current_version(conn)?;
    if current as usize >= STEPS.len() {
        debug!(version = current, "state schema is up to date");
        return Ok(());
    }

    for (index, sql) in STEPS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        let failed = |e: rusqlite::Error| StoreError::Migration {
            version,
            message: e.to_string(),
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", version).map_err(failed)?;
        tx.commit().map_err(failed)?;
        info!(version, "state schema migrated");
    }
    Ok(())
}

/// Schema version recorded in the database, 0 for a fresh file.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);

        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), STEPS.len() as u32);
    }

    #[test]
    fn rerun_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn store_state_columns() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(store_state)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(columns, ["name", "state", "updated_at"]);
    }
}
