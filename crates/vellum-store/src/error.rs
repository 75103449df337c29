//! Error types for the vellum-store crate.
//!
//! All store operations return [`StoreError`] via [`StoreResult`].
//! Configuration and type errors are raised synchronously to the caller;
//! storage read/parse failures are never masked.

use serde_json::Value;
use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store configuration is unusable (empty name, unknown persistence
    /// mode, unreadable config file).
    #[error("store configuration error: {0}")]
    Config(String),

    /// `set_state` / `reset_state` received something other than an object.
    #[error("state must be an object or a function returning an object, got {found}")]
    InvalidStateType { found: &'static str },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// Filesystem access failed (database directory, config file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A shared connection lock was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Build an [`StoreError::InvalidStateType`] describing `value`.
    pub(crate) fn invalid_state(value: &Value) -> Self {
        Self::InvalidStateType {
            found: json_type_name(value),
        }
    }
}

/// Human-readable JSON type name, used in type error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
