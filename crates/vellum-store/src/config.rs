//! Store configuration.
//!
//! A [`StoreConfig`] is created once per [`Store`](crate::Store) and never
//! mutated afterwards. It can be built in code or read from the
//! `[stores.<name>]` tables of a TOML file:
//!
//! ```toml
//! [stores.todos]
//! persistence = "durable"
//! track_state_history = true
//! label = "TodoStore"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

// ── persistence mode ─────────────────────────────────────────────────

/// Where a store's state blob physically lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Process-wide in-memory map; identity preserved unless cloning is
    /// requested.
    #[default]
    Memory,
    /// In-process string storage; every read is a fresh JSON parse.
    Session,
    /// SQLite-backed string storage that survives restarts.
    Durable,
}

impl Persistence {
    /// Canonical lowercase name (`memory`, `session`, `durable`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Session => "session",
            Self::Durable => "durable",
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persistence {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "session" => Ok(Self::Session),
            "durable" => Ok(Self::Durable),
            other => Err(StoreError::Config(format!(
                "unknown persistence `{other}` (expected memory, session or durable)"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Persistence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── store configuration ──────────────────────────────────────────────

/// Settings for one logical store.
///
/// `name` is the sharing key: every [`Store`](crate::Store) built from a
/// config with the same name reads and writes the same state and sees the
/// same notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Sharing key for state, history and channels. Must not be empty.
    pub name: String,
    /// Persistence backend, `memory` unless set.
    pub persistence: Persistence,
    /// Record a [`HistoryEntry`](crate::HistoryEntry) for every `set_state`.
    pub track_state_history: bool,
    /// Emit a diagnostic `tracing` event for every `set_state`.
    pub log_state_changes: bool,
    /// Caller label used in diagnostics, usually the wrapping type's name.
    pub label: Option<String>,
}

impl StoreConfig {
    /// Config for `name` with all other settings at their defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistence: Persistence::default(),
            track_state_history: false,
            log_state_changes: false,
            label: None,
        }
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_state_history(mut self, enabled: bool) -> Self {
        self.track_state_history = enabled;
        self
    }

    pub fn with_change_logging(mut self, enabled: bool) -> Self {
        self.log_state_changes = enabled;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Reject configurations that cannot name a store.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Config("store name must not be empty".into()));
        }
        Ok(())
    }

    /// Read the `[stores.<name>]` table from TOML text.
    ///
    /// A missing table yields the default configuration for `name`.
    pub fn from_toml_str(name: &str, text: &str) -> StoreResult<Self> {
        let mut file = parse_config_file(text)?;
        let config = match file.stores.remove(name) {
            Some(raw) => raw.into_config(name.to_string()),
            None => Self::new(name),
        };
        config.validate()?;
        Ok(config)
    }
}

// ── config files ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    stores: BTreeMap<String, RawStoreConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStoreConfig {
    #[serde(default)]
    persistence: Persistence,
    #[serde(default)]
    track_state_history: bool,
    #[serde(default)]
    log_state_changes: bool,
    label: Option<String>,
}

impl RawStoreConfig {
    fn into_config(self, name: String) -> StoreConfig {
        StoreConfig {
            name,
            persistence: self.persistence,
            track_state_history: self.track_state_history,
            log_state_changes: self.log_state_changes,
            label: self.label,
        }
    }
}

fn parse_config_file(text: &str) -> StoreResult<ConfigFile> {
    toml::from_str(text).map_err(|e| StoreError::Config(format!("invalid store config: {e}")))
}

/// Parse every `[stores.<name>]` table in `text`, ordered by name.
pub fn parse_store_configs(text: &str) -> StoreResult<Vec<StoreConfig>> {
    let file = parse_config_file(text)?;
    let configs = file
        .stores
        .into_iter()
        .map(|(name, raw)| raw.into_config(name))
        .collect::<Vec<_>>();
    for config in &configs {
        config.validate()?;
    }
    Ok(configs)
}

/// Load store configurations from a TOML file on disk.
pub fn load_store_configs(path: impl AsRef<Path>) -> StoreResult<Vec<StoreConfig>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        StoreError::Config(format!("cannot read store config {}: {e}", path.display()))
    })?;
    let configs = parse_store_configs(&text)?;
    debug!(path = %path.display(), stores = configs.len(), "store configs loaded");
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory_without_history_or_logging() {
        let config = StoreConfig::new("client-store");
        assert_eq!(config.persistence, Persistence::Memory);
        assert!(!config.track_state_history);
        assert!(!config.log_state_changes);
        assert!(config.label.is_none());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            StoreConfig::new("").validate(),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::new("   ").validate(),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn persistence_parses_known_names_only() {
        assert_eq!("memory".parse::<Persistence>().unwrap(), Persistence::Memory);
        assert_eq!("session".parse::<Persistence>().unwrap(), Persistence::Session);
        assert_eq!("durable".parse::<Persistence>().unwrap(), Persistence::Durable);
        assert!(matches!(
            "local".parse::<Persistence>(),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn reads_named_table_from_toml() {
        let text = r#"
            [stores.todos]
            persistence = "durable"
            track_state_history = true
            label = "TodoStore"
        "#;
        let config = StoreConfig::from_toml_str("todos", text).unwrap();
        assert_eq!(config.name, "todos");
        assert_eq!(config.persistence, Persistence::Durable);
        assert!(config.track_state_history);
        assert!(!config.log_state_changes);
        assert_eq!(config.label.as_deref(), Some("TodoStore"));
    }

    #[test]
    fn missing_table_falls_back_to_defaults() {
        let config = StoreConfig::from_toml_str("cart", "").unwrap();
        assert_eq!(config, StoreConfig::new("cart"));
    }

    #[test]
    fn unknown_persistence_in_toml_is_a_config_error() {
        let text = "[stores.todos]\npersistence = \"cloud\"\n";
        let err = StoreConfig::from_toml_str("todos", text).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert!(err.to_string().contains("cloud"));
    }

    #[test]
    fn parse_all_tables_in_name_order() {
        let text = r#"
            [stores.zeta]
            persistence = "session"

            [stores.alpha]
            log_state_changes = true
        "#;
        let configs = parse_store_configs(text).unwrap();
        let names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert!(configs[0].log_state_changes);
        assert_eq!(configs[1].persistence, Persistence::Session);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stores.toml");
        std::fs::write(&path, "[stores.prefs]\npersistence = \"session\"\n").unwrap();

        let configs = load_store_configs(&path).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].persistence, Persistence::Session);

        assert!(matches!(
            load_store_configs(dir.path().join("missing.toml")),
            Err(StoreError::Config(_))
        ));
    }
}
