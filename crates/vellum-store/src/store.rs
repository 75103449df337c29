//! The [`Store`] facade.
//!
//! A store binds a [`StoreConfig`] to its backend, history list and channel
//! set. Stores are meant to be wrapped by domain types that add their own
//! operations on top of [`Store::set_state`]:
//!
//! ```
//! use serde_json::{json, Value};
//! use vellum_store::{StateChange, Store, StoreConfig, StoreResult};
//!
//! struct CartStore {
//!     store: Store,
//! }
//!
//! impl CartStore {
//!     fn new() -> StoreResult<Self> {
//!         let config = StoreConfig::new("doc-cart").with_label("CartStore");
//!         Ok(Self { store: Store::new(config)? })
//!     }
//!
//!     fn add(&self, sku: &str) -> StoreResult<()> {
//!         let sku = Value::from(sku);
//!         self.store.set_state(
//!             StateChange::compute(move |state| {
//!                 let mut items = state
//!                     .and_then(|s| s.get("items").and_then(Value::as_array).cloned())
//!                     .unwrap_or_default();
//!                 items.push(sku);
//!                 json!({ "items": items })
//!             }),
//!             "CART_ADD",
//!         )?;
//!         Ok(())
//!     }
//! }
//!
//! let cart = CartStore::new().unwrap();
//! cart.add("tea").unwrap();
//! assert_eq!(cart.store.get_state_property("items").unwrap(), Some(json!(["tea"])));
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::backend::{SharedState, StateBackend};
use crate::config::StoreConfig;
use crate::dispatcher::{
    Channels, Dispatcher, NameOnly, PropertiesChanged, PropertiesChangedWithName,
    STATE_CLEAR_ACTION, STATE_RESET_ACTION, StateWithName,
};
use crate::error::{StoreError, StoreResult};
use crate::naming::resolve_name;
use crate::state::{HistoryEntry, State, StateHistory, property_of};
use crate::subject::Observable;

// ── inputs ───────────────────────────────────────────────────────────

type ComputeFn = Box<dyn FnOnce(Option<SharedState>) -> Value + Send>;

/// New state for [`Store::set_state`]: a value, or a function of the
/// current state. Either way the result must be a JSON object.
pub enum StateChange {
    Value(Value),
    Compute(ComputeFn),
}

impl StateChange {
    /// Derive the change from the current state.
    pub fn compute(f: impl FnOnce(Option<SharedState>) -> Value + Send + 'static) -> Self {
        Self::Compute(Box::new(f))
    }

    fn resolve(self, current: Option<SharedState>) -> Value {
        match self {
            Self::Value(value) => value,
            Self::Compute(f) => f(current),
        }
    }
}

impl fmt::Debug for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

impl From<Value> for StateChange {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Map<String, Value>> for StateChange {
    fn from(map: Map<String, Value>) -> Self {
        Self::Value(Value::Object(map))
    }
}

/// Options for [`Store::set_state_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStateOptions {
    /// Push the change to the store's channels.
    pub dispatch: bool,
    /// Read and persist through structurally independent copies.
    pub deep_clone: bool,
}

impl Default for SetStateOptions {
    fn default() -> Self {
        Self {
            dispatch: true,
            deep_clone: true,
        }
    }
}

// ── store ────────────────────────────────────────────────────────────

/// A named, observable, optionally persisted state container.
///
/// Stores built with the same name share state, history and channels.
/// Cloning a `Store` yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    config: Arc<StoreConfig>,
    backend: Arc<dyn StateBackend>,
    history: StateHistory,
    channels: Arc<Channels>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("persistence", &self.backend.persistence())
            .field("history", &self.history.len())
            .finish()
    }
}

impl Store {
    /// Build a store on the process-wide registries.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        Self::with_registries(config, &State::global(), &Dispatcher::global())
    }

    /// Build a store on explicit registries.
    ///
    /// Backend storage and all six channels for the name exist when this
    /// returns, so the observables can be subscribed before any change.
    pub fn with_registries(
        config: StoreConfig,
        state: &State,
        dispatcher: &Dispatcher,
    ) -> StoreResult<Self> {
        config.validate()?;

        let backend = state.backend(config.persistence)?;
        backend.init(resolve_name(&config))?;
        let history = state.history(&config);
        let channels = dispatcher.init_all(&config);

        debug!(
            name = resolve_name(&config),
            persistence = %config.persistence,
            track_state_history = config.track_state_history,
            "store ready"
        );

        Ok(Self {
            config: Arc::new(config),
            backend,
            history,
            channels,
        })
    }

    pub fn name(&self) -> &str {
        resolve_name(&self.config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ── reads ────────────────────────────────────────────────────────

    /// Current state, `None` if never set or cleared.
    ///
    /// With `deep_clone` the result is independent of the stored value;
    /// without it a memory-backed store returns its live `Arc`.
    pub fn get_state(&self, deep_clone: bool) -> StoreResult<Option<SharedState>> {
        self.backend.get(self.name(), deep_clone)
    }

    /// One top-level property, `None` if it or the state is absent.
    ///
    /// Only the property is copied out; the rest of the state is not cloned.
    pub fn get_state_property(&self, property: &str) -> StoreResult<Option<Value>> {
        let state = self.get_state(false)?;
        Ok(property_of(state.as_deref(), property))
    }

    /// Current state deserialized into `T`.
    pub fn get_state_as<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        let Some(state) = self.get_state(false)? else {
            return Ok(None);
        };
        Ok(Some(T::deserialize(state.as_ref())?))
    }

    // ── writes ───────────────────────────────────────────────────────

    /// Merge `change` into the state, dispatching to every channel.
    ///
    /// See [`set_state_with`](Self::set_state_with).
    pub fn set_state(
        &self,
        change: impl Into<StateChange>,
        action: &str,
    ) -> StoreResult<Option<SharedState>> {
        self.set_state_with(change, action, SetStateOptions::default())
    }

    /// Merge `change` into the state.
    ///
    /// The resolved change must be a JSON object; its top-level keys replace
    /// those of the previous state. Anything else fails with
    /// [`StoreError::InvalidStateType`] before any write, history entry or
    /// dispatch. Returns the state as read back after the write.
    pub fn set_state_with(
        &self,
        change: impl Into<StateChange>,
        action: &str,
        options: SetStateOptions,
    ) -> StoreResult<Option<SharedState>> {
        let previous = self.get_state(options.deep_clone)?;

        let changes = match change.into().resolve(previous.clone()) {
            Value::Object(changes) => changes,
            other => return Err(StoreError::invalid_state(&other)),
        };

        let mut merged = previous
            .as_deref()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        merged.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
        let changes: SharedState = Arc::new(Value::Object(changes));

        // `merged` is uniquely owned here.
        self.backend
            .set(self.name(), Some(Arc::new(Value::Object(merged))), false)?;

        if self.config.track_state_history {
            let end_state = self.get_state(options.deep_clone)?;
            self.history
                .push(HistoryEntry::new(action, previous, end_state));
        }

        if options.dispatch {
            self.dispatch(action, Some(Arc::clone(&changes)))?;
        }

        if self.config.log_state_changes {
            self.log_change(action, &changes);
        }

        self.get_state(options.deep_clone)
    }

    /// Set the state to `None`. History is kept.
    pub fn clear_state(&self, dispatch: bool) -> StoreResult<()> {
        self.backend.clear(self.name())?;
        if dispatch {
            self.dispatch(STATE_CLEAR_ACTION, None)?;
        }
        Ok(())
    }

    /// Replace the state with `state` as given and empty the history.
    ///
    /// `state` must be an object or `null`; no merge and no clone happen.
    pub fn reset_state(&self, state: Value, dispatch: bool) -> StoreResult<()> {
        let state = match state {
            Value::Null => None,
            object @ Value::Object(_) => Some(Arc::new(object)),
            other => return Err(StoreError::invalid_state(&other)),
        };

        self.backend.set(self.name(), state.clone(), false)?;
        self.history.clear();

        if dispatch {
            self.dispatch(STATE_RESET_ACTION, state)?;
        }
        Ok(())
    }

    // ── history ──────────────────────────────────────────────────────

    /// Live history list for this name. Stays empty unless the config
    /// enables `track_state_history`.
    pub fn state_history(&self) -> StateHistory {
        self.history.clone()
    }

    /// Empty the history in place. State and channels are untouched.
    pub fn clear_state_history(&self) {
        self.history.clear();
    }

    // ── channels ─────────────────────────────────────────────────────

    pub fn state_changed(&self) -> Observable<Option<SharedState>> {
        self.channels.state_changed.as_observable()
    }

    pub fn state_changed_with_name(&self) -> Observable<Option<StateWithName>> {
        self.channels.state_changed_with_name.as_observable()
    }

    pub fn state_changed_properties(&self) -> Observable<Option<PropertiesChanged>> {
        self.channels.properties_changed.as_observable()
    }

    pub fn state_changed_properties_with_name(
        &self,
    ) -> Observable<Option<PropertiesChangedWithName>> {
        self.channels.properties_changed_with_name.as_observable()
    }

    /// Fires on every change with no data.
    pub fn state_changed_no_payload(&self) -> Observable<()> {
        self.channels.state_changed_no_payload.as_observable()
    }

    pub fn state_changed_no_payload_with_name(&self) -> Observable<Option<NameOnly>> {
        self.channels.state_changed_no_payload_with_name.as_observable()
    }

    // ── internals ────────────────────────────────────────────────────

    fn dispatch(&self, action: &str, state_changes: Option<SharedState>) -> StoreResult<()> {
        debug!(store = %self.name(), action, "dispatching state change");
        let snapshot = self.backend.snapshot(self.name())?;
        self.channels.publish(action, state_changes, snapshot)
    }

    fn log_change(&self, action: &str, changes: &Value) {
        let caller = self.config.label.as_deref().unwrap_or_default();
        let state = serde_json::to_string(changes).unwrap_or_default();
        info!(
            target: "vellum_store::changes",
            store = %self.name(),
            caller,
            action,
            state = %state,
            "state changed"
        );
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Persistence;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    fn isolated(config: StoreConfig) -> (Store, State, Dispatcher) {
        let state = State::new();
        let dispatcher = Dispatcher::new();
        let store = Store::with_registries(config, &state, &dispatcher).unwrap();
        (store, state, dispatcher)
    }

    #[test]
    fn empty_name_fails_construction() {
        let err = Store::with_registries(StoreConfig::new(""), &State::new(), &Dispatcher::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn set_state_merges_top_level_keys() {
        let (store, _, _) = isolated(StoreConfig::new("merge"));
        store.set_state(json!({"a": 1, "b": {"x": 1}}), "first").unwrap();
        let state = store.set_state(json!({"b": {"y": 2}, "c": 3}), "second").unwrap();

        assert_eq!(
            state.as_deref(),
            Some(&json!({"a": 1, "b": {"y": 2}, "c": 3}))
        );
    }

    #[test]
    fn compute_receives_current_state() {
        let (store, _, _) = isolated(StoreConfig::new("counter"));
        store.set_state(json!({"count": 1}), "init").unwrap();
        store
            .set_state(
                StateChange::compute(|state| {
                    let count = state
                        .and_then(|s| s.get("count").and_then(Value::as_i64))
                        .unwrap_or(0);
                    json!({"count": count + 1})
                }),
                "increment",
            )
            .unwrap();

        assert_eq!(store.get_state_property("count").unwrap(), Some(json!(2)));
    }

    #[test]
    fn non_object_input_is_rejected_without_side_effects() {
        let (store, _, _) = isolated(StoreConfig::new("typed").with_state_history(true));
        store.set_state(json!({"ok": true}), "init").unwrap();
        let beats = store.state_changed_no_payload_with_name().value();

        for bad in [json!(42), json!("text"), json!([1, 2]), json!(null)] {
            let err = store.set_state(bad, "bad").unwrap_err();
            assert!(matches!(err, StoreError::InvalidStateType { .. }));
        }
        let err = store
            .set_state(StateChange::compute(|_| json!(7)), "bad-fn")
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidStateType { found: "number" }));

        assert_eq!(store.get_state(true).unwrap().as_deref(), Some(&json!({"ok": true})));
        assert_eq!(store.state_history().len(), 1);
        assert_eq!(store.state_changed_no_payload_with_name().value(), beats);
    }

    #[test]
    fn deep_clone_read_is_isolated_from_the_store() {
        let (store, _, _) = isolated(StoreConfig::new("isolation"));
        store.set_state(json!({"items": [1]}), "init").unwrap();

        let mut copy = store.get_state(true).unwrap().unwrap();
        Arc::make_mut(&mut copy)["items"] = json!([1, 2, 3]);

        assert_eq!(store.get_state_property("items").unwrap(), Some(json!([1])));
    }

    #[test]
    fn shallow_read_returns_the_live_state() {
        let (store, _, _) = isolated(StoreConfig::new("live"));
        store.set_state(json!({"k": "v"}), "init").unwrap();

        let a = store.get_state(false).unwrap().unwrap();
        let b = store.get_state(false).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn set_state_without_dispatch_stays_silent() {
        let (store, _, _) = isolated(StoreConfig::new("quiet"));
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let _sub = store.state_changed_no_payload().subscribe(move |_| {
            *counter.lock().unwrap() += 1;
        });

        store
            .set_state_with(
                json!({"a": 1}),
                "silent",
                SetStateOptions {
                    dispatch: false,
                    ..SetStateOptions::default()
                },
            )
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(store.get_state_property("a").unwrap(), Some(json!(1)));
    }

    #[test]
    fn properties_channel_carries_raw_input() {
        let (store, _, _) = isolated(StoreConfig::new("props"));
        store.set_state(json!({"a": 1}), "one").unwrap();
        store.set_state(json!({"b": 2}), "two").unwrap();

        let latest = store.state_changed_properties_with_name().value().unwrap();
        assert_eq!(latest.name, "two");
        assert_eq!(latest.state_changes.as_deref(), Some(&json!({"b": 2})));
        assert_eq!(latest.state.as_deref(), Some(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn clear_and_reset_push_platform_actions() {
        let (store, _, _) = isolated(StoreConfig::new("platform").with_state_history(true));
        store.set_state(json!({"a": 1}), "a").unwrap();

        store.clear_state(true).unwrap();
        assert!(store.get_state(true).unwrap().is_none());
        assert_eq!(store.state_history().len(), 1);
        let cleared = store.state_changed_with_name().value().unwrap();
        assert_eq!(cleared.name, STATE_CLEAR_ACTION);
        assert!(cleared.state.is_none());

        store.reset_state(json!({"b": 2}), true).unwrap();
        assert_eq!(store.get_state(true).unwrap().as_deref(), Some(&json!({"b": 2})));
        assert!(store.state_history().is_empty());
        assert_eq!(
            store.state_changed_no_payload_with_name().value(),
            Some(NameOnly {
                name: STATE_RESET_ACTION.into()
            })
        );
    }

    #[test]
    fn silent_writes_do_not_change_the_replayed_state() {
        let (store, _, _) = isolated(StoreConfig::new("silent-after-dispatch"));
        store.set_state(json!({"v": 1}), "DISPATCHED").unwrap();
        let quiet = SetStateOptions {
            dispatch: false,
            ..SetStateOptions::default()
        };
        store.set_state_with(json!({"v": 2}), "SILENT", quiet).unwrap();

        let replayed = store.state_changed_with_name().value().unwrap();
        assert_eq!(replayed.name, "DISPATCHED");
        assert_eq!(replayed.state.as_deref(), Some(&json!({"v": 1})));
        assert_eq!(store.get_state_property("v").unwrap(), Some(json!(2)));
    }

    #[test]
    fn silent_clear_and_reset_do_not_change_the_replayed_state() {
        for persistence in [Persistence::Memory, Persistence::Session] {
            let (store, _, _) =
                isolated(StoreConfig::new("silent-clear").with_persistence(persistence));
            store.set_state(json!({"v": 1}), "DISPATCHED").unwrap();

            store.clear_state(false).unwrap();
            assert_eq!(
                store.state_changed().value().as_deref(),
                Some(&json!({"v": 1}))
            );

            store.reset_state(json!({"v": 3}), false).unwrap();
            let props = store.state_changed_properties().value().unwrap();
            assert_eq!(props.state.as_deref(), Some(&json!({"v": 1})));
            assert_eq!(props.state_changes.as_deref(), Some(&json!({"v": 1})));
        }
    }

    #[test]
    fn reset_rejects_non_objects() {
        let (store, _, _) = isolated(StoreConfig::new("reset-typed"));
        assert!(matches!(
            store.reset_state(json!("nope"), true),
            Err(StoreError::InvalidStateType { found: "string" })
        ));
        store.reset_state(Value::Null, false).unwrap();
        assert!(store.get_state(true).unwrap().is_none());
    }

    #[test]
    fn typed_reads() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Prefs {
            theme: String,
        }

        let (store, _, _) = isolated(StoreConfig::new("prefs").with_persistence(Persistence::Session));
        assert_eq!(store.get_state_as::<Prefs>().unwrap(), None);

        store.set_state(json!({"theme": "dark"}), "theme").unwrap();
        assert_eq!(
            store.get_state_as::<Prefs>().unwrap(),
            Some(Prefs {
                theme: "dark".into()
            })
        );
    }

    #[test]
    fn logging_never_changes_the_result() {
        let (quiet, _, _) = isolated(StoreConfig::new("log"));
        let (loud, _, _) = isolated(
            StoreConfig::new("log")
                .with_change_logging(true)
                .with_label("LoudStore"),
        );

        let a = quiet.set_state(json!({"x": 1}), "x").unwrap();
        let b = loud.set_state(json!({"x": 1}), "x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn clear_state_history_leaves_state_alone() {
        let (store, state, _) = isolated(StoreConfig::new("hist").with_state_history(true));
        store.set_state(json!({"a": 1}), "a").unwrap();
        store.set_state(json!({"b": 2}), "b").unwrap();
        assert_eq!(state.history_len(store.config()), 2);

        store.clear_state_history();
        assert_eq!(state.history_len(store.config()), 0);
        assert_eq!(store.get_state_property("b").unwrap(), Some(json!(2)));
    }
}
