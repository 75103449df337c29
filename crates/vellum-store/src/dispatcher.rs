//! Change notification channels.
//!
//! Every store name owns six [`ReplaySubject`]s, created together on first
//! use and shared by every store built with that name:
//!
//! | Channel                           | Payload                         |
//! |-----------------------------------|---------------------------------|
//! | state-changed                     | `Option<SharedState>`           |
//! | state-changed-with-name           | `Option<StateWithName>`         |
//! | properties-changed                | `Option<PropertiesChanged>`     |
//! | properties-changed-with-name      | `Option<PropertiesChangedWithName>` |
//! | state-changed-no-payload          | `()`                            |
//! | state-changed-no-payload-with-name| `Option<NameOnly>`              |
//!
//! All of them start at `None` (or `()`), so a subscriber always receives a
//! value immediately.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{SharedState, StateSnapshot};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::naming::resolve_name;
use crate::subject::{Observable, ReplaySubject};

/// Action name pushed by `clear_state`.
pub const STATE_CLEAR_ACTION: &str = "<PLATFORM_STATE_CLEAR>";

/// Action name pushed by `reset_state`.
pub const STATE_RESET_ACTION: &str = "<PLATFORM_STATE_RESET>";

// ── payloads ─────────────────────────────────────────────────────────

/// State plus the action that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateWithName {
    pub state: Option<SharedState>,
    pub name: String,
}

/// State plus the raw input of the change (not a diff).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertiesChanged {
    pub state: Option<SharedState>,
    pub state_changes: Option<SharedState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertiesChangedWithName {
    pub state: Option<SharedState>,
    pub state_changes: Option<SharedState>,
    pub name: String,
}

/// The action name alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameOnly {
    pub name: String,
}

// ── per-name channel set ─────────────────────────────────────────────

/// The six channels of one store name.
#[derive(Debug)]
pub struct Channels {
    pub state_changed: ReplaySubject<Option<SharedState>>,
    pub state_changed_with_name: ReplaySubject<Option<StateWithName>>,
    pub properties_changed: ReplaySubject<Option<PropertiesChanged>>,
    pub properties_changed_with_name: ReplaySubject<Option<PropertiesChangedWithName>>,
    pub state_changed_no_payload: ReplaySubject<()>,
    pub state_changed_no_payload_with_name: ReplaySubject<Option<NameOnly>>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            state_changed: ReplaySubject::new(None),
            state_changed_with_name: ReplaySubject::new(None),
            properties_changed: ReplaySubject::new(None),
            properties_changed_with_name: ReplaySubject::new(None),
            state_changed_no_payload: ReplaySubject::new(()),
            state_changed_no_payload_with_name: ReplaySubject::new(None),
        }
    }

    /// Whether any of the four state-carrying channels has an observer.
    pub fn has_state_observers(&self) -> bool {
        self.state_changed.observer_count() > 0
            || self.state_changed_with_name.observer_count() > 0
            || self.properties_changed.observer_count() > 0
            || self.properties_changed_with_name.observer_count() > 0
    }

    /// Observers across all six channels.
    pub fn observer_count(&self) -> usize {
        self.state_changed.observer_count()
            + self.state_changed_with_name.observer_count()
            + self.properties_changed.observer_count()
            + self.properties_changed_with_name.observer_count()
            + self.state_changed_no_payload.observer_count()
            + self.state_changed_no_payload_with_name.observer_count()
    }

    /// Push one state transition into all six channels.
    ///
    /// `snapshot` is the post-change state captured at dispatch time. When
    /// a state-carrying channel is observed it is materialised once, right
    /// now, and the same copy goes to all four; a materialise error is
    /// returned before any channel is touched. Otherwise the four channels
    /// get a deferred value sharing one lazily materialised copy of the
    /// same snapshot. The two no-payload channels are always pushed.
    pub fn publish(
        &self,
        action: &str,
        state_changes: Option<SharedState>,
        snapshot: StateSnapshot,
    ) -> StoreResult<()> {
        if self.has_state_observers() {
            let state = snapshot.materialize()?;
            self.publish_state(action, state_changes, state);
        } else {
            self.defer_state(action, state_changes, snapshot);
        }

        self.state_changed_no_payload.next(());
        self.state_changed_no_payload_with_name.next(Some(NameOnly {
            name: action.to_string(),
        }));
        Ok(())
    }

    fn publish_state(
        &self,
        action: &str,
        state_changes: Option<SharedState>,
        state: Option<SharedState>,
    ) {
        self.state_changed.next(state.clone());
        self.state_changed_with_name.next(Some(StateWithName {
            state: state.clone(),
            name: action.to_string(),
        }));
        self.properties_changed.next(Some(PropertiesChanged {
            state: state.clone(),
            state_changes: state_changes.clone(),
        }));
        self.properties_changed_with_name
            .next(Some(PropertiesChangedWithName {
                state,
                state_changes,
                name: action.to_string(),
            }));
    }

    fn defer_state(
        &self,
        action: &str,
        state_changes: Option<SharedState>,
        captured: StateSnapshot,
    ) {
        let cell: OnceLock<Option<SharedState>> = OnceLock::new();
        let action_name = action.to_string();
        let snapshot = move || {
            cell.get_or_init(|| {
                captured.materialize().unwrap_or_else(|err| {
                    warn!(action = %action_name, %err, "deferred state snapshot unreadable");
                    None
                })
            })
            .clone()
        };
        let snapshot = Arc::new(snapshot);

        let state = Arc::clone(&snapshot);
        self.state_changed.next_deferred(move || state());

        let state = Arc::clone(&snapshot);
        let name = action.to_string();
        self.state_changed_with_name.next_deferred(move || {
            Some(StateWithName {
                state: state(),
                name: name.clone(),
            })
        });

        let state = Arc::clone(&snapshot);
        let changes = state_changes.clone();
        self.properties_changed.next_deferred(move || {
            Some(PropertiesChanged {
                state: state(),
                state_changes: changes.clone(),
            })
        });

        let state = snapshot;
        let name = action.to_string();
        self.properties_changed_with_name.next_deferred(move || {
            Some(PropertiesChangedWithName {
                state: state(),
                state_changes: state_changes.clone(),
                name: name.clone(),
            })
        });
    }
}

// ── registry ─────────────────────────────────────────────────────────

/// Channel sets keyed by store name.
#[derive(Debug, Default)]
pub struct Dispatcher {
    channels: DashMap<String, Arc<Channels>>,
}

macro_rules! channel_accessors {
    ($($field:ident: $payload:ty => $dispatcher:ident, $observable:ident;)*) => {
        $(
            #[doc = concat!("Write side of the `", stringify!($field), "` channel.")]
            pub fn $dispatcher(&self, config: &StoreConfig) -> ReplaySubject<$payload> {
                self.init_all(config).$field.clone()
            }

            #[doc = concat!("Read side of the `", stringify!($field), "` channel.")]
            pub fn $observable(&self, config: &StoreConfig) -> Observable<$payload> {
                self.init_all(config).$field.as_observable()
            }
        )*
    };
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide dispatcher.
    pub fn global() -> Arc<Self> {
        static DISPATCHER: OnceLock<Arc<Dispatcher>> = OnceLock::new();
        Arc::clone(DISPATCHER.get_or_init(|| Arc::new(Dispatcher::new())))
    }

    /// The channel set for `config`'s name, created on first call.
    pub fn init_all(&self, config: &StoreConfig) -> Arc<Channels> {
        let name = resolve_name(config);
        if let Some(channels) = self.channels.get(name) {
            return Arc::clone(channels.value());
        }
        let channels = self.channels.entry(name.to_string()).or_insert_with(|| {
            debug!(name, "store channels created");
            Arc::new(Channels::new())
        });
        Arc::clone(channels.value())
    }

    /// Observers across all six channels of `config`'s name.
    pub fn observer_count(&self, config: &StoreConfig) -> usize {
        self.channels
            .get(resolve_name(config))
            .map_or(0, |channels| channels.observer_count())
    }

    channel_accessors! {
        state_changed: Option<SharedState>
            => state_changed_dispatcher, state_changed_observable;
        state_changed_with_name: Option<StateWithName>
            => state_changed_with_name_dispatcher, state_changed_with_name_observable;
        properties_changed: Option<PropertiesChanged>
            => properties_changed_dispatcher, properties_changed_observable;
        properties_changed_with_name: Option<PropertiesChangedWithName>
            => properties_changed_with_name_dispatcher, properties_changed_with_name_observable;
        state_changed_no_payload: ()
            => state_changed_no_payload_dispatcher, state_changed_no_payload_observable;
        state_changed_no_payload_with_name: Option<NameOnly>
            => state_changed_no_payload_with_name_dispatcher,
               state_changed_no_payload_with_name_observable;
    }
}

// ── tests ────────────────────────────────────────────────────────────
