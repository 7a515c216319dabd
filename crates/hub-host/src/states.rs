//! State machine with scoped state-change tracking

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use hub_core::events::StateChangedData;
use hub_core::{Context, EntityId, State};
use tracing::{debug, trace};

use crate::bus::EventBus;

/// Callback invoked for state changes of tracked entities
pub type StateListener = Arc<dyn Fn(&StateChangedData) + Send + Sync>;

struct Watcher {
    entity_ids: HashSet<String>,
    listener: StateListener,
}

/// Tracks the current state of every entity
///
/// Each write fires a STATE_CHANGED event on the bus and synchronously
/// invokes any watcher whose tracked set contains the entity. Watchers run
/// to completion before `set` returns, so a watcher observes changes in
/// exactly the order they were written.
pub struct StateMachine {
    states: DashMap<String, State>,
    watchers: DashMap<u64, Watcher>,
    next_watch_id: AtomicU64,
    bus: Arc<EventBus>,
}

impl StateMachine {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            watchers: DashMap::new(),
            next_watch_id: AtomicU64::new(1),
            bus,
        }
    }

    /// Write the state of an entity
    ///
    /// `last_changed` is preserved when the value did not change.
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(entity_id = %key, state = %new_state.state, "setting state");
        self.states.insert(key, new_state.clone());

        self.dispatch(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Remove an entity from the state machine
    ///
    /// Watchers and bus subscribers see a change with `new_state: None`.
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let old_state = self.states.remove(entity_id.as_str()).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!(entity_id = %entity_id, "removing state");
            self.dispatch(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value as a string
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Check if an entity is in a specific state
    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Number of entities with a state
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Register a watcher scoped to an explicit entity-id set
    ///
    /// The listener is called synchronously from the writing call for every
    /// change of a tracked entity. The returned handle cancels the watcher;
    /// cancelling twice, or after the machine is gone, is a no-op.
    pub fn track(
        self: &Arc<Self>,
        entity_ids: impl IntoIterator<Item = String>,
        listener: StateListener,
    ) -> TrackHandle {
        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        let entity_ids: HashSet<String> = entity_ids.into_iter().collect();
        trace!(watch_id = id, tracked = entity_ids.len(), "tracking states");

        self.watchers.insert(
            id,
            Watcher {
                entity_ids,
                listener,
            },
        );

        TrackHandle {
            id,
            machine: Arc::downgrade(self),
        }
    }

    fn dispatch(&self, data: StateChangedData, context: Context) {
        // Collect first so a listener may register or cancel watchers
        // without holding a map shard.
        let key = data.entity_id.as_str();
        let hits: Vec<StateListener> = self
            .watchers
            .iter()
            .filter(|w| w.entity_ids.contains(key))
            .map(|w| Arc::clone(&w.listener))
            .collect();

        for listener in hits {
            listener(&data);
        }

        self.bus.fire_typed(data, context);
    }
}

/// Cancellation handle for a scoped watcher
///
/// Cancels on drop. Explicit `cancel` is idempotent.
pub struct TrackHandle {
    id: u64,
    machine: Weak<StateMachine>,
}

impl TrackHandle {
    pub fn cancel(&self) {
        if let Some(machine) = self.machine.upgrade() {
            machine.watchers.remove(&self.id);
        }
    }
}

impl Drop for TrackHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
