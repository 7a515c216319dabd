//! Core types for the home-automation hub
//!
//! This crate provides the fundamental types shared by the hub runtime and
//! its components: EntityId, State, Event, and Context.

mod context;
mod entity_id;
mod event;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use state::State;

/// State value for an entity whose value is not known
pub const STATE_UNKNOWN: &str = "unknown";

/// State value for an entity that is currently unreachable
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value for a binary entity that is on
pub const STATE_ON: &str = "on";

/// State value for a binary entity that is off
pub const STATE_OFF: &str = "off";

/// Standard event types used by the hub
pub mod events {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type fired once the hub has finished starting
    pub const HUB_STARTED: &str = "hub_started";

    /// Event type for entity registry mutations
    pub const ENTITY_REGISTRY_UPDATED: &str = "entity_registry_updated";

    /// Event type for service calls
    pub const CALL_SERVICE: &str = "call_service";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        /// None when the entity was removed from the state machine
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for HUB_STARTED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HubStartedData {}

    impl EventData for HubStartedData {
        fn event_type() -> &'static str {
            HUB_STARTED
        }
    }

    /// Kind of mutation carried by an ENTITY_REGISTRY_UPDATED event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum RegistryAction {
        Create,
        Update,
        Remove,
    }

    /// Data for ENTITY_REGISTRY_UPDATED events
    ///
    /// `changes` carries the names of the fields touched by an update; it is
    /// empty for create and remove actions.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EntityRegistryUpdatedData {
        pub action: RegistryAction,
        pub entity_id: String,
        #[serde(default)]
        pub changes: Vec<String>,
    }

    impl EventData for EntityRegistryUpdatedData {
        fn event_type() -> &'static str {
            ENTITY_REGISTRY_UPDATED
        }
    }

    /// Data for CALL_SERVICE events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CallServiceData {
        pub domain: String,
        pub service: String,
        pub service_data: serde_json::Value,
    }

    impl EventData for CallServiceData {
        fn event_type() -> &'static str {
            CALL_SERVICE
        }
    }
}
