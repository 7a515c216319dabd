//! In-process host runtime for hub components
//!
//! This crate models the host a component plugs into: the event bus, the
//! state machine with scoped state tracking, the area/device/entity
//! registries, config entries, and the issue registry, tied together by the
//! [`Hub`] façade.

mod bus;
mod entries;
mod hub;
mod issues;
pub mod registry;
mod states;

pub use bus::{EventBus, TypedReceiver};
pub use entries::{ConfigEntries, ConfigEntry, ConfigEntryState};
pub use hub::{Hub, HubConfig};
pub use issues::{Issue, IssueRegistry, IssueSeverity};
pub use states::{StateListener, StateMachine, TrackHandle};
