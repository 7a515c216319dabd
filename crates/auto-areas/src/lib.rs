//! Automatic per-area sensor aggregation
//!
//! For every configured area this integration publishes aggregate entities
//! (illuminance, temperature, humidity, presence) computed from the sensors
//! living in that area, keeps their membership in sync with the entity
//! registry, and can optionally drive the area's lights from presence.

pub mod area;
pub mod calc;
pub mod config;
pub mod kind;
pub mod membership;
pub mod tracker;

mod light;

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use hub_core::events::{EntityRegistryUpdatedData, HubStartedData};
use hub_core::EntityIdError;
use hub_host::{ConfigEntry, ConfigEntryState, Hub};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::area::AutoArea;

/// Integration domain
pub const DOMAIN: &str = "auto_areas";

/// Display name used for the owning device
pub const NAME: &str = "Auto Areas";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Grace period after hub start before aggregates are built, so restored
/// states and late-registering entities have settled
pub const STARTUP_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Errors raised while setting up a config entry
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid aggregate entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("unknown config entry '{0}'")]
    UnknownEntry(String),
}

/// Lowercase a display name into an entity object-id fragment
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// The integration: one [`AutoArea`] per loaded config entry
pub struct AutoAreas {
    hub: Arc<Hub>,
    areas: DashMap<String, Arc<AutoArea>>,
    tasks: DashMap<String, Vec<JoinHandle<()>>>,
}

impl AutoAreas {
    pub fn new(hub: Arc<Hub>) -> Arc<Self> {
        Arc::new(Self {
            hub,
            areas: DashMap::new(),
            tasks: DashMap::new(),
        })
    }

    /// Set up a config entry
    ///
    /// When the hub is already running the area initializes immediately;
    /// otherwise initialization is deferred until shortly after startup.
    pub fn setup_entry(self: &Arc<Self>, entry: ConfigEntry) {
        let entry_id = entry.entry_id.clone();
        if self.hub.entries.get(&entry_id).is_none() {
            self.hub.entries.add(entry.clone());
        }

        let auto_area = AutoArea::new(Arc::clone(&self.hub), entry);
        self.areas.insert(entry_id.clone(), Arc::clone(&auto_area));

        if self.hub.is_running() {
            self.init_entry(&entry_id, auto_area);
        } else {
            let this = Arc::clone(self);
            let mut started = self.hub.bus.subscribe_typed::<HubStartedData>();
            let task_entry_id = entry_id.clone();
            let handle = tokio::spawn(async move {
                if started.recv().await.is_err() {
                    return;
                }
                tokio::time::sleep(STARTUP_SETTLE_DELAY).await;
                this.init_entry(&task_entry_id, auto_area);
            });
            self.tasks.entry(entry_id).or_default().push(handle);
        }
    }

    fn init_entry(self: &Arc<Self>, entry_id: &str, auto_area: Arc<AutoArea>) {
        match auto_area.initialize() {
            Ok(()) => {
                self.hub.entries.set_state(entry_id, ConfigEntryState::Loaded);
                info!(entry_id, "entry loaded");
            }
            Err(err) => {
                error!(entry_id, %err, "entry setup failed");
                self.hub
                    .entries
                    .set_state(entry_id, ConfigEntryState::SetupError);
                return;
            }
        }

        // Follow registry mutations for as long as the area instance lives
        let weak: Weak<AutoArea> = Arc::downgrade(&auto_area);
        let mut registry_events = self.hub.bus.subscribe_typed::<EntityRegistryUpdatedData>();
        let handle = tokio::spawn(async move {
            while let Ok(event) = registry_events.recv().await {
                let Some(auto_area) = weak.upgrade() else {
                    break;
                };
                auto_area.handle_registry_update(&event.data);
            }
        });
        self.tasks.entry(entry_id.to_string()).or_default().push(handle);
    }

    /// Tear down a config entry, leaving the entry itself in the store
    pub fn unload_entry(&self, entry_id: &str) -> Result<(), SetupError> {
        if let Some((_, handles)) = self.tasks.remove(entry_id) {
            for handle in handles {
                handle.abort();
            }
        }

        let Some((_, auto_area)) = self.areas.remove(entry_id) else {
            return Err(SetupError::UnknownEntry(entry_id.to_string()));
        };
        auto_area.teardown();
        self.hub
            .entries
            .set_state(entry_id, ConfigEntryState::NotLoaded);
        info!(entry_id, "entry unloaded");
        Ok(())
    }

    /// Unload and set up an entry again with its current options snapshot
    pub fn reload_entry(self: &Arc<Self>, entry_id: &str) -> Result<(), SetupError> {
        let entry = self
            .hub
            .entries
            .get(entry_id)
            .ok_or_else(|| SetupError::UnknownEntry(entry_id.to_string()))?;

        if let Err(err) = self.unload_entry(entry_id) {
            warn!(entry_id, %err, "reload of an entry that was not loaded");
        }
        self.setup_entry(entry);
        Ok(())
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<AutoArea>> {
        self.areas.get(entry_id).map(|a| Arc::clone(a.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Living Room"), "living_room");
        assert_eq!(slugify("Büro (2. OG)"), "b_ro_2_og");
        assert_eq!(slugify("  Office  "), "office");
        assert_eq!(slugify("A--B"), "a_b");
    }
}
