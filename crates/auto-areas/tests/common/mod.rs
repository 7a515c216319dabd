//! Common test harness for component-level tests
//!
//! Wraps a hub and the component behind helpers for seeding areas, sensors,
//! and config entries, and for asserting on published aggregate states.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use auto_areas::config::CONF_AREA_ID;
use auto_areas::{AutoAreas, DOMAIN};
use hub_core::events::CallServiceData;
use hub_core::Context;
use hub_host::registry::{AreaEntry, DeviceEntry, EntityEntry};
use hub_host::{ConfigEntry, Hub};
use serde_json::json;

/// A hub with the component mounted, plus assertion helpers
pub struct TestHub {
    pub hub: Arc<Hub>,
    pub component: Arc<AutoAreas>,
}

impl TestHub {
    pub fn new() -> Self {
        let hub = Hub::new();
        let component = AutoAreas::new(Arc::clone(&hub));
        Self { hub, component }
    }

    pub fn add_area(&self, name: &str) -> Arc<AreaEntry> {
        self.hub.areas.create(name)
    }

    /// Register a sensor in an area and give it an initial state
    pub fn add_sensor(
        &self,
        entity_id: &str,
        device_class: &str,
        area_id: &str,
        value: &str,
    ) -> Arc<EntityEntry> {
        let mut entry = EntityEntry::new(entity_id, "demo");
        entry.original_device_class = Some(device_class.to_string());
        entry.area_id = Some(area_id.to_string());
        let entry = self.hub.entities.create(entry);
        self.set_state(entity_id, value);
        entry
    }

    /// Register a sensor attached to a device instead of an area
    pub fn add_device_sensor(
        &self,
        entity_id: &str,
        device_class: &str,
        device: &Arc<DeviceEntry>,
        value: &str,
    ) -> Arc<EntityEntry> {
        let mut entry = EntityEntry::new(entity_id, "demo");
        entry.original_device_class = Some(device_class.to_string());
        entry.device_id = Some(device.id.clone());
        let entry = self.hub.entities.create(entry);
        self.set_state(entity_id, value);
        entry
    }

    pub fn set_state(&self, entity_id: &str, value: &str) {
        self.hub.states.set(
            entity_id.parse().expect("invalid entity_id"),
            value,
            HashMap::new(),
            Context::new(),
        );
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.hub.states.get_state(entity_id)
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.hub.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "expected {entity_id} to be '{expected}', but was {state:?}"
        );
    }

    /// Build a config entry managing the given area
    pub fn config_entry(&self, area_id: &str) -> ConfigEntry {
        ConfigEntry::new(DOMAIN, "Test Area")
            .with_data(HashMap::from([(CONF_AREA_ID.to_string(), json!(area_id))]))
    }

    /// Capture all service calls fired from now on
    pub fn capture_service_calls(&self) -> Arc<Mutex<Vec<CallServiceData>>> {
        let captured: Arc<Mutex<Vec<CallServiceData>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let mut rx = self.hub.bus.subscribe_typed::<CallServiceData>();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                sink.lock().unwrap().push(event.data);
            }
        });
        captured
    }
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}
