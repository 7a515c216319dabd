//! Device registry

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A registered device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Internal id (ULID)
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Area this device is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl DeviceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            name: name.into(),
            manufacturer: None,
            model: None,
            area_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Registry of all devices, indexed by id, stable identifier, and area
pub struct DeviceRegistry {
    by_id: DashMap<String, Arc<DeviceEntry>>,
    /// Stable "domain:id" identifier -> device id, for integration-owned devices
    by_identifier: DashMap<String, String>,
    by_area: DashMap<String, HashSet<String>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_identifier: DashMap::new(),
            by_area: DashMap::new(),
        }
    }

    /// Create a device and index it
    pub fn create(&self, entry: DeviceEntry) -> Arc<DeviceEntry> {
        let entry = Arc::new(entry);
        info!(device_id = %entry.id, name = %entry.name, "created device");
        self.index(&entry);
        entry
    }

    /// Look up or create a device owned by an integration
    ///
    /// The identifier is a stable `(domain, id)` pair, so repeated setup of
    /// the same integration instance reuses one device.
    pub fn get_or_create(
        &self,
        identifier: (&str, &str),
        build: impl FnOnce() -> DeviceEntry,
    ) -> Arc<DeviceEntry> {
        let key = format!("{}:{}", identifier.0, identifier.1);
        if let Some(device_id) = self.by_identifier.get(&key) {
            if let Some(existing) = self.get(&device_id) {
                return existing;
            }
        }

        let entry = self.create(build());
        self.by_identifier.insert(key, entry.id.clone());
        entry
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn ids_for_area(&self, area_id: &str) -> HashSet<String> {
        self.by_area
            .get(area_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Apply a mutation and re-index the device
    pub fn update<F>(&self, device_id: &str, f: F) -> Option<Arc<DeviceEntry>>
    where
        F: FnOnce(&mut DeviceEntry),
    {
        let (_, old) = self.by_id.remove(device_id)?;
        self.unindex(&old);

        let mut entry = (*old).clone();
        f(&mut entry);

        let entry = Arc::new(entry);
        self.index(&entry);
        Some(entry)
    }

    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let (_, entry) = self.by_id.remove(device_id)?;
        self.unindex(&entry);
        info!(device_id, "removed device");
        Some(entry)
    }

    fn index(&self, entry: &Arc<DeviceEntry>) {
        if let Some(ref area_id) = entry.area_id {
            self.by_area
                .entry(area_id.clone())
                .or_default()
                .insert(entry.id.clone());
        }
        self.by_id.insert(entry.id.clone(), Arc::clone(entry));
    }

    fn unindex(&self, entry: &DeviceEntry) {
        if let Some(ref area_id) = entry.area_id {
            if let Some(mut ids) = self.by_area.get_mut(area_id) {
                ids.remove(&entry.id);
            }
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
