//! Entity registry
//!
//! Tracks all registered entities, their device/area assignments, and their
//! device classes. Mutations fire ENTITY_REGISTRY_UPDATED events on the bus
//! so components can react to membership changes.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hub_core::events::{EntityRegistryUpdatedData, RegistryAction};
use hub_core::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bus::EventBus;

/// Reason an entity was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    Integration,
    User,
}

/// A registered entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal id (ULID)
    pub id: String,

    /// Full entity id (`domain.object_id`)
    pub entity_id: String,

    /// Integration that provides this entity
    pub platform: String,

    /// Platform-specific stable identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Parent device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Direct area assignment; when absent the device's area applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    /// User override of the device class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    /// Device class the platform registered the entity with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_device_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<DisabledBy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(entity_id: impl Into<String>, platform: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            platform: platform.into(),
            unique_id: None,
            device_id: None,
            area_id: None,
            device_class: None,
            original_device_class: None,
            disabled_by: None,
            unit_of_measurement: None,
            name: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// The domain part of the entity id
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or(&self.entity_id)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    /// Effective device class: user override beats the platform default
    pub fn resolved_device_class(&self) -> Option<&str> {
        self.device_class
            .as_deref()
            .or(self.original_device_class.as_deref())
    }
}

/// Entity registry with id, unique-id, device, and area indexes
pub struct EntityRegistry {
    bus: Arc<EventBus>,

    /// Primary index; IndexMap keeps registration order for deterministic iteration
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    by_unique_id: DashMap<String, String>,
    by_device: DashMap<String, HashSet<String>>,
    by_area: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
            by_device: DashMap::new(),
            by_area: DashMap::new(),
        }
    }

    /// Register an entity and fire a create event
    pub fn create(&self, entry: EntityEntry) -> Arc<EntityEntry> {
        let entry = Arc::new(entry);
        info!(entity_id = %entry.entity_id, platform = %entry.platform, "registered entity");
        self.index(&entry);
        self.fire(RegistryAction::Create, &entry.entity_id, Vec::new());
        entry
    }

    /// Look up by unique id, or register a new entry
    pub fn get_or_create(
        &self,
        entity_id: &str,
        platform: &str,
        unique_id: &str,
        build: impl FnOnce(&mut EntityEntry),
    ) -> Arc<EntityEntry> {
        if let Some(existing) = self.get_by_unique_id(unique_id) {
            debug!(entity_id = %existing.entity_id, "entity already registered");
            return existing;
        }

        let mut entry = EntityEntry::new(entity_id, platform);
        entry.unique_id = Some(unique_id.to_string());
        build(&mut entry);
        self.create(entry)
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    pub fn get_by_unique_id(&self, unique_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_unique_id
            .get(unique_id)
            .and_then(|entity_id| self.get(&entity_id))
    }

    /// Entity ids directly assigned to an area (device inheritance not applied)
    pub fn ids_for_area(&self, area_id: &str) -> HashSet<String> {
        self.by_area
            .get(area_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn ids_for_device(&self, device_id: &str) -> HashSet<String> {
        self.by_device
            .get(device_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Snapshot of all entries, in registration order
    pub fn all(&self) -> Vec<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .map(|idx| idx.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply a mutation, re-index, and fire an update event naming the changed fields
    pub fn update<F>(&self, entity_id: &str, f: F) -> Option<Arc<EntityEntry>>
    where
        F: FnOnce(&mut EntityEntry),
    {
        let old = {
            let mut idx = self.by_entity_id.write().ok()?;
            idx.shift_remove(entity_id)?
        };
        self.unindex(&old);

        let mut entry = (*old).clone();
        f(&mut entry);
        entry.modified_at = Utc::now();

        let changes = changed_fields(&old, &entry);
        let entry = Arc::new(entry);
        self.index(&entry);

        if !changes.is_empty() {
            debug!(entity_id, ?changes, "entity updated");
            self.fire(RegistryAction::Update, &entry.entity_id, changes);
        }
        Some(entry)
    }

    /// Remove an entity and fire a remove event
    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let entry = {
            let mut idx = self.by_entity_id.write().ok()?;
            idx.shift_remove(entity_id)?
        };
        self.unindex(&entry);
        info!(entity_id, "removed entity");
        self.fire(RegistryAction::Remove, entity_id, Vec::new());
        Some(entry)
    }

    fn index(&self, entry: &Arc<EntityEntry>) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert(unique_id.clone(), entry.entity_id.clone());
        }
        if let Some(ref device_id) = entry.device_id {
            self.by_device
                .entry(device_id.clone())
                .or_default()
                .insert(entry.entity_id.clone());
        }
        if let Some(ref area_id) = entry.area_id {
            self.by_area
                .entry(area_id.clone())
                .or_default()
                .insert(entry.entity_id.clone());
        }
        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entry.entity_id.clone(), Arc::clone(entry));
        }
    }

    fn unindex(&self, entry: &EntityEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.remove(unique_id);
        }
        if let Some(ref device_id) = entry.device_id {
            if let Some(mut ids) = self.by_device.get_mut(device_id) {
                ids.remove(&entry.entity_id);
            }
        }
        if let Some(ref area_id) = entry.area_id {
            if let Some(mut ids) = self.by_area.get_mut(area_id) {
                ids.remove(&entry.entity_id);
            }
        }
    }

    fn fire(&self, action: RegistryAction, entity_id: &str, changes: Vec<String>) {
        self.bus.fire_typed(
            EntityRegistryUpdatedData {
                action,
                entity_id: entity_id.to_string(),
                changes,
            },
            Context::new(),
        );
    }
}

fn changed_fields(old: &EntityEntry, new: &EntityEntry) -> Vec<String> {
    let mut changes = Vec::new();
    if old.area_id != new.area_id {
        changes.push("area_id".to_string());
    }
    if old.device_id != new.device_id {
        changes.push("device_id".to_string());
    }
    if old.device_class != new.device_class {
        changes.push("device_class".to_string());
    }
    if old.disabled_by != new.disabled_by {
        changes.push("disabled_by".to_string());
    }
    if old.name != new.name {
        changes.push("name".to_string());
    }
    changes
}
