//! Area registry

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A registered area (room, zone)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaEntry {
    /// Internal id (ULID)
    pub id: String,

    /// Display name (e.g. "Living Room")
    pub name: String,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AreaEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Registry of all areas, indexed by id and by normalized name
pub struct AreaRegistry {
    by_id: DashMap<String, Arc<AreaEntry>>,
    by_name: DashMap<String, String>,
}

impl AreaRegistry {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_name: DashMap::new(),
        }
    }

    /// Create a new area
    pub fn create(&self, name: &str) -> Arc<AreaEntry> {
        let entry = Arc::new(AreaEntry::new(name));
        info!(area_id = %entry.id, name, "created area");
        self.by_name.insert(normalize_name(name), entry.id.clone());
        self.by_id.insert(entry.id.clone(), Arc::clone(&entry));
        entry
    }

    pub fn get(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        self.by_id.get(area_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<AreaEntry>> {
        self.by_name
            .get(&normalize_name(name))
            .and_then(|id| self.get(&id))
    }

    pub fn remove(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        let (_, entry) = self.by_id.remove(area_id)?;
        self.by_name.remove(&normalize_name(&entry.name));
        info!(area_id, "removed area");
        Some(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<AreaEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for AreaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ', "")
}
