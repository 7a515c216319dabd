//! Config entries
//!
//! A config entry is one configured instance of an integration: immutable
//! `data` plus user-tunable `options`. Options changes produce a new
//! snapshot; the owning integration reloads to pick it up.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    /// Not yet set up, or unloaded
    #[default]
    NotLoaded,
    /// Successfully set up
    Loaded,
    /// Setup failed
    SetupError,
}

/// One configured instance of an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (e.g. "auto_areas")
    pub domain: String,

    /// Human-readable title
    pub title: String,

    /// Immutable configuration data
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// User-configurable options; snapshot valid until the next reload
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    /// Lifecycle state (not persisted)
    #[serde(skip, default)]
    pub state: ConfigEntryState,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            state: ConfigEntryState::NotLoaded,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_options(mut self, options: HashMap<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }
}

/// Store of all config entries, keyed by entry id
pub struct ConfigEntries {
    entries: DashMap<String, ConfigEntry>,
}

impl ConfigEntries {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn add(&self, entry: ConfigEntry) {
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|e| e.clone())
    }

    pub fn remove(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.remove(entry_id).map(|(_, e)| e)
    }

    pub fn set_state(&self, entry_id: &str, state: ConfigEntryState) {
        if let Some(mut entry) = self.entries.get_mut(entry_id) {
            entry.state = state;
        }
    }

    /// Replace an entry's options snapshot
    ///
    /// Returns the updated entry; the caller is expected to reload it.
    pub fn update_options(
        &self,
        entry_id: &str,
        options: HashMap<String, serde_json::Value>,
    ) -> Option<ConfigEntry> {
        let mut entry = self.entries.get_mut(entry_id)?;
        entry.options = options;
        entry.modified_at = Utc::now();
        info!(entry_id, "config entry options updated");
        Some(entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConfigEntries {
    fn default() -> Self {
        Self::new()
    }
}
