//! One managed area: aggregates plus optional light control

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use hub_core::events::{EntityRegistryUpdatedData, RegistryAction};
use hub_host::registry::AreaEntry;
use hub_host::{ConfigEntry, Hub, Issue, IssueSeverity};
use tracing::{info, warn};

use crate::config::{AreaOptions, CONF_AREA_ID};
use crate::kind::AggregateKind;
use crate::light::LightController;
use crate::membership::eligible_entities;
use crate::tracker::AggregateTracker;
use crate::{SetupError, DOMAIN};

/// Everything the integration runs for one config entry
///
/// Built from the entry's data and options snapshot. When the configured
/// area no longer exists the instance stays inert: a repair issue is raised
/// and [`AutoArea::initialize`] does nothing.
pub struct AutoArea {
    hub: Arc<Hub>,
    entry: ConfigEntry,
    options: AreaOptions,
    area: Option<Arc<AreaEntry>>,
    trackers: RwLock<Vec<Arc<AggregateTracker>>>,
    light: RwLock<Option<Arc<LightController>>>,
}

impl AutoArea {
    pub fn new(hub: Arc<Hub>, entry: ConfigEntry) -> Arc<Self> {
        let options = AreaOptions::from_entry(&entry).unwrap_or_else(|err| {
            warn!(entry_id = %entry.entry_id, %err, "undecodable options, using defaults");
            AreaOptions::default()
        });

        let area = entry
            .data
            .get(CONF_AREA_ID)
            .and_then(|v| v.as_str())
            .and_then(|area_id| hub.areas.get(area_id));

        let issue_id = format!("invalid_area_{}", entry.entry_id);
        match &area {
            Some(area) => {
                hub.issues.delete(DOMAIN, &issue_id);
                info!(entry_id = %entry.entry_id, area = %area.name, "managing area");
            }
            None => {
                warn!(entry_id = %entry.entry_id, "configured area does not exist");
                hub.issues.create(Issue {
                    domain: DOMAIN.to_string(),
                    issue_id,
                    severity: IssueSeverity::Error,
                    is_fixable: true,
                    is_persistent: true,
                    translation_key: Some("invalid_area".to_string()),
                });
            }
        }

        Arc::new(Self {
            hub,
            entry,
            options,
            area,
            trackers: RwLock::new(Vec::new()),
            light: RwLock::new(None),
        })
    }

    pub fn area(&self) -> Option<&Arc<AreaEntry>> {
        self.area.as_ref()
    }

    pub fn entry_id(&self) -> &str {
        &self.entry.entry_id
    }

    /// Build and start one aggregate per kind, plus light control if enabled
    pub fn initialize(self: &Arc<Self>) -> Result<(), SetupError> {
        let Some(area) = &self.area else {
            return Ok(());
        };

        let mut trackers = Vec::with_capacity(AggregateKind::ALL.len());
        for kind in AggregateKind::ALL {
            let tracker = AggregateTracker::new(
                Arc::clone(&self.hub),
                &self.entry,
                Arc::clone(area),
                &self.options,
                kind,
            )?;
            tracker.resync(self.valid_entities(kind));
            trackers.push(tracker);
        }

        if self.options.light_control {
            let presence = trackers
                .iter()
                .find(|t| t.kind() == AggregateKind::Presence)
                .map(|t| t.entity_id().clone());
            if let Some(presence_entity) = presence {
                let controller =
                    LightController::new(Arc::clone(&self.hub), Arc::clone(area), presence_entity);
                controller.start();
                if let Ok(mut slot) = self.light.write() {
                    *slot = Some(controller);
                }
            }
        }

        if let Ok(mut slot) = self.trackers.write() {
            *slot = trackers;
        }
        Ok(())
    }

    /// Contributor set one aggregate should track right now
    pub fn valid_entities(&self, kind: AggregateKind) -> BTreeSet<String> {
        match &self.area {
            Some(area) => {
                eligible_entities(&self.hub, &area.id, kind, self.options.exclusions(kind))
            }
            None => BTreeSet::new(),
        }
    }

    /// React to an entity registry mutation
    ///
    /// Updates that do not move an entity between areas are ignored; every
    /// other mutation re-resolves membership for all aggregates. Unchanged
    /// sets fall through as no-ops inside the tracker.
    pub fn handle_registry_update(&self, data: &EntityRegistryUpdatedData) {
        if data.action == RegistryAction::Update
            && !data.changes.iter().any(|c| c == "area_id")
        {
            return;
        }

        let trackers = self
            .trackers
            .read()
            .map(|t| t.clone())
            .unwrap_or_default();
        for tracker in trackers {
            tracker.resync(self.valid_entities(tracker.kind()));
        }
    }

    /// Stop all aggregates and light control
    pub fn teardown(&self) {
        if let Ok(mut slot) = self.light.write() {
            if let Some(controller) = slot.take() {
                controller.stop();
            }
        }
        if let Ok(mut trackers) = self.trackers.write() {
            for tracker in trackers.drain(..) {
                tracker.stop();
            }
        }
        info!(entry_id = %self.entry.entry_id, "area torn down");
    }

    /// Snapshot of the running aggregates
    pub fn trackers(&self) -> Vec<Arc<AggregateTracker>> {
        self.trackers
            .read()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}
