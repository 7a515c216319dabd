//! Aggregate entity tracking a set of contributors in one area

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Weak};

use hub_core::events::StateChangedData;
use hub_core::{Context, EntityId, State, STATE_UNKNOWN};
use hub_host::registry::{AreaEntry, DeviceEntry};
use hub_host::{ConfigEntry, Hub, TrackHandle};
use indexmap::IndexMap;
use serde_json::json;
use tracing::{debug, error, info};

use crate::calc::{boolean_values, calculate, calculation_for, parse_bool, Calculation};
use crate::config::AreaOptions;
use crate::kind::{AggregateKind, ValueKind};
use crate::{slugify, SetupError, DOMAIN, NAME, VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Built but not yet registered or subscribed
    Uninitialized,
    Tracking,
    Stopped,
}

struct Inner {
    phase: Phase,
    members: BTreeSet<String>,
    /// Last usable state per member; members without a coercible value are absent
    snapshot: IndexMap<String, State>,
    watch: Option<TrackHandle>,
}

/// One aggregate entity for one area
///
/// Publishes `<domain>.aggregated_<kind>_<area>` and keeps it current by
/// recomputing on every tracked state change. Membership is pushed in from
/// the outside through [`AggregateTracker::resync`]; the tracker itself only
/// reacts to state writes.
pub struct AggregateTracker {
    hub: Arc<Hub>,
    area: Arc<AreaEntry>,
    entry_id: String,
    kind: AggregateKind,
    /// None when the configured strategy key is unknown; the aggregate then
    /// stays `unknown` instead of failing setup
    calculation: Option<Calculation>,
    entity_id: EntityId,
    unique_id: String,
    inner: Mutex<Inner>,
}

impl AggregateTracker {
    pub fn new(
        hub: Arc<Hub>,
        entry: &ConfigEntry,
        area: Arc<AreaEntry>,
        options: &AreaOptions,
        kind: AggregateKind,
    ) -> Result<Arc<Self>, SetupError> {
        let calculation = match calculation_for(options, kind) {
            Ok(calculation) => Some(calculation),
            Err(err) => {
                error!(%kind, area = %area.name, %err, "aggregate will stay unknown");
                None
            }
        };
        let base = format!(
            "{}.aggregated_{}_{}",
            kind.published_domain(),
            kind.as_str(),
            slugify(&area.name)
        );
        let unique_id = format!("{}_aggregated_{}", entry.entry_id, kind.published_device_class());
        let entity_id = resolve_entity_id(&hub, &base, &unique_id)?;

        Ok(Arc::new(Self {
            hub,
            area,
            entry_id: entry.entry_id.clone(),
            kind,
            calculation,
            entity_id,
            unique_id,
            inner: Mutex::new(Inner {
                phase: Phase::Uninitialized,
                members: BTreeSet::new(),
                snapshot: IndexMap::new(),
                watch: None,
            }),
        }))
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Current contributor set
    pub fn members(&self) -> BTreeSet<String> {
        self.inner
            .lock()
            .map(|inner| inner.members.clone())
            .unwrap_or_default()
    }

    /// Apply a new contributor set
    ///
    /// Identical sets are a no-op, so repeated registry sweeps do not churn
    /// the subscription. Otherwise the snapshot is reseeded from the state
    /// machine, the watcher is replaced, and the aggregate is republished.
    pub fn resync(self: &Arc<Self>, members: BTreeSet<String>) {
        let rendered = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            match inner.phase {
                Phase::Stopped => return,
                Phase::Tracking if inner.members == members => {
                    debug!(entity_id = %self.entity_id, "membership unchanged");
                    return;
                }
                Phase::Uninitialized => self.register(),
                Phase::Tracking => {}
            }

            info!(
                entity_id = %self.entity_id,
                kind = %self.kind,
                members = members.len(),
                "tracking entities"
            );

            if let Some(watch) = inner.watch.take() {
                watch.cancel();
            }

            inner.snapshot.clear();
            for member in &members {
                if let Some(state) = self.hub.states.get(member) {
                    if self.coercible(&state) {
                        inner.snapshot.insert(member.clone(), state);
                    }
                }
            }
            inner.members = members.clone();

            let weak: Weak<AggregateTracker> = Arc::downgrade(self);
            inner.watch = Some(self.hub.states.track(
                members,
                Arc::new(move |data| {
                    if let Some(tracker) = weak.upgrade() {
                        tracker.on_state_changed(data);
                    }
                }),
            ));
            inner.phase = Phase::Tracking;

            self.render(&inner)
        };

        self.publish(rendered);
    }

    /// Cancel the subscription and mark the published entity unavailable
    pub fn stop(&self) {
        {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if inner.phase != Phase::Tracking {
                return;
            }
            inner.phase = Phase::Stopped;
            if let Some(watch) = inner.watch.take() {
                watch.cancel();
            }
        }

        info!(entity_id = %self.entity_id, "stopped tracking");
        self.hub.states.set(
            self.entity_id.clone(),
            hub_core::STATE_UNAVAILABLE,
            std::collections::HashMap::new(),
            Context::new(),
        );
    }

    fn on_state_changed(&self, data: &StateChangedData) {
        let rendered = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if inner.phase != Phase::Tracking {
                return;
            }
            let key = data.entity_id.as_str();
            if !inner.members.contains(key) {
                return;
            }

            // A vanished or non-coercible value stops contributing
            match &data.new_state {
                Some(state) if self.coercible(state) => {
                    inner.snapshot.insert(key.to_string(), state.clone());
                }
                _ => {
                    inner.snapshot.shift_remove(key);
                }
            }

            self.render(&inner)
        };

        self.publish(rendered);
    }

    /// Whether a raw state can contribute to this aggregate's value kind
    fn coercible(&self, state: &State) -> bool {
        if !state.is_usable() {
            return false;
        }
        match self.kind.value_kind() {
            ValueKind::Numeric => state.state.parse::<f64>().is_ok(),
            ValueKind::Boolean => parse_bool(&state.state).is_some(),
        }
    }

    /// Create the owning device and the aggregate entity in the registries
    fn register(&self) {
        let device = self.hub.devices.get_or_create((DOMAIN, &self.entry_id), || {
            let mut device = DeviceEntry::new(NAME);
            device.manufacturer = Some(NAME.to_string());
            device.model = Some(VERSION.to_string());
            device.area_id = Some(self.area.id.clone());
            device
        });

        self.hub.entities.get_or_create(
            self.entity_id.as_str(),
            DOMAIN,
            &self.unique_id,
            |entry| {
                entry.device_id = Some(device.id.clone());
                entry.area_id = Some(self.area.id.clone());
                entry.original_device_class = Some(self.kind.published_device_class().to_string());
                entry.unit_of_measurement = self.kind.unit(&self.hub.config);
                entry.name = Some(format!("{}{}", self.kind.name_prefix(), self.area.name));
            },
        );
    }

    fn render(&self, inner: &Inner) -> (String, std::collections::HashMap<String, serde_json::Value>) {
        let states: Vec<State> = inner
            .members
            .iter()
            .filter_map(|m| inner.snapshot.get(m).cloned())
            .collect();
        let value_state = match self.calculation {
            Some(calculation) => calculate(calculation, &states).as_state(),
            None => STATE_UNKNOWN.to_string(),
        };

        let entities: serde_json::Map<String, serde_json::Value> = inner
            .members
            .iter()
            .map(|m| {
                let raw = inner
                    .snapshot
                    .get(m)
                    .map(|s| json!(s.state))
                    .unwrap_or(serde_json::Value::Null);
                (m.clone(), raw)
            })
            .collect();

        let mut attributes = std::collections::HashMap::new();
        attributes.insert("entities".to_string(), serde_json::Value::Object(entities));
        attributes.insert(
            "calculation".to_string(),
            self.calculation
                .map(|c| json!(c.key()))
                .unwrap_or(serde_json::Value::Null),
        );
        attributes.insert(
            "device_class".to_string(),
            json!(self.kind.published_device_class()),
        );
        if let Some(unit) = self.kind.unit(&self.hub.config) {
            attributes.insert("unit_of_measurement".to_string(), json!(unit));
        }
        if self.kind == AggregateKind::Presence {
            let values = boolean_values(&states);
            let num_true = values.iter().filter(|v| **v).count();
            attributes.insert("num_true".to_string(), json!(num_true));
            attributes.insert("num_false".to_string(), json!(values.len() - num_true));
        }

        (value_state, attributes)
    }

    fn publish(&self, rendered: (String, std::collections::HashMap<String, serde_json::Value>)) {
        let (state, attributes) = rendered;
        debug!(entity_id = %self.entity_id, state = %state, "publishing aggregate");
        self.hub
            .states
            .set(self.entity_id.clone(), state, attributes, Context::new());
    }
}

/// Pick the published entity id for an aggregate
///
/// A prior registration under the same unique id keeps its entity id. A base
/// id already taken by some other entity gets a numeric suffix, so two
/// entries managing identically-named areas publish side by side instead of
/// overwriting each other.
fn resolve_entity_id(hub: &Hub, base: &str, unique_id: &str) -> Result<EntityId, SetupError> {
    if let Some(existing) = hub.entities.get_by_unique_id(unique_id) {
        return Ok(existing.entity_id.parse()?);
    }
    if hub.entities.get(base).is_none() {
        return Ok(base.parse()?);
    }

    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if hub.entities.get(&candidate).is_none() {
            return Ok(candidate.parse()?);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_host::registry::EntityEntry;
    use std::collections::HashMap;

    struct Fixture {
        hub: Arc<Hub>,
        area: Arc<AreaEntry>,
        entry: ConfigEntry,
    }

    fn fixture() -> Fixture {
        let hub = Hub::new();
        let area = hub.areas.create("Living Room");
        let entry = ConfigEntry::new(DOMAIN, "Living Room");
        Fixture { hub, area, entry }
    }

    fn add_sensor(fx: &Fixture, entity_id: &str, device_class: &str, value: &str) {
        let mut entry = EntityEntry::new(entity_id, "demo");
        entry.original_device_class = Some(device_class.to_string());
        entry.area_id = Some(fx.area.id.clone());
        fx.hub.entities.create(entry);
        fx.hub.states.set(
            entity_id.parse().unwrap(),
            value,
            HashMap::new(),
            Context::new(),
        );
    }

    fn tracker(fx: &Fixture, kind: AggregateKind) -> Arc<AggregateTracker> {
        AggregateTracker::new(
            Arc::clone(&fx.hub),
            &fx.entry,
            Arc::clone(&fx.area),
            &AreaOptions::default(),
            kind,
        )
        .unwrap()
    }

    #[test]
    fn test_registers_device_and_entity_on_first_resync() {
        let fx = fixture();
        let tracker = tracker(&fx, AggregateKind::Temperature);
        tracker.resync(BTreeSet::new());

        let unique_id = format!("{}_aggregated_temperature", fx.entry.entry_id);
        let entity = fx.hub.entities.get_by_unique_id(&unique_id).unwrap();
        assert_eq!(entity.entity_id, "sensor.aggregated_temperature_living_room");
        assert_eq!(entity.platform, DOMAIN);
        assert_eq!(entity.area_id.as_deref(), Some(fx.area.id.as_str()));

        let device = fx.hub.devices.get(entity.device_id.as_deref().unwrap()).unwrap();
        assert_eq!(device.name, NAME);
        assert_eq!(device.area_id.as_deref(), Some(fx.area.id.as_str()));
    }

    #[test]
    fn test_publishes_on_resync_and_on_state_change() {
        let fx = fixture();
        add_sensor(&fx, "sensor.t1", "temperature", "20");
        add_sensor(&fx, "sensor.t2", "temperature", "24");

        let tracker = tracker(&fx, AggregateKind::Temperature);
        tracker.resync(BTreeSet::from([
            "sensor.t1".to_string(),
            "sensor.t2".to_string(),
        ]));

        let agg = "sensor.aggregated_temperature_living_room";
        assert_eq!(fx.hub.states.get_state(agg).as_deref(), Some("22"));

        fx.hub.states.set(
            "sensor.t1".parse().unwrap(),
            "30",
            HashMap::new(),
            Context::new(),
        );
        assert_eq!(fx.hub.states.get_state(agg).as_deref(), Some("27"));
    }

    #[test]
    fn test_untracked_changes_are_ignored() {
        let fx = fixture();
        add_sensor(&fx, "sensor.t1", "temperature", "20");
        add_sensor(&fx, "sensor.other", "temperature", "99");

        let tracker = tracker(&fx, AggregateKind::Temperature);
        tracker.resync(BTreeSet::from(["sensor.t1".to_string()]));

        fx.hub.states.set(
            "sensor.other".parse().unwrap(),
            "100",
            HashMap::new(),
            Context::new(),
        );
        assert_eq!(
            fx.hub
                .states
                .get_state("sensor.aggregated_temperature_living_room")
                .as_deref(),
            Some("20")
        );
    }

    #[test]
    fn test_empty_membership_is_unavailable() {
        let fx = fixture();
        let tracker = tracker(&fx, AggregateKind::Humidity);
        tracker.resync(BTreeSet::new());

        assert_eq!(
            fx.hub
                .states
                .get_state("sensor.aggregated_humidity_living_room")
                .as_deref(),
            Some("unavailable")
        );
    }

    #[test]
    fn test_presence_attributes_count_contributors() {
        let fx = fixture();
        add_sensor(&fx, "binary_sensor.m1", "motion", "on");
        add_sensor(&fx, "binary_sensor.m2", "occupancy", "off");

        let tracker = tracker(&fx, AggregateKind::Presence);
        tracker.resync(BTreeSet::from([
            "binary_sensor.m1".to_string(),
            "binary_sensor.m2".to_string(),
        ]));

        let state = fx
            .hub
            .states
            .get("binary_sensor.aggregated_presence_living_room")
            .unwrap();
        assert_eq!(state.state, "off");
        assert_eq!(state.attribute::<u32>("num_true"), Some(1));
        assert_eq!(state.attribute::<u32>("num_false"), Some(1));
        assert_eq!(
            state.attributes.get("calculation"),
            Some(&json!("all"))
        );
    }

    #[test]
    fn test_resync_with_identical_set_is_a_noop() {
        let fx = fixture();
        add_sensor(&fx, "sensor.t1", "temperature", "20");

        let tracker = tracker(&fx, AggregateKind::Temperature);
        let members = BTreeSet::from(["sensor.t1".to_string()]);
        tracker.resync(members.clone());

        let before = fx
            .hub
            .states
            .get("sensor.aggregated_temperature_living_room")
            .unwrap();
        tracker.resync(members.clone());
        let after = fx
            .hub
            .states
            .get("sensor.aggregated_temperature_living_room")
            .unwrap();

        assert_eq!(before.last_updated, after.last_updated);
        assert_eq!(tracker.members(), members);
    }

    #[test]
    fn test_stop_marks_unavailable_and_detaches() {
        let fx = fixture();
        add_sensor(&fx, "sensor.t1", "temperature", "20");

        let tracker = tracker(&fx, AggregateKind::Temperature);
        tracker.resync(BTreeSet::from(["sensor.t1".to_string()]));
        tracker.stop();
        tracker.stop();

        let agg = "sensor.aggregated_temperature_living_room";
        assert_eq!(fx.hub.states.get_state(agg).as_deref(), Some("unavailable"));

        fx.hub.states.set(
            "sensor.t1".parse().unwrap(),
            "25",
            HashMap::new(),
            Context::new(),
        );
        assert_eq!(fx.hub.states.get_state(agg).as_deref(), Some("unavailable"));
    }

    #[test]
    fn test_same_area_name_publishes_under_distinct_ids() {
        let fx = fixture();
        fx.hub.states.set(
            "sensor.t1".parse().unwrap(),
            "20",
            HashMap::new(),
            Context::new(),
        );

        let first = tracker(&fx, AggregateKind::Temperature);
        first.resync(BTreeSet::new());
        assert_eq!(
            first.entity_id().as_str(),
            "sensor.aggregated_temperature_living_room"
        );

        // A second entry managing an identically-named area
        let other_area = fx.hub.areas.create("Living Room");
        let other_entry = ConfigEntry::new(DOMAIN, "Living Room");
        let second = AggregateTracker::new(
            Arc::clone(&fx.hub),
            &other_entry,
            other_area,
            &AreaOptions::default(),
            AggregateKind::Temperature,
        )
        .unwrap();
        second.resync(BTreeSet::from(["sensor.t1".to_string()]));

        assert_eq!(
            second.entity_id().as_str(),
            "sensor.aggregated_temperature_living_room_2"
        );
        assert_eq!(
            fx.hub
                .states
                .get_state("sensor.aggregated_temperature_living_room_2")
                .as_deref(),
            Some("20")
        );
        // The first aggregate was not overwritten
        assert_eq!(
            fx.hub
                .states
                .get_state("sensor.aggregated_temperature_living_room")
                .as_deref(),
            Some("unavailable")
        );

        // Rebuilding against the original entry reuses its registration
        let rebuilt = tracker(&fx, AggregateKind::Temperature);
        assert_eq!(
            rebuilt.entity_id().as_str(),
            "sensor.aggregated_temperature_living_room"
        );
    }

    #[test]
    fn test_unparseable_value_stops_contributing() {
        let fx = fixture();
        add_sensor(&fx, "sensor.t1", "temperature", "20");

        let tracker = tracker(&fx, AggregateKind::Temperature);
        tracker.resync(BTreeSet::from(["sensor.t1".to_string()]));

        fx.hub.states.set(
            "sensor.t1".parse().unwrap(),
            "not-a-number",
            HashMap::new(),
            Context::new(),
        );

        let state = fx
            .hub
            .states
            .get("sensor.aggregated_temperature_living_room")
            .unwrap();
        assert_eq!(state.state, "unavailable");
        // The dropped member still shows up in diagnostics, without a value
        assert_eq!(
            state.attributes["entities"]["sensor.t1"],
            serde_json::Value::Null
        );
    }

    #[test]
    fn test_unknown_strategy_publishes_unknown() {
        let fx = fixture();
        add_sensor(&fx, "sensor.t1", "temperature", "20");

        let mut options = AreaOptions::default();
        options.temperature_calculation = Some("average".to_string());
        let tracker = AggregateTracker::new(
            Arc::clone(&fx.hub),
            &fx.entry,
            Arc::clone(&fx.area),
            &options,
            AggregateKind::Temperature,
        )
        .unwrap();
        tracker.resync(BTreeSet::from(["sensor.t1".to_string()]));

        let state = fx
            .hub
            .states
            .get("sensor.aggregated_temperature_living_room")
            .unwrap();
        assert_eq!(state.state, "unknown");
        assert_eq!(state.attributes["calculation"], serde_json::Value::Null);
    }

    #[test]
    fn test_member_removal_drops_its_value() {
        let fx = fixture();
        add_sensor(&fx, "sensor.t1", "temperature", "20");
        add_sensor(&fx, "sensor.t2", "temperature", "24");

        let tracker = tracker(&fx, AggregateKind::Temperature);
        tracker.resync(BTreeSet::from([
            "sensor.t1".to_string(),
            "sensor.t2".to_string(),
        ]));

        fx.hub
            .states
            .remove(&"sensor.t2".parse().unwrap(), Context::new());
        assert_eq!(
            fx.hub
                .states
                .get_state("sensor.aggregated_temperature_living_room")
                .as_deref(),
            Some("20")
        );
    }
}
