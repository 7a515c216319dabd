//! Resolving which entities feed an area's aggregates

use std::collections::BTreeSet;

use hub_host::Hub;
use tracing::trace;

use crate::kind::AggregateKind;
use crate::DOMAIN;

/// Domains an aggregate may draw contributors from
pub const AGGREGATE_DOMAINS: [&str; 2] = ["sensor", "binary_sensor"];

/// Resolve the contributor set of one aggregate in one area
///
/// An entity contributes when it lives in the area (directly, or through its
/// device), carries a matching device class, is enabled, and is not excluded
/// by configuration. Entities published by this integration never feed back
/// into an aggregate. An entity whose current state is `unavailable` is left
/// out until the next membership resolution.
pub fn eligible_entities(
    hub: &Hub,
    area_id: &str,
    kind: AggregateKind,
    exclusions: &[String],
) -> BTreeSet<String> {
    let mut members = BTreeSet::new();

    for entry in hub.entities.all() {
        if entry.platform == DOMAIN {
            continue;
        }
        if !AGGREGATE_DOMAINS.contains(&entry.domain()) {
            continue;
        }
        if entry.is_disabled() {
            continue;
        }

        let resolved_area = entry.area_id.clone().or_else(|| {
            entry
                .device_id
                .as_deref()
                .and_then(|device_id| hub.devices.get(device_id))
                .and_then(|device| device.area_id.clone())
        });
        if resolved_area.as_deref() != Some(area_id) {
            continue;
        }

        let Some(device_class) = entry.resolved_device_class() else {
            continue;
        };
        if !kind.matches_class(device_class) {
            continue;
        }

        if exclusions.iter().any(|e| e == &entry.entity_id) {
            trace!(entity_id = %entry.entity_id, %kind, "entity excluded by options");
            continue;
        }

        if hub
            .states
            .get(&entry.entity_id)
            .is_some_and(|s| s.is_unavailable())
        {
            trace!(entity_id = %entry.entity_id, %kind, "entity unavailable, skipping");
            continue;
        }

        members.insert(entry.entity_id.clone());
    }

    members
}
