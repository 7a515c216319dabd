//! Presence-driven light control for one area

use std::sync::{Arc, Mutex, Weak};

use hub_core::events::CallServiceData;
use hub_core::{Context, EntityId};
use hub_host::registry::AreaEntry;
use hub_host::{Hub, TrackHandle};
use serde_json::json;
use tracing::{debug, info};

use crate::calc::parse_bool;

struct LightInner {
    watch: Option<TrackHandle>,
    /// Last command sent, to suppress repeats on unchanged presence
    last_command: Option<bool>,
}

/// Switches an area's lights with the presence aggregate
///
/// Follows one binary entity and issues `light.turn_on` / `light.turn_off`
/// service calls targeting the whole area. Values that do not coerce to a
/// boolean (including `unavailable`) leave the lights untouched.
pub struct LightController {
    hub: Arc<Hub>,
    area: Arc<AreaEntry>,
    presence_entity: EntityId,
    inner: Mutex<LightInner>,
}

impl LightController {
    pub fn new(hub: Arc<Hub>, area: Arc<AreaEntry>, presence_entity: EntityId) -> Arc<Self> {
        Arc::new(Self {
            hub,
            area,
            presence_entity,
            inner: Mutex::new(LightInner {
                watch: None,
                last_command: None,
            }),
        })
    }

    /// Subscribe to the presence entity and apply its current value
    pub fn start(self: &Arc<Self>) {
        info!(
            area = %self.area.name,
            presence_entity = %self.presence_entity,
            "light control enabled"
        );

        let weak: Weak<LightController> = Arc::downgrade(self);
        let watch = self.hub.states.track(
            [self.presence_entity.to_string()],
            Arc::new(move |data| {
                let Some(controller) = weak.upgrade() else {
                    return;
                };
                if let Some(state) = &data.new_state {
                    controller.apply(&state.state);
                }
            }),
        );

        if let Ok(mut inner) = self.inner.lock() {
            inner.watch = Some(watch);
        }
        if let Some(state) = self.hub.states.get(self.presence_entity.as_str()) {
            self.apply(&state.state);
        }
    }

    pub fn stop(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if let Some(watch) = inner.watch.take() {
            watch.cancel();
        }
    }

    fn apply(&self, raw: &str) {
        let Some(presence) = parse_bool(raw) else {
            debug!(area = %self.area.name, raw, "presence value not boolean, ignoring");
            return;
        };

        {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if inner.last_command == Some(presence) {
                return;
            }
            inner.last_command = Some(presence);
        }

        let service = if presence { "turn_on" } else { "turn_off" };
        info!(area = %self.area.name, service, "switching area lights");
        self.hub.bus.fire_typed(
            CallServiceData {
                domain: "light".to_string(),
                service: service.to_string(),
                service_data: json!({ "area_id": self.area.id }),
            },
            Context::new(),
        );
    }
}
