//! The hub façade owning bus, states, registries, and entries

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hub_core::events::HubStartedData;
use hub_core::Context;
use tracing::info;

use crate::bus::EventBus;
use crate::entries::ConfigEntries;
use crate::issues::IssueRegistry;
use crate::registry::{AreaRegistry, DeviceRegistry, EntityRegistry};
use crate::states::StateMachine;

/// Hub-wide configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Unit all temperatures are published in
    pub temperature_unit: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            temperature_unit: "°C".to_string(),
        }
    }
}

/// The running hub: everything a component needs to interact with the host
pub struct Hub {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateMachine>,
    pub areas: Arc<AreaRegistry>,
    pub devices: Arc<DeviceRegistry>,
    pub entities: Arc<EntityRegistry>,
    pub entries: Arc<ConfigEntries>,
    pub issues: Arc<IssueRegistry>,
    pub config: HubConfig,
    running: AtomicBool,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        Arc::new(Self {
            states: Arc::new(StateMachine::new(Arc::clone(&bus))),
            areas: Arc::new(AreaRegistry::new()),
            devices: Arc::new(DeviceRegistry::new()),
            entities: Arc::new(EntityRegistry::new(Arc::clone(&bus))),
            entries: Arc::new(ConfigEntries::new()),
            issues: Arc::new(IssueRegistry::new()),
            config: HubConfig::default(),
            running: AtomicBool::new(false),
            bus,
        })
    }

    /// Whether startup has completed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the hub as started and notify subscribers
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("hub started");
        self.bus.fire_typed(HubStartedData {}, Context::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_fires_once() {
        let hub = Hub::new();
        let mut rx = hub.bus.subscribe_typed::<HubStartedData>();

        assert!(!hub.is_running());
        hub.start();
        hub.start();
        assert!(hub.is_running());

        rx.recv().await.unwrap();
        // Second start must not fire again
        let mut raw = hub.bus.subscribe(hub_core::events::HUB_STARTED);
        hub.start();
        assert!(raw.try_recv().is_err());
    }
}
