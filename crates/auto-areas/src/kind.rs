//! The device classes managed per area

use hub_host::HubConfig;

/// Device classes a presence aggregate is built from
pub const PRESENCE_DEVICE_CLASSES: [&str; 3] = ["motion", "occupancy", "presence"];

/// How raw states of a class are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Boolean,
}

/// One aggregate maintained per area
///
/// Each kind maps to the device classes it draws from, the value kind its
/// contributors must coerce to, and the shape of the published entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Illuminance,
    Temperature,
    Humidity,
    Presence,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 4] = [
        AggregateKind::Illuminance,
        AggregateKind::Temperature,
        AggregateKind::Humidity,
        AggregateKind::Presence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateKind::Illuminance => "illuminance",
            AggregateKind::Temperature => "temperature",
            AggregateKind::Humidity => "humidity",
            AggregateKind::Presence => "presence",
        }
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            AggregateKind::Presence => ValueKind::Boolean,
            _ => ValueKind::Numeric,
        }
    }

    /// Whether an entity with the given device class contributes to this aggregate
    pub fn matches_class(self, device_class: &str) -> bool {
        match self {
            AggregateKind::Presence => PRESENCE_DEVICE_CLASSES.contains(&device_class),
            _ => device_class == self.as_str(),
        }
    }

    /// Domain the aggregate entity is published under
    pub fn published_domain(self) -> &'static str {
        match self {
            AggregateKind::Presence => "binary_sensor",
            _ => "sensor",
        }
    }

    /// Device class the aggregate entity is published with
    pub fn published_device_class(self) -> &'static str {
        match self {
            AggregateKind::Presence => "occupancy",
            other => other.as_str(),
        }
    }

    /// Display-name prefix for the aggregate entity
    pub fn name_prefix(self) -> &'static str {
        match self {
            AggregateKind::Illuminance => "Illuminance ",
            AggregateKind::Temperature => "Temperature ",
            AggregateKind::Humidity => "Humidity ",
            AggregateKind::Presence => "Presence ",
        }
    }

    /// Unit of measurement for the published aggregate
    pub fn unit(self, config: &HubConfig) -> Option<String> {
        match self {
            AggregateKind::Illuminance => Some("lx".to_string()),
            AggregateKind::Temperature => Some(config.temperature_unit.clone()),
            AggregateKind::Humidity => Some("%".to_string()),
            AggregateKind::Presence => None,
        }
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
