//! Per-area configuration options

use hub_host::ConfigEntry;
use serde::Deserialize;

use crate::kind::AggregateKind;

/// Config entry data key holding the managed area id
pub const CONF_AREA_ID: &str = "area_id";

/// Options snapshot for one managed area
///
/// Decoded from the config entry's options on every (re)load; a change in
/// the host's options store only takes effect through a full reload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AreaOptions {
    /// Calculation strategy overrides, keyed like the original option names
    pub illuminance_calculation: Option<String>,
    pub temperature_calculation: Option<String>,
    pub humidity_calculation: Option<String>,
    pub presence_calculation: Option<String>,

    /// Entities never considered for the respective aggregate
    pub excluded_illuminance_entities: Vec<String>,
    pub excluded_temperature_entities: Vec<String>,
    pub excluded_humidity_entities: Vec<String>,
    pub excluded_presence_entities: Vec<String>,

    /// Drive area lights from the presence aggregate
    pub light_control: bool,
}

impl AreaOptions {
    /// Decode the options snapshot of a config entry
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> = entry
            .options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map))
    }

    /// The configured calculation strategy key, if overridden
    pub fn calculation_override(&self, kind: AggregateKind) -> Option<&str> {
        match kind {
            AggregateKind::Illuminance => self.illuminance_calculation.as_deref(),
            AggregateKind::Temperature => self.temperature_calculation.as_deref(),
            AggregateKind::Humidity => self.humidity_calculation.as_deref(),
            AggregateKind::Presence => self.presence_calculation.as_deref(),
        }
    }

    /// Excluded entity ids for one aggregate kind
    pub fn exclusions(&self, kind: AggregateKind) -> &[String] {
        match kind {
            AggregateKind::Illuminance => &self.excluded_illuminance_entities,
            AggregateKind::Temperature => &self.excluded_temperature_entities,
            AggregateKind::Humidity => &self.excluded_humidity_entities,
            AggregateKind::Presence => &self.excluded_presence_entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_on_empty_options() {
        let entry = ConfigEntry::new("auto_areas", "Office");
        let options = AreaOptions::from_entry(&entry).unwrap();

        assert!(options.calculation_override(AggregateKind::Humidity).is_none());
        assert!(options.exclusions(AggregateKind::Temperature).is_empty());
        assert!(!options.light_control);
    }

    #[test]
    fn test_decoding_known_keys() {
        let entry = ConfigEntry::new("auto_areas", "Office").with_options(HashMap::from([
            ("temperature_calculation".to_string(), json!("median")),
            (
                "excluded_humidity_entities".to_string(),
                json!(["sensor.bathroom_mirror"]),
            ),
            ("light_control".to_string(), json!(true)),
        ]));
        let options = AreaOptions::from_entry(&entry).unwrap();

        assert_eq!(
            options.calculation_override(AggregateKind::Temperature),
            Some("median")
        );
        assert_eq!(
            options.exclusions(AggregateKind::Humidity),
            ["sensor.bathroom_mirror".to_string()]
        );
        assert!(options.light_control);
    }
}
