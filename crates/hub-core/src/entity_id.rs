//! Entity ID type representing a `domain.object_id` pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain '{0}' is not a valid slug")]
    InvalidDomain(String),

    #[error("object_id '{0}' is not a valid slug")]
    InvalidObjectId(String),
}

/// An entity address of the form `domain.object_id` (e.g. `sensor.kitchen_temperature`)
///
/// Both parts must be lowercase alphanumeric with underscores and may not
/// start or end with an underscore. Stored as a single string with the
/// separator position, so `Display` and map keys are allocation-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    id: String,
    sep: usize,
}

impl EntityId {
    /// Create an EntityId from its two parts
    pub fn new(
        domain: impl AsRef<str>,
        object_id: impl AsRef<str>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.as_ref();
        let object_id = object_id.as_ref();

        if !is_valid_slug(domain) || domain.contains("__") {
            return Err(EntityIdError::InvalidDomain(domain.to_string()));
        }
        if !is_valid_slug(object_id) {
            return Err(EntityIdError::InvalidObjectId(object_id.to_string()));
        }

        Ok(Self {
            id: format!("{domain}.{object_id}"),
            sep: domain.len(),
        })
    }

    /// The domain part (e.g. "sensor")
    pub fn domain(&self) -> &str {
        &self.id[..self.sep]
    }

    /// The object_id part (e.g. "kitchen_temperature")
    pub fn object_id(&self) -> &str {
        &self.id[self.sep + 1..]
    }

    /// The full `domain.object_id` string
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

/// Lowercase alphanumeric + underscore, no leading/trailing underscore
fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => {
                Self::new(domain, object_id)
            }
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.id
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl PartialEq<str> for EntityId {
    fn eq(&self, other: &str) -> bool {
        self.id == other
    }
}
