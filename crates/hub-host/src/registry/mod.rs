//! Area, device, and entity registries
//!
//! The registries are the source of truth for what exists in the home and
//! where it lives. They are in-memory and read-mostly; consumers query them
//! on demand rather than caching results.

mod area;
mod device;
mod entity;

pub use area::{AreaEntry, AreaRegistry};
pub use device::{DeviceEntry, DeviceRegistry};
pub use entity::{DisabledBy, EntityEntry, EntityRegistry};
