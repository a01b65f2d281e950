//! Domain models - geometry types and zone polygons
//!
//! This module contains the canonical data types used throughout the system:
//! - `Point` / `Resolution` - frame coordinates and frame sizes
//! - `Zone` - a named monitored polygon with strict-interior containment
//! - `ConfigError` - malformed zone geometry

pub mod types;
pub mod zone;

pub use types::{Point, Resolution};
pub use zone::{ConfigError, Zone, ZoneDefinition};
