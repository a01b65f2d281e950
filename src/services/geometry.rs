//! Zone geometry store with cross-resolution rescaling
//!
//! Holds every monitored zone in one shared coordinate space. Zones are
//! authored at a reference resolution; when frames arrive at a different
//! resolution the whole set is rescaled together from the reference points.

use crate::domain::types::{Point, Resolution};
use crate::domain::zone::{ConfigError, Zone, ZoneDefinition};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct GeometryStore {
    /// Zones in definition order
    zones: Vec<Zone>,
    /// Resolution the reference points were authored at
    original_resolution: Option<Resolution>,
    /// Resolution the current polygons are expressed in
    target_resolution: Option<Resolution>,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store and load `definitions` in one step
    pub fn with_zones(
        definitions: Vec<ZoneDefinition>,
        reference_resolution: Resolution,
    ) -> Result<Self, ConfigError> {
        let mut store = Self::new();
        store.load_zones(definitions, reference_resolution)?;
        Ok(store)
    }

    /// Replace the full zone set.
    ///
    /// The set is validated as a whole before anything is replaced, so a
    /// failed load leaves the previous zones intact. If a target resolution
    /// was already set, the new zones are scaled to it immediately.
    pub fn load_zones(
        &mut self,
        definitions: Vec<ZoneDefinition>,
        reference_resolution: Resolution,
    ) -> Result<(), ConfigError> {
        if reference_resolution.is_degenerate() {
            return Err(ConfigError::InvalidResolution(reference_resolution));
        }

        let mut zones = Self::build_zones(definitions)?;

        if let Some(target) = self.target_resolution {
            for zone in &mut zones {
                zone.rescale(reference_resolution, target);
            }
        }

        info!(
            zones = %zones.len(),
            reference_resolution = %reference_resolution,
            "zones_loaded"
        );

        self.zones = zones;
        self.original_resolution = Some(reference_resolution);
        Ok(())
    }

    /// Replace the full zone set with polygons already in frame coordinates.
    ///
    /// The reference resolution is adopted from the current target, or from
    /// the first target set afterwards; later resolution changes rescale
    /// relative to it.
    pub fn load_zones_unscaled(
        &mut self,
        definitions: Vec<ZoneDefinition>,
    ) -> Result<(), ConfigError> {
        let zones = Self::build_zones(definitions)?;
        info!(zones = %zones.len(), "zones_loaded_unscaled");

        self.zones = zones;
        self.original_resolution = self.target_resolution;
        Ok(())
    }

    fn build_zones(definitions: Vec<ZoneDefinition>) -> Result<Vec<Zone>, ConfigError> {
        let mut seen = HashSet::with_capacity(definitions.len());
        let mut zones = Vec::with_capacity(definitions.len());
        for def in definitions {
            if !seen.insert(def.id.clone()) {
                return Err(ConfigError::DuplicateZone(def.id));
            }
            zones.push(Zone::from_definition(def)?);
        }
        Ok(zones)
    }

    /// Rescale every zone to `resolution`. No-op if it is already the target.
    pub fn set_target_resolution(&mut self, resolution: Resolution) -> Result<(), ConfigError> {
        if self.target_resolution == Some(resolution) {
            return Ok(());
        }
        if resolution.is_degenerate() {
            return Err(ConfigError::InvalidResolution(resolution));
        }

        let previous = self.target_resolution.replace(resolution);

        if let Some(original) = self.original_resolution {
            for zone in &mut self.zones {
                zone.rescale(original, resolution);
            }
            info!(
                from = %original,
                to = %resolution,
                previous = ?previous.map(|r| r.to_string()),
                zones = %self.zones.len(),
                "zones_rescaled"
            );
        } else if !self.zones.is_empty() {
            self.original_resolution = Some(resolution);
            info!(reference_resolution = %resolution, "zones_reference_adopted");
        } else {
            debug!(to = %resolution, "target_resolution_set_without_zones");
        }
        Ok(())
    }

    /// Ids of every zone strictly containing `point`, in definition order
    pub fn membership(&self, point: Point) -> Vec<&str> {
        self.zones.iter().filter(|z| z.contains(point)).map(Zone::id).collect()
    }

    /// True if `point` is inside at least one zone
    pub fn in_any_zone(&self, point: Point) -> bool {
        self.zones.iter().any(|z| z.contains(point))
    }

    /// All zone ids in definition order
    pub fn zone_ids(&self) -> Vec<String> {
        self.zones.iter().map(|z| z.id().to_string()).collect()
    }

    pub fn zone(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id() == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    #[inline]
    pub fn original_resolution(&self) -> Option<Resolution> {
        self.original_resolution
    }

    #[inline]
    pub fn target_resolution(&self) -> Option<Resolution> {
        self.target_resolution
    }
}
