//! Zones file loader
//!
//! JSON produced by the zone authoring tool:
//! `{"metadata": {"resolution": [w, h]}, "zones": [{"name": .., "points": [[x, y], ..], "color": [b, g, r]}]}`
//! Colors are presentation-only and ignored here. Coordinates may be written
//! as floats; they are truncated toward zero.

use crate::domain::types::{Point, Resolution};
use crate::domain::zone::{ConfigError, ZoneDefinition};
use crate::services::geometry::GeometryStore;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

fn default_zone_name() -> String {
    "Zone".to_string()
}

#[derive(Debug, Deserialize)]
struct ZonesJson {
    #[serde(default)]
    metadata: Option<MetadataJson>,
    #[serde(default)]
    zones: Vec<ZoneJson>,
}

#[derive(Debug, Deserialize)]
struct MetadataJson {
    #[serde(default)]
    resolution: Option<[u32; 2]>,
}

#[derive(Debug, Deserialize)]
struct ZoneJson {
    #[serde(default = "default_zone_name")]
    name: String,
    #[serde(default)]
    points: Vec<[f64; 2]>,
}

/// Parsed zones file
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneFile {
    pub definitions: Vec<ZoneDefinition>,
    /// Resolution the points were authored at, if recorded
    pub resolution: Option<Resolution>,
}

impl ZoneFile {
    /// Read and parse a zones file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read zones file {}", path.display()))?;
        let file = Self::parse(&content)
            .with_context(|| format!("Failed to parse zones file {}", path.display()))?;

        info!(
            path = %path.display(),
            zones = %file.definitions.len(),
            resolution = ?file.resolution.map(|r| r.to_string()),
            "zones_file_loaded"
        );
        Ok(file)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let raw: ZonesJson = serde_json::from_str(content)?;

        let definitions = raw
            .zones
            .into_iter()
            .map(|z| {
                let points = z.points.into_iter().map(|[x, y]| Point::new(x as i32, y as i32));
                ZoneDefinition::new(z.name, points)
            })
            .collect();
        let resolution = raw.metadata.and_then(|m| m.resolution).map(Resolution::from);

        Ok(Self { definitions, resolution })
    }

    /// Build the geometry store. Without a recorded resolution the points are
    /// taken as frame coordinates.
    pub fn into_store(self) -> Result<GeometryStore, ConfigError> {
        match self.resolution {
            Some(resolution) => GeometryStore::with_zones(self.definitions, resolution),
            None => {
                let mut store = GeometryStore::new();
                store.load_zones_unscaled(self.definitions)?;
                Ok(store)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "metadata": {"resolution": [1920, 1080]},
        "zones": [
            {"name": "entrance", "points": [[100, 100], [500, 100], [500, 500], [100, 500]], "color": [0, 255, 0]},
            {"name": "counter", "points": [[600.7, 100.2], [900, 100], [900, 400]]}
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let file = ZoneFile::parse(SAMPLE).unwrap();
        assert_eq!(file.resolution, Some(Resolution::new(1920, 1080)));
        assert_eq!(file.definitions.len(), 2);
        assert_eq!(file.definitions[0].id, "entrance");
        assert_eq!(file.definitions[1].points[0], Point::new(600, 100));
    }

    #[test]
    fn test_missing_metadata_and_name_defaults() {
        let file = ZoneFile::parse(r#"{"zones": [{"points": [[0, 0], [10, 0], [10, 10]]}]}"#).unwrap();
        assert_eq!(file.resolution, None);
        assert_eq!(file.definitions[0].id, "Zone");

        let store = file.into_store().unwrap();
        assert!(store.in_any_zone(Point::new(8, 2)));
    }

    #[test]
    fn test_null_resolution_is_absent() {
        let file = ZoneFile::parse(r#"{"metadata": {"resolution": null}, "zones": []}"#).unwrap();
        assert_eq!(file.resolution, None);
        assert!(file.definitions.is_empty());
    }

    #[test]
    fn test_degenerate_zone_fails_store_build() {
        let file = ZoneFile::parse(r#"{"zones": [{"name": "line", "points": [[0, 0], [5, 5]]}]}"#).unwrap();
        assert!(matches!(file.into_store(), Err(ConfigError::DegeneratePolygon { .. })));
    }

    #[test]
    fn test_load_from_disk() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(SAMPLE.as_bytes()).unwrap();

        let store = ZoneFile::load(tmp.path()).unwrap().into_store().unwrap();
        assert_eq!(store.zone_ids(), vec!["entrance".to_string(), "counter".to_string()]);
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let err = ZoneFile::load("/nonexistent/zones.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/zones.json"));
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(ZoneFile::parse("{\"zones\": [").is_err());
    }
}
