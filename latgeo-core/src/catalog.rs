use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CATALOG_JSON: &str = include_str!("../catalog/default.json");

/// A reference node with a known position. Catalog records are never
/// mutated; measured latency lives on the `Measurement` built from a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceNode {
    pub name: String,
    pub address: String,
    pub country: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

/// Ordered, immutable set of reference nodes loaded once per process.
///
/// Coordinates are not range-checked and duplicate addresses are kept.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    nodes: Vec<ReferenceNode>,
}

impl Catalog {
    pub fn new(nodes: Vec<ReferenceNode>) -> Self {
        Self { nodes }
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(DEFAULT_CATALOG_JSON, "built-in catalog")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data, &path.display().to_string())
    }

    fn from_json(data: &str, what: &str) -> Result<Self, ConfigError> {
        let nodes: Vec<ReferenceNode> =
            serde_json::from_str(data).map_err(|source| ConfigError::Parse {
                what: what.to_string(),
                source,
            })?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[ReferenceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses_in_order() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.len() > 100);
        let first = &catalog.nodes()[0];
        assert_eq!(first.name, "Cloudflare");
        assert_eq!(first.address, "1.1.1.1");
        assert_eq!(first.city, "Paris");
    }

    #[test]
    fn builtin_catalog_coordinates_are_in_range() {
        let catalog = Catalog::builtin().unwrap();
        for node in catalog.nodes() {
            assert!((-90.0..=90.0).contains(&node.lat), "{}", node.name);
            assert!((-180.0..=180.0).contains(&node.lon), "{}", node.name);
        }
    }

    #[test]
    fn duplicates_are_kept() {
        let json = r#"[
            {"name": "a", "address": "8.8.4.4", "country": "X", "city": "Y", "lat": 1.0, "lon": 2.0},
            {"name": "b", "address": "8.8.4.4", "country": "X", "city": "Y", "lat": 1.0, "lon": 2.0}
        ]"#;
        let catalog = Catalog::from_json(json, "test").unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn malformed_catalog_is_a_parse_error() {
        let err = Catalog::from_json("[{\"name\": 1}]", "test").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Catalog::load("/nonexistent/latgeo/catalog.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
