//! Road network from a GeoJSON `FeatureCollection` of `LineString` features.
//!
//! Recognised feature properties:
//! - `speed_mps` or `speed_kmh`: free-flow speed, defaults to 50 km/h
//! - `width_m`: carriageway width
//! - `oneway`: only the digitised direction is traversable
//! - `elevations`: per-vertex elevations, otherwise the third coordinate
//! - `id`: provider id of the road, otherwise a running counter

use std::{fs::File, io::BufReader, path::Path};

use geo::{Coord, LineString, Point};
use hashbrown::HashMap;
use log::{info, warn};
use petgraph::graph::NodeIndex;
use serde::Deserialize;

use crate::{
    Error, Meters,
    model::{EdgeAttributes, GraphBuilder, RoadNetworkGraph},
};

const DEFAULT_SPEED: f64 = 50.0 / 3.6;
/// Endpoints closer than this many degrees (about a centimeter) are merged
const MERGE_PRECISION: f64 = 1e-7;

#[derive(Deserialize)]
struct RawCollection {
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<RawProperties>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    LineString { coordinates: Vec<Vec<f64>> },
    MultiLineString { coordinates: Vec<Vec<Vec<f64>>> },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawProperties {
    id: Option<u64>,
    speed_mps: Option<f64>,
    speed_kmh: Option<f64>,
    width_m: Option<f64>,
    oneway: Option<bool>,
    elevations: Option<Vec<f64>>,
}

impl RawProperties {
    fn speed(&self) -> f64 {
        self.speed_mps
            .or(self.speed_kmh.map(|kmh| kmh / 3.6))
            .unwrap_or(DEFAULT_SPEED)
    }
}

/// Reads a road network from a GeoJSON file
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a `FeatureCollection`
/// or yields no usable roads
pub fn load_geojson_network(path: impl AsRef<Path>) -> Result<RoadNetworkGraph, Error> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to open file '{}': {}", path.display(), e),
        )
    })?;
    info!("Loading road network from {}", path.display());
    let raw: RawCollection = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::GeoJsonError(e.to_string()))?;
    build_network(raw)
}

/// Same as [`load_geojson_network`] for an in-memory document
///
/// # Errors
///
/// Returns an error if the document is not a `FeatureCollection` or yields
/// no usable roads
pub fn network_from_geojson_str(document: &str) -> Result<RoadNetworkGraph, Error> {
    let raw: RawCollection =
        serde_json::from_str(document).map_err(|e| Error::GeoJsonError(e.to_string()))?;
    build_network(raw)
}

fn build_network(raw: RawCollection) -> Result<RoadNetworkGraph, Error> {
    let mut loader = Loader::default();

    for (idx, feature) in raw.features.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();
        match feature.geometry {
            Some(RawGeometry::LineString { coordinates }) => {
                loader.add_line(idx, &coordinates, &properties)?;
            }
            Some(RawGeometry::MultiLineString { coordinates }) => {
                for part in &coordinates {
                    loader.add_line(idx, part, &properties)?;
                }
            }
            Some(RawGeometry::Unsupported) | None => {
                loader.skipped += 1;
            }
        }
    }

    if loader.skipped > 0 {
        warn!("Skipped {} features without a usable line geometry", loader.skipped);
    }
    let graph = loader.builder.build()?;
    if graph.edge_count() == 0 {
        return Err(Error::InvalidNetwork("GeoJSON contains no roads".to_string()));
    }
    info!(
        "Loaded road network with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

#[derive(Default)]
struct Loader {
    builder: GraphBuilder,
    endpoints: HashMap<(i64, i64), NodeIndex>,
    next_node_id: u64,
    next_edge_id: u64,
    skipped: usize,
}

impl Loader {
    fn add_line(
        &mut self,
        feature: usize,
        coordinates: &[Vec<f64>],
        properties: &RawProperties,
    ) -> Result<(), Error> {
        let coords: Vec<Coord<f64>> = coordinates
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| Coord { x: c[0], y: c[1] })
            .collect();
        let (Some(&first), Some(&last)) = (coords.first(), coords.last()) else {
            self.skipped += 1;
            return Ok(());
        };
        if coords.len() < 2 || quantize(first) == quantize(last) {
            self.skipped += 1;
            return Ok(());
        }

        let elevation_at = |vertex: usize| -> Meters {
            properties
                .elevations
                .as_ref()
                .and_then(|e| e.get(vertex).copied())
                .or_else(|| coordinates.get(vertex).and_then(|c| c.get(2).copied()))
                .unwrap_or(0.0)
        };
        let source = self.node_at(first, elevation_at(0))?;
        let target = self.node_at(last, elevation_at(coordinates.len() - 1))?;

        let mut attributes =
            EdgeAttributes::with_speed(properties.speed()).geometry(LineString::new(coords));
        if let Some(width) = properties.width_m {
            attributes = attributes.width(width);
        }

        self.next_edge_id += 1;
        let id = properties.id.unwrap_or(self.next_edge_id);
        let result = if properties.oneway.unwrap_or(false) {
            self.builder.add_edge(id, source, target, attributes).map(|_| ())
        } else {
            self.builder.add_road(id, source, target, attributes).map(|_| ())
        };
        result.map_err(|e| Error::InvalidNetwork(format!("feature #{feature}: {e}")))
    }

    fn node_at(&mut self, coord: Coord<f64>, elevation: Meters) -> Result<NodeIndex, Error> {
        let key = quantize(coord);
        if let Some(&node) = self.endpoints.get(&key) {
            return Ok(node);
        }
        self.next_node_id += 1;
        let node = self.builder.add_node(self.next_node_id, Point::from(coord), elevation)?;
        self.endpoints.insert(key, node);
        Ok(node)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(coord: Coord<f64>) -> (i64, i64) {
    (
        (coord.x / MERGE_PRECISION).round() as i64,
        (coord.y / MERGE_PRECISION).round() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROADS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"speed_kmh": 36, "width_m": 6.0},
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[0.0, 0.0, 10.0], [0.001, 0.0, 12.0]]
                }
            },
            {
                "type": "Feature",
                "properties": {"oneway": true, "id": 42},
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[0.001, 0.0], [0.001, 0.0005], [0.001, 0.001]]
                }
            },
            {
                "type": "Feature",
                "properties": null,
                "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
            }
        ]
    }"#;

    #[test]
    fn builds_graph_and_merges_endpoints() {
        let graph = network_from_geojson_str(ROADS).unwrap();
        // three distinct endpoints, the shared one merged
        assert_eq!(graph.node_count(), 3);
        // one two-way road plus one one-way road
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn reads_speed_width_and_elevation() {
        let graph = network_from_geojson_str(ROADS).unwrap();
        let edge = graph
            .graph
            .edge_weights()
            .find(|e| e.width.is_some() && e.slope > 0.0)
            .unwrap();
        assert!((edge.base_speed - 10.0).abs() < 1e-9);
        assert_eq!(edge.width, Some(6.0));

        let oneway = graph.graph.edge_weights().find(|e| e.id == 42).unwrap();
        assert_eq!(oneway.geometry.0.len(), 3);
        assert!((oneway.base_speed - DEFAULT_SPEED).abs() < 1e-9);
    }

    #[test]
    fn rejects_documents_without_roads() {
        let empty = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(network_from_geojson_str(empty).is_err());
        assert!(matches!(
            network_from_geojson_str("not json"),
            Err(Error::GeoJsonError(_))
        ));
    }
}
