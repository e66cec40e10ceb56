//! This module is responsible for building road network snapshots from
//! external data (GeoJSON) or from a synthetic lattice.

mod from_geojson;
mod synthetic;

pub use from_geojson::{load_geojson_network, network_from_geojson_str};
pub use synthetic::{GridSpec, grid_network};
