use std::f64::consts::PI;

use geo::Point;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    Error, Meters,
    geometry::METERS_PER_DEGREE,
    model::{EdgeAttributes, GraphBuilder, RoadNetworkGraph},
};

/// Parameters of a synthetic lattice network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// South-west corner
    pub origin: Point<f64>,
    pub rows: usize,
    pub cols: usize,
    /// Block length in meters
    pub spacing: Meters,
    /// Free-flow speed of side streets in m/s
    pub speed: f64,
    /// Height of a single hill centered in the grid
    pub relief: Meters,
    /// Every n-th row and column is an arterial with double speed
    pub arterial_every: Option<usize>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            origin: Point::new(0.0, 0.0),
            rows: 10,
            cols: 10,
            spacing: 100.0,
            speed: 13.9,
            relief: 0.0,
            arterial_every: None,
        }
    }
}

const ARTERIAL_WIDTH: Meters = 7.0;
const STREET_WIDTH: Meters = 3.5;

/// Builds a two-way lattice. Node `r * cols + c` sits at row `r`, column `c`.
///
/// # Errors
///
/// Returns an error for an empty grid or invalid coordinates
pub fn grid_network(spec: &GridSpec) -> Result<RoadNetworkGraph, Error> {
    if spec.rows == 0 || spec.cols == 0 || !(spec.spacing > 0.0) {
        return Err(Error::InvalidNetwork(
            "grid needs at least one row, one column and a positive spacing".to_string(),
        ));
    }

    let dy = spec.spacing / METERS_PER_DEGREE;
    let dx = spec.spacing / (METERS_PER_DEGREE * spec.origin.y().to_radians().cos().max(0.01));
    let mut builder = GraphBuilder::new();

    let mut nodes = Vec::with_capacity(spec.rows * spec.cols);
    for r in 0..spec.rows {
        for c in 0..spec.cols {
            let point = Point::new(
                spec.origin.x() + c as f64 * dx,
                spec.origin.y() + r as f64 * dy,
            );
            let elevation = spec.relief * bump(r, spec.rows) * bump(c, spec.cols);
            nodes.push(builder.add_node((r * spec.cols + c) as u64, point, elevation)?);
        }
    }

    let is_arterial = |i: usize| spec.arterial_every.is_some_and(|n| n > 0 && i % n == 0);
    let attributes = |arterial: bool| {
        if arterial {
            EdgeAttributes::with_speed(spec.speed * 2.0).width(ARTERIAL_WIDTH)
        } else {
            EdgeAttributes::with_speed(spec.speed).width(STREET_WIDTH)
        }
    };

    let mut edge_id = 0;
    for r in 0..spec.rows {
        for c in 0..spec.cols {
            let here = nodes[r * spec.cols + c];
            if c + 1 < spec.cols {
                edge_id += 1;
                let next_in_row = nodes[r * spec.cols + c + 1];
                builder.add_road(edge_id, here, next_in_row, attributes(is_arterial(r)))?;
            }
            if r + 1 < spec.rows {
                edge_id += 1;
                let next_in_col = nodes[(r + 1) * spec.cols + c];
                builder.add_road(edge_id, here, next_in_col, attributes(is_arterial(c)))?;
            }
        }
    }

    let graph = builder.build()?;
    info!(
        "Generated {}x{} grid network ({} nodes, {} edges)",
        spec.rows,
        spec.cols,
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Smooth 0..1..0 profile along one axis
fn bump(i: usize, n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    (PI * i as f64 / (n - 1) as f64).sin()
}
