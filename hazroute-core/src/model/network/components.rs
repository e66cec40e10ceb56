//! Road network components - nodes and edges

use geo::{LineString, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::Meters;

/// Road graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Provider ID of the node
    pub id: u64,
    /// Node coordinates (lon, lat)
    pub geometry: Point<f64>,
    /// Elevation above sea level in meters
    pub elevation: Meters,
}

/// Directed road segment
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// Provider ID of the edge. Both directions of a two-way road share it.
    pub id: u64,
    /// Length in meters, never shorter than the straight line between endpoints
    pub length: Meters,
    /// Grade in percent along the edge direction, positive uphill
    pub slope: f64,
    /// Free-flow speed in meters per second
    pub base_speed: f64,
    /// Carriageway width in meters, if known
    pub width: Option<Meters>,
    pub geometry: LineString<f64>,
    pub(crate) bbox: Rect<f64>,
}

impl GraphEdge {
    pub fn bbox(&self) -> Rect<f64> {
        self.bbox
    }

    /// Free-flow traversal time in seconds at the given speed cap
    pub fn free_flow_time(&self, speed_cap: f64) -> f64 {
        let speed = self.base_speed.min(speed_cap);
        if speed > 0.0 {
            self.length / speed
        } else {
            f64::INFINITY
        }
    }
}

/// Optional attributes used when inserting an edge into the graph
#[derive(Debug, Clone)]
pub struct EdgeAttributes {
    pub base_speed: f64,
    pub length: Option<Meters>,
    pub slope: Option<f64>,
    pub width: Option<Meters>,
    pub geometry: Option<LineString<f64>>,
}

impl EdgeAttributes {
    pub fn with_speed(base_speed: f64) -> Self {
        Self {
            base_speed,
            length: None,
            slope: None,
            width: None,
            geometry: None,
        }
    }

    #[must_use]
    pub fn length(mut self, length: Meters) -> Self {
        self.length = Some(length);
        self
    }

    #[must_use]
    pub fn slope(mut self, slope: f64) -> Self {
        self.slope = Some(slope);
        self
    }

    #[must_use]
    pub fn width(mut self, width: Meters) -> Self {
        self.width = Some(width);
        self
    }

    #[must_use]
    pub fn geometry(mut self, geometry: LineString<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }
}
