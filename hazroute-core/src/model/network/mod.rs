//! Road network model

pub mod components;
pub mod graph;

pub use components::{EdgeAttributes, GraphEdge, GraphNode};
pub use graph::{GraphBuilder, IndexedPoint, RoadNetworkGraph};
