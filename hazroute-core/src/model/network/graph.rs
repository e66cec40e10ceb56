//! Read-only road network snapshot with spatial index

use geo::{BoundingRect, LineString, Point, Rect};
use hashbrown::HashMap;
use log::debug;
use petgraph::{
    Direction,
    graph::{DiGraph, EdgeIndex, EdgeReference, NodeIndex},
};
use rstar::{RTree, primitives::GeomWithData};

use super::components::{EdgeAttributes, GraphEdge, GraphNode};
use crate::{
    Error, Meters,
    geometry::{haversine, is_valid_lon_lat, line_length},
};

/// R-tree entry pointing back to a graph node
pub type IndexedPoint = GeomWithData<[f64; 2], NodeIndex>;

/// Candidates pulled from the R-tree before refining by great-circle distance
const NEAREST_CANDIDATES: usize = 8;

/// Immutable road graph. Nodes and edges live in petgraph's index arena, so
/// every reference into the graph is a plain integer index.
#[derive(Debug, Clone)]
pub struct RoadNetworkGraph {
    pub(crate) graph: DiGraph<GraphNode, GraphEdge>,
    rtree: RTree<IndexedPoint>,
    max_speed: f64,
}

impl RoadNetworkGraph {
    /// Nearest node to an arbitrary coordinate with its distance in meters
    pub fn nearest_node(&self, point: &Point<f64>) -> Option<(NodeIndex, Meters)> {
        self.rtree
            .nearest_neighbor_iter(&[point.x(), point.y()])
            .take(NEAREST_CANDIDATES)
            .map(|candidate| {
                let [x, y] = *candidate.geom();
                (candidate.data, haversine(*point, Point::new(x, y)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Outgoing edges of a node
    pub fn edges(&self, node: NodeIndex) -> impl Iterator<Item = EdgeReference<'_, GraphEdge>> {
        self.graph.edges_directed(node, Direction::Outgoing)
    }

    pub fn elevation(&self, node: NodeIndex) -> Option<Meters> {
        self.graph.node_weight(node).map(|n| n.elevation)
    }

    pub fn node(&self, node: NodeIndex) -> Option<&GraphNode> {
        self.graph.node_weight(node)
    }

    pub fn edge(&self, edge: EdgeIndex) -> Option<&GraphEdge> {
        self.graph.edge_weight(edge)
    }

    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Highest free-flow speed found on any edge
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }
}

/// Incremental constructor for [`RoadNetworkGraph`] snapshots
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: DiGraph<GraphNode, GraphEdge>,
    ids: HashMap<u64, NodeIndex>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, or returns the existing index if the provider id is known
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinates are not valid lon/lat
    pub fn add_node(
        &mut self,
        id: u64,
        geometry: Point<f64>,
        elevation: Meters,
    ) -> Result<NodeIndex, Error> {
        if let Some(&existing) = self.ids.get(&id) {
            return Ok(existing);
        }
        if !is_valid_lon_lat(&geometry) || !elevation.is_finite() {
            return Err(Error::InvalidNetwork(format!(
                "node {id} has invalid coordinates or elevation"
            )));
        }
        let index = self.graph.add_node(GraphNode {
            id,
            geometry,
            elevation,
        });
        self.ids.insert(id, index);
        Ok(index)
    }

    /// Adds a directed edge
    ///
    /// # Errors
    ///
    /// Returns an error on unknown endpoints or a non-positive speed
    pub fn add_edge(
        &mut self,
        id: u64,
        source: NodeIndex,
        target: NodeIndex,
        attributes: EdgeAttributes,
    ) -> Result<EdgeIndex, Error> {
        let edge = self.make_edge(id, source, target, attributes)?;
        Ok(self.graph.add_edge(source, target, edge))
    }

    /// Adds a two-way road as a pair of directed edges with opposite slopes
    ///
    /// # Errors
    ///
    /// Same as [`GraphBuilder::add_edge`]
    pub fn add_road(
        &mut self,
        id: u64,
        a: NodeIndex,
        b: NodeIndex,
        attributes: EdgeAttributes,
    ) -> Result<(EdgeIndex, EdgeIndex), Error> {
        let forward = self.make_edge(id, a, b, attributes)?;
        let mut backward = forward.clone();
        backward.slope = -forward.slope;
        backward.geometry = LineString::new(forward.geometry.coords().rev().copied().collect());

        let f = self.graph.add_edge(a, b, forward);
        let r = self.graph.add_edge(b, a, backward);
        Ok((f, r))
    }

    fn make_edge(
        &self,
        id: u64,
        source: NodeIndex,
        target: NodeIndex,
        attributes: EdgeAttributes,
    ) -> Result<GraphEdge, Error> {
        let (Some(from), Some(to)) = (
            self.graph.node_weight(source),
            self.graph.node_weight(target),
        ) else {
            return Err(Error::InvalidNodeIndex);
        };
        if !(attributes.base_speed.is_finite() && attributes.base_speed > 0.0) {
            return Err(Error::InvalidNetwork(format!(
                "edge {id} has non-positive speed {}",
                attributes.base_speed
            )));
        }

        let geometry = attributes
            .geometry
            .filter(|line| line.0.len() >= 2)
            .unwrap_or_else(|| LineString::from(vec![from.geometry, to.geometry]));

        // The search heuristic is the straight-line distance, so an edge
        // may never be shorter than that.
        let straight = haversine(from.geometry, to.geometry);
        let provided = attributes.length.unwrap_or_else(|| line_length(&geometry));
        if provided + 1e-6 < straight {
            debug!("Edge {id} length {provided:.1}m raised to straight-line {straight:.1}m");
        }
        let length = provided.max(straight);

        let slope = attributes.slope.unwrap_or_else(|| {
            if length > 0.0 {
                (to.elevation - from.elevation) / length * 100.0
            } else {
                0.0
            }
        });

        let bbox = geometry
            .bounding_rect()
            .unwrap_or_else(|| Rect::new(from.geometry.0, to.geometry.0));

        Ok(GraphEdge {
            id,
            length,
            slope,
            base_speed: attributes.base_speed,
            width: attributes.width,
            geometry,
            bbox,
        })
    }

    /// Finalizes the snapshot and builds its spatial index
    ///
    /// # Errors
    ///
    /// Returns an error if the graph has no nodes
    pub fn build(self) -> Result<RoadNetworkGraph, Error> {
        if self.graph.node_count() == 0 {
            return Err(Error::InvalidNetwork("road network has no nodes".to_string()));
        }

        let points = self
            .graph
            .node_indices()
            .map(|idx| {
                let p = self.graph[idx].geometry;
                IndexedPoint::new([p.x(), p.y()], idx)
            })
            .collect();
        let rtree = RTree::bulk_load(points);

        let max_speed = self
            .graph
            .edge_weights()
            .map(|e| e.base_speed)
            .fold(0.0, f64::max);

        debug!(
            "Built road network with {} nodes and {} edges",
            self.graph.node_count(),
            self.graph.edge_count()
        );

        Ok(RoadNetworkGraph {
            graph: self.graph,
            rtree,
            max_speed,
        })
    }
}
