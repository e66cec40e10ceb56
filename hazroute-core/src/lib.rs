//! Hazard-aware multi-objective route optimization.
//!
//! The crate computes several named candidate routes between two points on a
//! road network snapshot, steering around hazard zones and traffic incidents,
//! scores and ranks them, caches results against the overlay state and
//! notifies subscribers when an issued route may need re-planning.

pub mod algo;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub(crate) mod geometry;
pub mod loading;
pub mod model;
pub mod prelude;
pub mod routing;
pub mod updates;

pub use config::EngineConfig;
pub use engine::RoutingEngine;
pub use error::Error;
pub use model::{
    GraphEdge, GraphNode, HazardOverlayStore, HazardZone, OptimizationMode, OptimizationRequest,
    OptimizationResult, RoadNetworkGraph, Route, TrafficCondition, VehicleConstraints,
};

/// Distance in meters
pub type Meters = f64;
/// Duration in seconds
pub type Seconds = f64;
/// Identifier of an issued route
pub type RouteId = String;

/// Number of expansions between two deadline checks in a search
pub const DEADLINE_CHECK_INTERVAL: usize = 64;
