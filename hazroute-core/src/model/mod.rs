//! Data model for hazard-aware routing
//!
//! Contains the road network snapshot, the mutable hazard/traffic overlay,
//! optimization requests and their results.

pub mod network;
pub mod overlay;
pub mod request;
pub mod route;

pub use network::{EdgeAttributes, GraphBuilder, GraphEdge, GraphNode, RoadNetworkGraph};
pub use overlay::{
    AvoidancePolicy, AvoidancePriority, HazardOverlayStore, HazardType, HazardZone,
    OverlaySnapshot, Severity, TrafficCondition, TrafficType,
};
pub use request::{
    OptimizationMode, OptimizationRequest, PreferenceWeights, VehicleConstraints, VehicleProfile,
    VehicleType,
};
pub use route::{OptimizationResult, OptimizationStatus, Route, RouteSegment};

pub use crate::geometry::is_valid_lon_lat;
