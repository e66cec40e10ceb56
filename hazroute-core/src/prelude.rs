// Re-export key components
pub use crate::algo::{RouteComparison, RouteMetrics};
pub use crate::engine::RoutingEngine;
pub use crate::loading::{GridSpec, grid_network, load_geojson_network};
pub use crate::updates::{DynamicRouteUpdate, RecommendedAction, UpdateType};
pub use crate::{EngineConfig, Error};

// Request and overlay types
pub use crate::model::{
    AvoidancePolicy, AvoidancePriority, HazardType, HazardZone, OptimizationMode,
    OptimizationRequest, OptimizationResult, OptimizationStatus, PreferenceWeights, Route,
    Severity, TrafficCondition, TrafficType, VehicleConstraints, VehicleType,
};

// Units
pub use crate::Meters;
pub use crate::RouteId;
pub use crate::Seconds;
