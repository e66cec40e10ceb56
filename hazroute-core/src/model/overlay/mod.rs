//! Hazard and traffic overlay on top of the road network

pub mod hazard;
pub mod store;
pub mod traffic;

pub use hazard::{AvoidancePolicy, AvoidancePriority, HazardType, HazardZone, Severity};
pub use store::{HazardOverlayStore, IndexedZone, OverlaySnapshot};
pub use traffic::{TrafficCondition, TrafficType};
