use geo::Point;
use serde::{Deserialize, Serialize};

use super::hazard::Severity;
use crate::Seconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    Accident,
    Congestion,
    Closure,
}

/// A traffic incident pinned to a location on the network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficCondition {
    pub id: String,
    pub location: Point<f64>,
    pub traffic_type: TrafficType,
    pub severity: Severity,
    /// Expected delay in minutes
    pub delay: f64,
    /// Whether emergency vehicles may pass (relevant for closures)
    #[serde(default)]
    pub emergency_access: bool,
}

impl TrafficCondition {
    pub fn delay_seconds(&self) -> Seconds {
        self.delay.max(0.0) * 60.0
    }

    /// Whether this condition blocks the road for the given vehicle
    pub fn blocks(&self, emergency_priority: bool) -> bool {
        self.traffic_type == TrafficType::Closure && !(self.emergency_access && emergency_priority)
    }
}
