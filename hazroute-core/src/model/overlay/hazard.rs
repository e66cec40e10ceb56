use geo::{Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::{Meters, geometry::circle_polygon};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardType {
    Fire,
    Flood,
    Chemical,
    Structural,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Multiplier applied to hazard and traffic penalties
    pub fn factor(self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 4.0,
            Severity::Critical => 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvoidancePriority {
    #[default]
    PreferAvoid,
    MustAvoid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvoidancePolicy {
    pub enabled: bool,
    /// Extra margin around the polygon in meters
    pub buffer_distance: Meters,
    pub priority: AvoidancePriority,
}

impl Default for AvoidancePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_distance: 100.0,
            priority: AvoidancePriority::PreferAvoid,
        }
    }
}

/// An active danger area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardZone {
    pub id: String,
    pub hazard_type: HazardType,
    pub boundary: Polygon<f64>,
    pub center: Point<f64>,
    pub radius: Meters,
    pub severity: Severity,
    #[serde(default)]
    pub avoidance: AvoidancePolicy,
}

impl HazardZone {
    /// A zone whose boundary is a circle around `center`
    pub fn circular(
        id: impl Into<String>,
        hazard_type: HazardType,
        center: Point<f64>,
        radius: Meters,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            hazard_type,
            boundary: circle_polygon(center, radius, 32),
            center,
            radius,
            severity,
            avoidance: AvoidancePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_avoidance(mut self, avoidance: AvoidancePolicy) -> Self {
        self.avoidance = avoidance;
        self
    }

    pub fn is_must_avoid(&self) -> bool {
        self.avoidance.enabled && self.avoidance.priority == AvoidancePriority::MustAvoid
    }

    /// Buffer that applies for routing, zero when avoidance is disabled
    pub fn effective_buffer(&self) -> Meters {
        if self.avoidance.enabled {
            self.avoidance.buffer_distance.max(0.0)
        } else {
            0.0
        }
    }
}
