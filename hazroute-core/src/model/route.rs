//! Routes and optimization results

use std::time::Duration;

use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

use super::request::{OptimizationMode, VehicleConstraints};
use crate::{Meters, RouteId, Seconds, algo::metrics::RouteMetrics};

/// One traversed edge of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    /// Index of the edge in the network snapshot
    pub edge_index: usize,
    /// Provider id of the edge
    pub edge_id: u64,
    pub from: Point<f64>,
    pub to: Point<f64>,
    pub length: Meters,
    /// Travel time including traffic delay
    pub time: Seconds,
    pub slope: f64,
}

/// A candidate route produced by one search strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub strategy: OptimizationMode,
    /// Requested stops in travel order
    pub waypoints: Vec<Point<f64>>,
    pub segments: Vec<RouteSegment>,
    pub geometry: LineString<f64>,
    pub total_distance: Meters,
    pub total_time: Seconds,
    /// Steepest absolute grade in percent
    pub max_slope: f64,
    /// Set when the search ran out of time before every strategy finished
    pub approximate: bool,
}

impl Route {
    pub fn edge_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments.iter().map(|s| s.edge_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    /// Every strategy finished within the time budget
    Optimized,
    /// Some strategies were cut short by the time budget
    Approximate,
    InvalidRequest,
    /// No candidate satisfies the hard constraints
    Infeasible,
    /// No strategy completed within the time budget
    TimedOut,
}

impl OptimizationStatus {
    pub fn is_success(self) -> bool {
        matches!(self, OptimizationStatus::Optimized | OptimizationStatus::Approximate)
    }
}

/// Outcome of [`crate::RoutingEngine::optimize_route`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub success: bool,
    pub status: OptimizationStatus,
    /// Diagnostic for unsuccessful results
    pub message: Option<String>,
    pub routes: Vec<Route>,
    pub best_route: Option<RouteId>,
    pub alternatives: Vec<RouteId>,
    /// Index-aligned with `routes`
    pub metrics: Vec<RouteMetrics>,
    #[serde(with = "duration_ms", rename = "optimization_time_ms")]
    pub optimization_time: Duration,
    pub constraints: VehicleConstraints,
    pub recommendations: Vec<String>,
    pub overlay_version: u64,
    pub from_cache: bool,
}

impl OptimizationResult {
    pub(crate) fn failure(
        status: OptimizationStatus,
        message: impl Into<String>,
        constraints: VehicleConstraints,
        overlay_version: u64,
    ) -> Self {
        Self {
            success: false,
            status,
            message: Some(message.into()),
            routes: Vec::new(),
            best_route: None,
            alternatives: Vec::new(),
            metrics: Vec::new(),
            optimization_time: Duration::ZERO,
            constraints,
            recommendations: Vec::new(),
            overlay_version,
            from_cache: false,
        }
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn best(&self) -> Option<&Route> {
        self.best_route.as_deref().and_then(|id| self.route(id))
    }

    /// Metrics of a route in this result
    pub fn metrics_for(&self, id: &str) -> Option<&RouteMetrics> {
        let idx = self.routes.iter().position(|r| r.id == id)?;
        self.metrics.get(idx)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(millis.max(0.0) / 1000.0).map_err(serde::de::Error::custom)
    }
}
