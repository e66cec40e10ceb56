//! Per-route metrics and the 0-100 performance score.

use geo::BoundingRect;
use itertools::Itertools;
use petgraph::graph::EdgeIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    EngineConfig, Meters, RouteId, Seconds,
    geometry::haversine,
    model::{OptimizationRequest, OverlaySnapshot, PreferenceWeights, RoadNetworkGraph, Route},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElevationMetrics {
    pub gain: Meters,
    pub loss: Meters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlopeMetrics {
    /// Steepest absolute grade in percent
    pub max: f64,
    /// Length-weighted mean absolute grade in percent
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityMetrics {
    /// Slope, width and closures all fit the requesting vehicle
    pub emergency_vehicle_compatible: bool,
    pub slope_compatible: bool,
    pub width_compatible: bool,
    pub closures_passable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyMetrics {
    /// Zones whose polygon the route crosses
    pub intersected_hazards: Vec<String>,
    /// Zones whose buffer, but not polygon, the route enters
    pub nearby_hazards: Vec<String>,
    /// Smallest distance to any nearby zone polygon
    pub min_clearance: Option<Meters>,
    /// 0 when crossing a zone, 1 when clear of every buffer
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficMetrics {
    pub delay: Seconds,
    pub incidents: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub distance_score: f64,
    pub time_score: f64,
    pub safety_score: f64,
    pub accessibility_score: f64,
    /// Weighted combination of the four scores in `[0, 100]`
    pub overall_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub route_id: RouteId,
    pub distance: Meters,
    pub time: Seconds,
    pub elevation: ElevationMetrics,
    pub slope: SlopeMetrics,
    pub accessibility: AccessibilityMetrics,
    pub safety: SafetyMetrics,
    pub traffic: TrafficMetrics,
    pub performance: PerformanceMetrics,
}

pub struct RouteMetricsCalculator<'a> {
    graph: &'a RoadNetworkGraph,
    overlay: &'a OverlaySnapshot,
    config: &'a EngineConfig,
}

impl<'a> RouteMetricsCalculator<'a> {
    pub fn new(
        graph: &'a RoadNetworkGraph,
        overlay: &'a OverlaySnapshot,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            graph,
            overlay,
            config,
        }
    }

    /// Metrics for every route, index-aligned with the input
    pub fn calculate_all(
        &self,
        routes: &[Route],
        request: &OptimizationRequest,
    ) -> Vec<RouteMetrics> {
        routes
            .par_iter()
            .map(|route| self.calculate(route, request))
            .collect()
    }

    pub fn calculate(&self, route: &Route, request: &OptimizationRequest) -> RouteMetrics {
        let elevation = self.elevation(route);
        let slope = slope_metrics(route);
        let safety = self.safety(route);
        let (traffic, closures_passable) = self.traffic(route, request);
        let accessibility = self.accessibility(route, request, closures_passable);

        let profile = request.constraints.vehicle_type.profile();
        let straight: Meters = route
            .waypoints
            .iter()
            .tuple_windows()
            .map(|(a, b)| haversine(*a, *b))
            .sum();
        let distance_score = efficiency(straight, route.total_distance);
        let time_score = efficiency(straight / profile.max_speed, route.total_time);

        let steep: Meters = route
            .segments
            .iter()
            .filter(|s| s.slope.abs() > profile.slope_threshold)
            .map(|s| s.length)
            .sum();
        let flat_share = if route.total_distance > 0.0 {
            1.0 - steep / route.total_distance
        } else {
            1.0
        };
        let accessibility_score = [
            f64::from(u8::from(accessibility.slope_compatible)),
            f64::from(u8::from(accessibility.width_compatible)),
            f64::from(u8::from(accessibility.closures_passable)),
            flat_share,
        ]
        .iter()
        .sum::<f64>()
            / 4.0;

        let weights = request.mode.strategy().scoring_weights(&request.preferences);
        let performance = performance(
            &weights,
            distance_score,
            time_score,
            safety.score,
            accessibility_score,
        );

        RouteMetrics {
            route_id: route.id.clone(),
            distance: route.total_distance,
            time: route.total_time,
            elevation,
            slope,
            accessibility,
            safety,
            traffic,
            performance,
        }
    }

    fn elevation(&self, route: &Route) -> ElevationMetrics {
        let mut metrics = ElevationMetrics::default();
        for segment in &route.segments {
            let Some((from, to)) = self.graph.endpoints(EdgeIndex::new(segment.edge_index)) else {
                continue;
            };
            let (Some(a), Some(b)) = (self.graph.elevation(from), self.graph.elevation(to)) else {
                continue;
            };
            let rise = b - a;
            if rise > 0.0 {
                metrics.gain += rise;
            } else {
                metrics.loss -= rise;
            }
        }
        metrics
    }

    fn safety(&self, route: &Route) -> SafetyMetrics {
        let mut safety = SafetyMetrics {
            score: 1.0,
            ..SafetyMetrics::default()
        };
        let Some(bbox) = route.geometry.bounding_rect() else {
            return safety;
        };

        for indexed in self.overlay.zones_intersecting(bbox) {
            let zone = &indexed.zone;
            if !zone.avoidance.enabled {
                continue;
            }
            let buffer = zone.effective_buffer();
            let distance = indexed.distance_to_line(&route.geometry);
            if distance > buffer {
                continue;
            }
            safety.min_clearance =
                Some(safety.min_clearance.map_or(distance, |c: f64| c.min(distance)));
            let clearance = if distance <= 0.0 {
                safety.intersected_hazards.push(zone.id.clone());
                0.0
            } else {
                safety.nearby_hazards.push(zone.id.clone());
                distance / buffer
            };
            safety.score = safety.score.min(clearance);
        }
        safety
    }

    fn traffic(&self, route: &Route, request: &OptimizationRequest) -> (TrafficMetrics, bool) {
        let mut metrics = TrafficMetrics::default();
        let mut passable = true;
        let Some(bbox) = route.geometry.bounding_rect() else {
            return (metrics, passable);
        };
        let priority = request.constraints.emergency_priority;
        for condition in
            self.overlay
                .traffic_on_line(&route.geometry, bbox, self.config.traffic_proximity)
        {
            metrics.incidents += 1;
            if condition.blocks(priority) {
                passable = false;
            }
            let delay = condition.delay_seconds();
            metrics.delay += if priority { delay * 0.5 } else { delay };
        }
        (metrics, passable)
    }

    fn accessibility(
        &self,
        route: &Route,
        request: &OptimizationRequest,
        closures_passable: bool,
    ) -> AccessibilityMetrics {
        let profile = request.constraints.vehicle_type.profile();
        let slope_limit = request
            .constraints
            .max_slope
            .map_or(profile.max_slope, |max| max.min(profile.max_slope));
        let slope_compatible = route.max_slope <= slope_limit;
        let width_compatible = route.segments.iter().all(|s| {
            self.graph
                .edge(EdgeIndex::new(s.edge_index))
                .and_then(|e| e.width)
                .is_none_or(|w| w >= profile.min_width)
        });
        AccessibilityMetrics {
            emergency_vehicle_compatible: slope_compatible && width_compatible && closures_passable,
            slope_compatible,
            width_compatible,
            closures_passable,
        }
    }
}

fn slope_metrics(route: &Route) -> SlopeMetrics {
    let weighted: f64 = route.segments.iter().map(|s| s.slope.abs() * s.length).sum();
    SlopeMetrics {
        max: route.max_slope,
        average: if route.total_distance > 0.0 {
            weighted / route.total_distance
        } else {
            0.0
        },
    }
}

/// Ratio of an ideal value to the achieved one, clamped to `[0, 1]`
fn efficiency(ideal: f64, actual: f64) -> f64 {
    if actual <= 0.0 {
        return 1.0;
    }
    (ideal / actual).clamp(0.0, 1.0)
}

fn performance(
    weights: &PreferenceWeights,
    distance_score: f64,
    time_score: f64,
    safety_score: f64,
    accessibility_score: f64,
) -> PerformanceMetrics {
    let w = weights.normalized();
    let overall = w.distance * distance_score
        + w.time * time_score
        + w.safety * safety_score
        + w.accessibility * accessibility_score;
    PerformanceMetrics {
        distance_score,
        time_score,
        safety_score,
        accessibility_score,
        overall_score: (overall * 100.0).clamp(0.0, 100.0),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use petgraph::graph::NodeIndex;

    use super::*;
    use crate::{
        loading::{GridSpec, grid_network},
        model::{
            HazardOverlayStore, HazardType, HazardZone, OptimizationMode, Severity,
            TrafficCondition, TrafficType,
        },
        routing::search::PathSearchEngine,
    };

    fn setup(relief: f64) -> (RoadNetworkGraph, OptimizationRequest) {
        let graph = grid_network(&GridSpec {
            relief,
            ..GridSpec::default()
        })
        .unwrap();
        let start = graph.node(NodeIndex::new(0)).unwrap().geometry;
        let end = graph.node(NodeIndex::new(9)).unwrap().geometry;
        let request = OptimizationRequest::new(start, end).with_mode(OptimizationMode::Shortest);
        (graph, request)
    }

    fn shortest_route(
        graph: &RoadNetworkGraph,
        overlay: &OverlaySnapshot,
        request: &OptimizationRequest,
    ) -> Route {
        let config = EngineConfig::default();
        let report = PathSearchEngine::new(graph, overlay, &config)
            .generate(request, Instant::now() + Duration::from_secs(10), "m")
            .unwrap();
        report.routes.into_iter().next().unwrap()
    }

    #[test]
    fn straight_route_scores_high() {
        let (graph, request) = setup(0.0);
        let store = HazardOverlayStore::new();
        let overlay = store.snapshot();
        let route = shortest_route(&graph, &overlay, &request);
        let config = EngineConfig::default();
        let metrics =
            RouteMetricsCalculator::new(&graph, &overlay, &config).calculate(&route, &request);

        assert_eq!(metrics.route_id, route.id);
        assert!((metrics.distance - route.total_distance).abs() < 1e-9);
        assert!(metrics.performance.distance_score > 0.99);
        assert_eq!(metrics.safety.score, 1.0);
        assert!(metrics.accessibility.emergency_vehicle_compatible);
        assert!(metrics.performance.overall_score <= 100.0);
        assert!(metrics.performance.overall_score > 50.0);
    }

    #[test]
    fn hilly_route_accumulates_gain_and_loss() {
        let (graph, request) = setup(30.0);
        let overlay = HazardOverlayStore::new().snapshot();
        let route = shortest_route(&graph, &overlay, &request);
        let config = EngineConfig::default();
        let metrics =
            RouteMetricsCalculator::new(&graph, &overlay, &config).calculate(&route, &request);
        // the first row sits at zero elevation everywhere
        assert_eq!(metrics.elevation.gain, 0.0);

        let start = graph.node(NodeIndex::new(0)).unwrap().geometry;
        let across = graph.node(NodeIndex::new(99)).unwrap().geometry;
        let request = OptimizationRequest::new(start, across).with_mode(OptimizationMode::Shortest);
        let route = shortest_route(&graph, &overlay, &request);
        let metrics =
            RouteMetricsCalculator::new(&graph, &overlay, &config).calculate(&route, &request);
        assert!(metrics.elevation.gain > 0.0);
        assert!((metrics.elevation.gain - metrics.elevation.loss).abs() < 1e-6);
        assert!(metrics.slope.max >= metrics.slope.average);
    }

    #[test]
    fn hazard_and_traffic_lower_scores() {
        let (graph, request) = setup(0.0);
        let store = HazardOverlayStore::new();
        let clean = store.snapshot();
        let route = shortest_route(&graph, &clean, &request);

        let midpoint = graph.node(NodeIndex::new(5)).unwrap().geometry;
        store.add_hazard_zone(HazardZone::circular(
            "smoke",
            HazardType::Fire,
            midpoint,
            30.0,
            Severity::Medium,
        ));
        store.add_traffic_condition(TrafficCondition {
            id: "crash".to_string(),
            location: midpoint,
            traffic_type: TrafficType::Closure,
            severity: Severity::High,
            delay: 10.0,
            emergency_access: false,
        });
        let overlay = store.snapshot();
        let config = EngineConfig::default();
        let metrics =
            RouteMetricsCalculator::new(&graph, &overlay, &config).calculate(&route, &request);

        assert_eq!(metrics.safety.intersected_hazards, vec!["smoke".to_string()]);
        assert_eq!(metrics.safety.score, 0.0);
        assert_eq!(metrics.safety.min_clearance, Some(0.0));
        assert_eq!(metrics.traffic.incidents, 1);
        assert!((metrics.traffic.delay - 600.0).abs() < 1e-9);
        assert!(!metrics.accessibility.closures_passable);
        assert!(!metrics.accessibility.emergency_vehicle_compatible);
    }

    #[test]
    fn calculate_all_is_index_aligned() {
        let (graph, request) = setup(10.0);
        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let balanced = request.clone().with_mode(OptimizationMode::Balanced);
        let report = PathSearchEngine::new(&graph, &overlay, &config)
            .generate(&balanced, Instant::now() + Duration::from_secs(10), "a")
            .unwrap();
        let metrics = RouteMetricsCalculator::new(&graph, &overlay, &config)
            .calculate_all(&report.routes, &request);
        assert_eq!(metrics.len(), report.routes.len());
        for (route, m) in report.routes.iter().zip(&metrics) {
            assert_eq!(route.id, m.route_id);
        }
    }

    #[test]
    fn efficiency_is_clamped() {
        assert_eq!(efficiency(10.0, 0.0), 1.0);
        assert_eq!(efficiency(10.0, 5.0), 1.0);
        assert!((efficiency(5.0, 10.0) - 0.5).abs() < 1e-12);
    }
}
