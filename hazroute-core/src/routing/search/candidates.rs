use std::time::Instant;

use fixedbitset::FixedBitSet;
use geo::{Coord, LineString};
use itertools::Itertools;
use log::{debug, info};
use petgraph::graph::{EdgeIndex, NodeIndex};
use rayon::prelude::*;
use serde::Serialize;

use super::{astar::AStar, state::SearchPhase};
use crate::{
    EngineConfig, Error,
    model::{
        OptimizationMode, OptimizationRequest, OptimizationStatus, OverlaySnapshot,
        RoadNetworkGraph, Route, RouteSegment, VehicleConstraints,
    },
    routing::cost::{CostModel, CostParameters},
};

/// How many candidates broke each hard limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintViolations {
    pub distance: usize,
    pub time: usize,
    pub slope: usize,
}

impl ConstraintViolations {
    pub fn total(&self) -> usize {
        self.distance + self.time + self.slope
    }

    /// Names of the limits that rejected at least one candidate
    pub fn limiting(&self) -> Vec<&'static str> {
        [
            ("max_distance", self.distance),
            ("max_time", self.time),
            ("max_slope", self.slope),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(name, _)| name)
        .collect()
    }

    fn record(&mut self, route: &Route, constraints: &VehicleConstraints) -> bool {
        let mut ok = true;
        if constraints.max_distance.is_some_and(|max| route.total_distance > max) {
            self.distance += 1;
            ok = false;
        }
        if constraints.max_time.is_some_and(|max| route.total_time > max) {
            self.time += 1;
            ok = false;
        }
        if constraints.max_slope.is_some_and(|max| route.max_slope > max) {
            self.slope += 1;
            ok = false;
        }
        ok
    }
}

/// Outcome of candidate generation for one request
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub status: OptimizationStatus,
    pub message: Option<String>,
    /// Surviving candidates in pass order, request mode first
    pub routes: Vec<Route>,
    pub violations: ConstraintViolations,
    /// Passes cut short by the deadline
    pub timed_out: usize,
    /// Passes that found no traversable path
    pub unreachable: usize,
    /// Candidates dropped as near-duplicates of an earlier one
    pub duplicates: usize,
}

struct Candidate {
    mode: OptimizationMode,
    edges: Vec<EdgeIndex>,
    segments: Vec<RouteSegment>,
}

enum PassOutcome {
    Completed(Candidate),
    Unreachable(OptimizationMode),
    TimedOut(OptimizationMode),
}

/// Generates named candidate routes, one search pass per optimization mode.
pub struct PathSearchEngine<'a> {
    graph: &'a RoadNetworkGraph,
    overlay: &'a OverlaySnapshot,
    config: &'a EngineConfig,
}

impl<'a> PathSearchEngine<'a> {
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

    /// Runs every strategy pass and filters the results by the hard limits.
    /// Route ids are `{id_prefix}-{n}`, suffixed with `a` when approximate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if a stop cannot be snapped to the
    /// network or all stops snap to the same node
    pub fn generate(
        &self,
        request: &OptimizationRequest,
        deadline: Instant,
        id_prefix: &str,
    ) -> Result<SearchReport, Error> {
        let stops = self.snap(request)?;

        let modes: Vec<OptimizationMode> = std::iter::once(request.mode)
            .chain(OptimizationMode::ALL.into_iter().filter(|m| *m != request.mode))
            .collect();

        let outcomes: Vec<PassOutcome> = modes
            .into_par_iter()
            .map(|mode| self.run_pass(request, &stops, mode, deadline))
            .collect();

        let mut timed_out = 0;
        let mut unreachable = 0;
        let mut completed = Vec::new();
        for outcome in outcomes {
            match outcome {
                PassOutcome::Completed(candidate) => completed.push(candidate),
                PassOutcome::Unreachable(mode) => {
                    debug!("{mode:?} pass found no traversable path");
                    unreachable += 1;
                }
                PassOutcome::TimedOut(mode) => {
                    debug!("{mode:?} pass ran out of time");
                    timed_out += 1;
                }
            }
        }

        let mut report = SearchReport {
            status: OptimizationStatus::Optimized,
            message: None,
            routes: Vec::new(),
            violations: ConstraintViolations::default(),
            timed_out,
            unreachable,
            duplicates: 0,
        };

        if completed.is_empty() {
            if timed_out > 0 {
                report.status = OptimizationStatus::TimedOut;
                report.message = Some("search timed out before any strategy completed".to_string());
            } else {
                report.status = OptimizationStatus::Infeasible;
                report.message =
                    Some("no path avoids the closed roads and must-avoid hazards".to_string());
            }
            return Ok(report);
        }

        let approximate = timed_out > 0;
        let feasible: Vec<Route> = completed
            .into_iter()
            .map(|candidate| self.build_route(request, candidate, approximate))
            .filter(|route| report.violations.record(route, &request.constraints))
            .collect();

        // only routes within the limits may shadow one another
        let before = feasible.len();
        let suffix = if approximate { "a" } else { "" };
        for mut route in self.deduplicate(feasible) {
            route.id = format!("{id_prefix}-{}{suffix}", report.routes.len());
            report.routes.push(route);
        }
        report.duplicates = before - report.routes.len();

        if report.routes.is_empty() {
            report.status = OptimizationStatus::Infeasible;
            report.message = Some(format!(
                "no candidate route satisfies {}",
                report.violations.limiting().join(", ")
            ));
        } else if approximate {
            report.status = OptimizationStatus::Approximate;
            report.message = Some(format!(
                "{timed_out} of {} strategies ran out of time",
                OptimizationMode::ALL.len()
            ));
        }

        info!(
            "Generated {} candidate routes ({} duplicates, {} over limits, {} timed out)",
            report.routes.len(),
            report.duplicates,
            report.violations.total(),
            report.timed_out
        );
        Ok(report)
    }

    fn snap(&self, request: &OptimizationRequest) -> Result<Vec<NodeIndex>, Error> {
        let stops = request.stops();
        let mut nodes = Vec::with_capacity(stops.len());
        for (idx, point) in stops.iter().enumerate() {
            let (node, distance) = self.graph.nearest_node(point).ok_or_else(|| {
                Error::InvalidRequest(
                    Error::NoNodesFound {
                        lon: point.x(),
                        lat: point.y(),
                    }
                    .to_string(),
                )
            })?;
            if distance > self.config.max_snap_distance {
                return Err(Error::InvalidRequest(format!(
                    "stop #{idx} is {distance:.0} m from the nearest road, limit is {:.0} m",
                    self.config.max_snap_distance
                )));
            }
            nodes.push(node);
        }
        if nodes.iter().all_equal() {
            return Err(Error::InvalidRequest(
                "all request points snap to the same road node".to_string(),
            ));
        }
        Ok(nodes)
    }

    fn run_pass(
        &self,
        request: &OptimizationRequest,
        stops: &[NodeIndex],
        mode: OptimizationMode,
        deadline: Instant,
    ) -> PassOutcome {
        let weights = mode.strategy().cost_weights(&request.preferences);
        let model = CostModel::new(
            self.overlay,
            &request.constraints,
            weights,
            CostParameters::from(self.config),
        );

        let mut edges = Vec::new();
        for (&from, &to) in stops.iter().tuple_windows() {
            let mut search = AStar::new(self.graph, &model, from, to, deadline);
            match search.run() {
                SearchPhase::Succeeded => edges.extend(search.path().unwrap_or_default()),
                SearchPhase::TimedOut => return PassOutcome::TimedOut(mode),
                _ => return PassOutcome::Unreachable(mode),
            }
        }

        let segments = edges
            .iter()
            .filter_map(|&edge| {
                let (source, target) = self.graph.endpoints(edge)?;
                let weight = self.graph.edge(edge)?;
                Some(RouteSegment {
                    edge_index: edge.index(),
                    edge_id: weight.id,
                    from: self.graph.node(source)?.geometry,
                    to: self.graph.node(target)?.geometry,
                    length: weight.length,
                    time: model.assess(weight).travel_time,
                    slope: weight.slope,
                })
            })
            .collect();

        PassOutcome::Completed(Candidate {
            mode,
            edges,
            segments,
        })
    }

    /// Drops candidates whose edge set is too similar to an earlier one
    fn deduplicate(&self, routes: Vec<Route>) -> Vec<Route> {
        let n = self.graph.edge_count();
        let mut kept: Vec<(Route, FixedBitSet)> = Vec::with_capacity(routes.len());
        for route in routes {
            let mut set = FixedBitSet::with_capacity(n);
            for edge in route.edge_indices() {
                set.insert(edge);
            }
            let duplicate = kept
                .iter()
                .any(|(_, other)| jaccard(&set, other) >= self.config.dedup_similarity);
            if duplicate {
                debug!("{:?} candidate duplicates an earlier route", route.strategy);
            } else {
                kept.push((route, set));
            }
        }
        kept.into_iter().map(|(route, _)| route).collect()
    }

    fn build_route(
        &self,
        request: &OptimizationRequest,
        candidate: Candidate,
        approximate: bool,
    ) -> Route {
        let mut coords: Vec<Coord<f64>> = Vec::new();
        for edge in &candidate.edges {
            let Some(weight) = self.graph.edge(*edge) else {
                continue;
            };
            for &coord in weight.geometry.coords() {
                if coords.last() != Some(&coord) {
                    coords.push(coord);
                }
            }
        }

        let total_distance = candidate.segments.iter().map(|s| s.length).sum();
        let total_time = candidate.segments.iter().map(|s| s.time).sum();
        let max_slope = candidate
            .segments
            .iter()
            .map(|s| s.slope.abs())
            .fold(0.0, f64::max);

        Route {
            id: String::new(),
            name: candidate.mode.route_name().to_string(),
            strategy: candidate.mode,
            waypoints: request.stops(),
            segments: candidate.segments,
            geometry: LineString::new(coords),
            total_distance,
            total_time,
            max_slope,
            approximate,
        }
    }
}

/// Jaccard similarity of two edge sets, two empty sets count as identical
fn jaccard(a: &FixedBitSet, b: &FixedBitSet) -> f64 {
    let union = a.union_count(b);
    if union == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let similarity = a.intersection_count(b) as f64 / union as f64;
    similarity
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use geo::Point;

    use super::*;
    use crate::{
        loading::{GridSpec, grid_network},
        model::{
            AvoidancePolicy, AvoidancePriority, EdgeAttributes, GraphBuilder, HazardOverlayStore,
            HazardType, HazardZone, Severity,
        },
    };

    fn grid() -> RoadNetworkGraph {
        grid_network(&GridSpec {
            arterial_every: Some(4),
            relief: 15.0,
            ..GridSpec::default()
        })
        .unwrap()
    }

    fn corner_to_corner(graph: &RoadNetworkGraph) -> OptimizationRequest {
        let first = graph.node(NodeIndex::new(0)).unwrap().geometry;
        let last = graph.node(NodeIndex::new(graph.node_count() - 1)).unwrap().geometry;
        OptimizationRequest::new(first, last)
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[test]
    fn request_mode_comes_first_and_routes_are_contiguous() {
        let graph = grid();
        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let engine = PathSearchEngine::new(&graph, &overlay, &config);
        let request = corner_to_corner(&graph).with_mode(OptimizationMode::Safest);

        let report = engine.generate(&request, later(), "r").unwrap();
        assert_eq!(report.status, OptimizationStatus::Optimized);
        assert_eq!(report.routes[0].strategy, OptimizationMode::Safest);
        assert_eq!(report.routes[0].name, "Safest Route");
        assert_eq!(report.routes[0].id, "r-0");
        assert_eq!(report.routes.len() + report.duplicates, OptimizationMode::ALL.len());

        for route in &report.routes {
            for (a, b) in route.segments.iter().tuple_windows() {
                assert_eq!(a.to, b.from);
            }
            assert_eq!(route.segments.first().unwrap().from, request.start);
            assert_eq!(route.segments.last().unwrap().to, request.destination);
            assert!(route.total_distance > 0.0);
        }
    }

    #[test]
    fn waypoints_are_visited_in_order() {
        let graph = grid();
        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let engine = PathSearchEngine::new(&graph, &overlay, &config);

        // out to the far corner of the first row and back
        let start = graph.node(NodeIndex::new(0)).unwrap().geometry;
        let via = graph.node(NodeIndex::new(9)).unwrap().geometry;
        let request = OptimizationRequest::new(start, start)
            .with_waypoints(vec![via])
            .with_mode(OptimizationMode::Shortest);

        let report = engine.generate(&request, later(), "w").unwrap();
        let route = &report.routes[0];
        assert_eq!(route.waypoints, vec![start, via, start]);
        assert!(route.segments.iter().any(|s| s.to == via));
        assert_eq!(route.segments.len(), 18);
        assert_eq!(route.segments.last().unwrap().to, start);
    }

    #[test]
    fn unsnappable_points_are_invalid() {
        let graph = grid();
        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let engine = PathSearchEngine::new(&graph, &overlay, &config);
        let request = OptimizationRequest::new(Point::new(0.0, 0.0), Point::new(1.0, 1.0));
        assert!(matches!(
            engine.generate(&request, later(), "x"),
            Err(Error::InvalidRequest(_))
        ));

        // both points on the same node
        let request = OptimizationRequest::new(Point::new(0.0, 0.0), Point::new(0.0001, 0.0));
        assert!(matches!(
            engine.generate(&request, later(), "x"),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn distance_limit_filters_every_candidate() {
        let graph = grid();
        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let engine = PathSearchEngine::new(&graph, &overlay, &config);
        let request = corner_to_corner(&graph).with_constraints(VehicleConstraints {
            max_distance: Some(0.1),
            ..VehicleConstraints::default()
        });

        let report = engine.generate(&request, later(), "c").unwrap();
        assert_eq!(report.status, OptimizationStatus::Infeasible);
        assert!(report.routes.is_empty());
        assert_eq!(report.violations.limiting(), vec!["max_distance"]);
    }

    #[test]
    fn steep_candidate_does_not_hide_a_similar_feasible_one() {
        // a long flat approach that ends in a short steep ramp or a flat loop
        let mut builder = GraphBuilder::new();
        let chain: Vec<NodeIndex> = (0..=20)
            .map(|i| builder.add_node(i, Point::new(i as f64 * 0.0005, 0.0), 0.0).unwrap())
            .collect();
        for (i, (a, b)) in chain.iter().tuple_windows().enumerate() {
            builder
                .add_edge(i as u64, *a, *b, EdgeAttributes::with_speed(10.0).slope(0.0))
                .unwrap();
        }
        let last = *chain.last().unwrap();
        let end = builder.add_node(99, Point::new(0.0105, 0.0), 0.0).unwrap();
        builder
            .add_edge(100, last, end, EdgeAttributes::with_speed(10.0).slope(25.0))
            .unwrap();
        builder
            .add_edge(101, last, end, EdgeAttributes::with_speed(10.0).length(130.0).slope(0.0))
            .unwrap();
        let graph = builder.build().unwrap();

        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let engine = PathSearchEngine::new(&graph, &overlay, &config);
        let request = OptimizationRequest::new(Point::new(0.0, 0.0), Point::new(0.0105, 0.0))
            .with_mode(OptimizationMode::Shortest)
            .with_constraints(VehicleConstraints {
                max_slope: Some(10.0),
                ..VehicleConstraints::default()
            });

        let report = engine.generate(&request, later(), "s").unwrap();
        assert!(report.status.is_success(), "{:?}", report.message);
        assert!(report.violations.slope >= 1);
        assert_eq!(report.routes[0].id, "s-0");
        assert!(report.routes.iter().all(|r| r.max_slope <= 10.0));
        assert!(report.routes.iter().all(|r| r.strategy != OptimizationMode::Shortest));
    }

    #[test]
    fn must_avoid_zone_is_detoured() {
        let graph = grid();
        let store = HazardOverlayStore::new();
        let center = graph.node(NodeIndex::new(55)).unwrap().geometry;
        store.add_hazard_zone(
            HazardZone::circular("fire", HazardType::Fire, center, 150.0, Severity::High)
                .with_avoidance(AvoidancePolicy {
                    enabled: true,
                    buffer_distance: 20.0,
                    priority: AvoidancePriority::MustAvoid,
                }),
        );
        let overlay = store.snapshot();
        let config = EngineConfig::default();
        let engine = PathSearchEngine::new(&graph, &overlay, &config);

        let report = engine.generate(&corner_to_corner(&graph), later(), "h").unwrap();
        assert!(report.status.is_success());
        let zone = overlay.zone("fire").unwrap();
        for route in &report.routes {
            assert!(!zone.line_within_buffer(&route.geometry), "{}", route.name);
        }
    }

    #[test]
    fn expired_deadline_times_out() {
        let graph = grid_network(&GridSpec {
            rows: 60,
            cols: 60,
            ..GridSpec::default()
        })
        .unwrap();
        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let engine = PathSearchEngine::new(&graph, &overlay, &config);
        let request = corner_to_corner(&graph).with_mode(OptimizationMode::Safest);

        let report = engine.generate(&request, Instant::now(), "t").unwrap();
        // safety-weighted passes have a weak heuristic and cannot finish in zero time
        assert!(report.timed_out > 0);
        assert!(matches!(
            report.status,
            OptimizationStatus::Approximate | OptimizationStatus::TimedOut
        ));
        assert!(report.routes.iter().all(|r| r.approximate && r.id.ends_with('a')));
    }

    #[test]
    fn jaccard_similarity() {
        let mut a = FixedBitSet::with_capacity(8);
        let mut b = FixedBitSet::with_capacity(8);
        assert_eq!(jaccard(&a, &b), 1.0);
        a.insert_range(0..4);
        b.insert_range(2..6);
        assert!((jaccard(&a, &b) - 2.0 / 6.0).abs() < 1e-12);
    }
}
