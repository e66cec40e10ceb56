//! Edge traversal cost.
//!
//! Every term is expressed in seconds so the weights of the active strategy
//! can blend them directly. The distance term is length divided by the
//! vehicle's top speed, which keeps great-circle distance over top speed an
//! admissible A* heuristic for any non-negative weights.

use geo::Point;

use crate::{
    EngineConfig, Seconds,
    geometry::haversine,
    model::{
        GraphEdge, OptimizationMode, OverlaySnapshot, PreferenceWeights, VehicleConstraints,
        VehicleProfile,
    },
};

/// Lowest fraction of free-flow speed kept on steep edges
const MIN_SLOPE_SPEED_FACTOR: f64 = 0.3;
/// Speed lost per percent of grade above the vehicle threshold
const SLOPE_SPEED_LOSS: f64 = 0.05;
/// Accessibility penalty per percent of grade above the threshold, per 100 m
const SLOPE_DISCOMFORT: Seconds = 2.0;
/// Accessibility penalty per percent of grade above the vehicle limit, per 100 m
const SLOPE_EXCESS: Seconds = 10.0;
const NARROW_ROAD_PENALTY: Seconds = 120.0;
/// Emergency priority lets vehicles through half of the congestion delay
const EMERGENCY_DELAY_FACTOR: f64 = 0.5;

/// Weights of the four cost terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights {
    pub distance: f64,
    pub time: f64,
    pub safety: f64,
    pub accessibility: f64,
}

impl From<PreferenceWeights> for CostWeights {
    fn from(w: PreferenceWeights) -> Self {
        Self {
            distance: w.distance,
            time: w.time,
            safety: w.safety,
            accessibility: w.accessibility,
        }
    }
}

/// A named search strategy: how it weights edge costs and how it weights
/// metric scores when it is the request's mode.
pub struct Strategy {
    pub mode: OptimizationMode,
    pub route_name: &'static str,
    cost: fn(&PreferenceWeights) -> CostWeights,
    scoring: fn(&PreferenceWeights) -> PreferenceWeights,
}

impl Strategy {
    pub fn cost_weights(&self, preferences: &PreferenceWeights) -> CostWeights {
        (self.cost)(preferences)
    }

    pub fn scoring_weights(&self, preferences: &PreferenceWeights) -> PreferenceWeights {
        (self.scoring)(preferences)
    }
}

static STRATEGIES: [Strategy; 5] = [
    Strategy {
        mode: OptimizationMode::Fastest,
        route_name: "Fastest Route",
        cost: |_| CostWeights {
            distance: 0.0,
            time: 1.0,
            safety: 0.0,
            accessibility: 0.0,
        },
        scoring: |_| PreferenceWeights::new(0.15, 0.55, 0.15, 0.15),
    },
    Strategy {
        mode: OptimizationMode::Shortest,
        route_name: "Shortest Path",
        cost: |_| CostWeights {
            distance: 1.0,
            time: 0.0,
            safety: 0.0,
            accessibility: 0.0,
        },
        scoring: |_| PreferenceWeights::new(0.55, 0.15, 0.15, 0.15),
    },
    Strategy {
        mode: OptimizationMode::Safest,
        route_name: "Safest Route",
        cost: |_| CostWeights {
            distance: 0.0,
            time: 0.2,
            safety: 1.0,
            accessibility: 0.3,
        },
        scoring: |_| PreferenceWeights::new(0.1, 0.15, 0.6, 0.15),
    },
    Strategy {
        mode: OptimizationMode::MostAccessible,
        route_name: "Most Accessible Route",
        cost: |_| CostWeights {
            distance: 0.0,
            time: 0.3,
            safety: 0.2,
            accessibility: 1.0,
        },
        scoring: |_| PreferenceWeights::new(0.1, 0.15, 0.15, 0.6),
    },
    Strategy {
        mode: OptimizationMode::Balanced,
        route_name: "Balanced Route",
        cost: |p| CostWeights::from(p.normalized()),
        scoring: PreferenceWeights::normalized,
    },
];

impl OptimizationMode {
    /// Entry of the strategy table for this mode
    pub fn strategy(self) -> &'static Strategy {
        let idx = match self {
            OptimizationMode::Fastest => 0,
            OptimizationMode::Shortest => 1,
            OptimizationMode::Safest => 2,
            OptimizationMode::MostAccessible => 3,
            OptimizationMode::Balanced => 4,
        };
        &STRATEGIES[idx]
    }

    pub fn route_name(self) -> &'static str {
        self.strategy().route_name
    }
}

/// Why an edge cannot be traversed
#[derive(Debug, Clone, PartialEq)]
pub enum Blocked {
    /// Crosses a must-avoid hazard zone or its buffer
    Hazard(String),
    /// Closed by a traffic condition
    Closure(String),
}

/// Breakdown of what traversing one edge costs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeAssessment {
    /// Physical traversal time including traffic delay
    pub travel_time: Seconds,
    pub traffic_delay: Seconds,
    pub hazard_penalty: Seconds,
    pub traffic_penalty: Seconds,
    pub accessibility_penalty: Seconds,
    pub blocked: Option<Blocked>,
}

#[derive(Debug, Clone, Copy)]
pub struct CostParameters {
    pub hazard_base_penalty: Seconds,
    pub traffic_proximity: f64,
}

impl From<&EngineConfig> for CostParameters {
    fn from(config: &EngineConfig) -> Self {
        Self {
            hazard_base_penalty: config.hazard_base_penalty,
            traffic_proximity: config.traffic_proximity,
        }
    }
}

/// Cost of edges for one vehicle, strategy and overlay snapshot
pub struct CostModel<'a> {
    overlay: &'a OverlaySnapshot,
    constraints: &'a VehicleConstraints,
    profile: VehicleProfile,
    weights: CostWeights,
    params: CostParameters,
}

impl<'a> CostModel<'a> {
    pub fn new(
        overlay: &'a OverlaySnapshot,
        constraints: &'a VehicleConstraints,
        weights: CostWeights,
        params: CostParameters,
    ) -> Self {
        Self {
            overlay,
            constraints,
            profile: constraints.vehicle_type.profile(),
            weights,
            params,
        }
    }

    pub fn profile(&self) -> VehicleProfile {
        self.profile
    }

    /// Speed on the edge after the slope slowdown
    pub fn effective_speed(&self, edge: &GraphEdge) -> f64 {
        let speed = edge.base_speed.min(self.profile.max_speed);
        let excess = edge.slope.abs() - self.profile.slope_threshold;
        if excess > 0.0 {
            speed * (1.0 - excess * SLOPE_SPEED_LOSS).max(MIN_SLOPE_SPEED_FACTOR)
        } else {
            speed
        }
    }

    pub fn assess(&self, edge: &GraphEdge) -> EdgeAssessment {
        let mut assessment = EdgeAssessment::default();
        self.assess_hazards(edge, &mut assessment);
        self.assess_traffic(edge, &mut assessment);
        self.assess_accessibility(edge, &mut assessment);
        assessment.travel_time =
            edge.length / self.effective_speed(edge) + assessment.traffic_delay;
        assessment
    }

    fn assess_hazards(&self, edge: &GraphEdge, assessment: &mut EdgeAssessment) {
        for indexed in self.overlay.zones_intersecting(edge.bbox()) {
            let zone = &indexed.zone;
            if !zone.avoidance.enabled {
                continue;
            }
            let buffer = zone.effective_buffer();
            let distance = indexed.distance_to_line(&edge.geometry);
            if distance > buffer {
                continue;
            }
            if zone.is_must_avoid() && self.constraints.avoid_hazards {
                assessment.blocked = Some(Blocked::Hazard(zone.id.clone()));
                return;
            }
            let proximity = if distance <= 0.0 {
                2.0
            } else {
                1.0 - distance / buffer
            };
            assessment.hazard_penalty +=
                self.params.hazard_base_penalty * zone.severity.factor() * proximity;
        }
    }

    fn assess_traffic(&self, edge: &GraphEdge, assessment: &mut EdgeAssessment) {
        let priority = self.constraints.emergency_priority;
        for condition in self
            .overlay
            .traffic_on_line(&edge.geometry, edge.bbox(), self.params.traffic_proximity)
        {
            if condition.blocks(priority) {
                assessment.blocked = Some(Blocked::Closure(condition.id.clone()));
                return;
            }
            let mut delay = condition.delay_seconds();
            if priority {
                delay *= EMERGENCY_DELAY_FACTOR;
            }
            assessment.traffic_delay += delay;
            assessment.traffic_penalty += delay * condition.severity.factor() / 2.0;
        }
    }

    fn assess_accessibility(&self, edge: &GraphEdge, assessment: &mut EdgeAssessment) {
        let hundreds = edge.length / 100.0;
        let grade = edge.slope.abs();
        let discomfort = (grade - self.profile.slope_threshold).max(0.0);
        let excess = (grade - self.profile.max_slope).max(0.0);
        assessment.accessibility_penalty +=
            hundreds * (discomfort * SLOPE_DISCOMFORT + excess * SLOPE_EXCESS);

        if edge.width.is_some_and(|w| w < self.profile.min_width) {
            assessment.accessibility_penalty += NARROW_ROAD_PENALTY;
        }
    }

    /// Weighted cost of traversing the edge, `f64::INFINITY` if it is pruned
    pub fn cost(&self, edge: &GraphEdge) -> f64 {
        let a = self.assess(edge);
        if a.blocked.is_some() {
            return f64::INFINITY;
        }
        let w = &self.weights;
        w.time * a.travel_time
            + w.distance * edge.length / self.profile.max_speed
            + w.safety * (a.hazard_penalty + a.traffic_penalty)
            + w.accessibility * a.accessibility_penalty
    }

    /// Lower bound on the cost between two points
    pub fn heuristic(&self, from: Point<f64>, to: Point<f64>) -> f64 {
        (self.weights.time + self.weights.distance) * haversine(from, to) / self.profile.max_speed
    }
}

/// Cost of one edge under the given vehicle, weights and overlay
pub fn cost(
    edge: &GraphEdge,
    constraints: &VehicleConstraints,
    weights: CostWeights,
    overlay: &OverlaySnapshot,
    params: CostParameters,
) -> f64 {
    CostModel::new(overlay, constraints, weights, params).cost(edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AvoidancePolicy, AvoidancePriority, EdgeAttributes, GraphBuilder, HazardOverlayStore,
        HazardType, HazardZone, RoadNetworkGraph, Severity, TrafficCondition, TrafficType,
    };

    fn straight_edge(
        slope: f64,
        width: Option<f64>,
    ) -> (RoadNetworkGraph, petgraph::graph::EdgeIndex) {
        let mut builder = GraphBuilder::new();
        let a = builder.add_node(1, Point::new(0.0, 0.0), 0.0).unwrap();
        let b = builder.add_node(2, Point::new(0.001, 0.0), 0.0).unwrap();
        let mut attrs = EdgeAttributes::with_speed(10.0).slope(slope);
        if let Some(w) = width {
            attrs = attrs.width(w);
        }
        let e = builder.add_edge(1, a, b, attrs).unwrap();
        (builder.build().unwrap(), e)
    }

    fn params() -> CostParameters {
        CostParameters::from(&EngineConfig::default())
    }

    fn time_only() -> CostWeights {
        OptimizationMode::Fastest.strategy().cost_weights(&PreferenceWeights::default())
    }

    fn fire_on_edge(priority: AvoidancePriority) -> HazardZone {
        HazardZone::circular(
            "fire",
            HazardType::Fire,
            Point::new(0.0005, 0.0),
            20.0,
            Severity::High,
        )
        .with_avoidance(AvoidancePolicy {
            enabled: true,
            buffer_distance: 50.0,
            priority,
        })
    }

    #[test]
    fn flat_edge_costs_its_travel_time() {
        let (graph, e) = straight_edge(0.0, None);
        let overlay = HazardOverlayStore::new().snapshot();
        let constraints = VehicleConstraints::default();
        let c = cost(graph.edge(e).unwrap(), &constraints, time_only(), &overlay, params());
        let expected = graph.edge(e).unwrap().length / 10.0;
        assert!((c - expected).abs() < 1e-9);
    }

    #[test]
    fn steep_edges_are_slower() {
        let (flat, fe) = straight_edge(0.0, None);
        let (steep, se) = straight_edge(14.0, None);
        let overlay = HazardOverlayStore::new().snapshot();
        let constraints = VehicleConstraints::default();
        let model = CostModel::new(&overlay, &constraints, time_only(), params());
        let steep_edge = steep.edge(se).unwrap();
        assert!(model.effective_speed(steep_edge) < model.effective_speed(flat.edge(fe).unwrap()));
        assert!(model.assess(steep.edge(se).unwrap()).accessibility_penalty > 0.0);
    }

    #[test]
    fn must_avoid_hazard_prunes_edge() {
        let (graph, e) = straight_edge(0.0, None);
        let store = HazardOverlayStore::new();
        store.add_hazard_zone(fire_on_edge(AvoidancePriority::MustAvoid));
        let overlay = store.snapshot();
        let constraints = VehicleConstraints::default();

        let c = cost(graph.edge(e).unwrap(), &constraints, time_only(), &overlay, params());
        assert!(c.is_infinite());

        let relaxed = VehicleConstraints {
            avoid_hazards: false,
            ..VehicleConstraints::default()
        };
        let c = cost(graph.edge(e).unwrap(), &relaxed, time_only(), &overlay, params());
        assert!(c.is_finite());
    }

    #[test]
    fn prefer_avoid_hazard_adds_severity_penalty() {
        let (graph, e) = straight_edge(0.0, None);
        let store = HazardOverlayStore::new();
        store.add_hazard_zone(fire_on_edge(AvoidancePriority::PreferAvoid));
        let overlay = store.snapshot();
        let constraints = VehicleConstraints::default();
        let model = CostModel::new(&overlay, &constraints, time_only(), params());

        let a = model.assess(graph.edge(e).unwrap());
        assert!(a.blocked.is_none());
        // crossing a high severity zone: base * 4 * 2
        assert!((a.hazard_penalty - 300.0 * 4.0 * 2.0).abs() < 1e-6);

        let safest = OptimizationMode::Safest
            .strategy()
            .cost_weights(&PreferenceWeights::default());
        let safe_model = CostModel::new(&overlay, &constraints, safest, params());
        assert!(safe_model.cost(graph.edge(e).unwrap()) > model.cost(graph.edge(e).unwrap()));
    }

    #[test]
    fn distant_hazard_has_no_effect() {
        let (graph, e) = straight_edge(0.0, None);
        let store = HazardOverlayStore::new();
        store.add_hazard_zone(HazardZone::circular(
            "far",
            HazardType::Flood,
            Point::new(0.0005, 0.01),
            20.0,
            Severity::Critical,
        ));
        let overlay = store.snapshot();
        let constraints = VehicleConstraints::default();
        let model = CostModel::new(&overlay, &constraints, time_only(), params());
        assert_eq!(model.assess(graph.edge(e).unwrap()).hazard_penalty, 0.0);
    }

    #[test]
    fn traffic_delay_and_closures() {
        let (graph, e) = straight_edge(0.0, None);
        let store = HazardOverlayStore::new();
        let mut jam = TrafficCondition {
            id: "jam".to_string(),
            location: Point::new(0.0005, 0.0),
            traffic_type: TrafficType::Congestion,
            severity: Severity::Medium,
            delay: 2.0,
            emergency_access: true,
        };
        store.add_traffic_condition(jam.clone());
        let constraints = VehicleConstraints::default();
        let overlay = store.snapshot();
        let model = CostModel::new(&overlay, &constraints, time_only(), params());
        let a = model.assess(graph.edge(e).unwrap());
        assert!((a.traffic_delay - 120.0).abs() < 1e-9);

        jam.traffic_type = TrafficType::Closure;
        store.add_traffic_condition(jam);
        let overlay = store.snapshot();
        let model = CostModel::new(&overlay, &constraints, time_only(), params());
        assert!(matches!(model.assess(graph.edge(e).unwrap()).blocked, Some(Blocked::Closure(_))));

        let emergency = VehicleConstraints {
            emergency_priority: true,
            ..VehicleConstraints::default()
        };
        let model = CostModel::new(&overlay, &emergency, time_only(), params());
        let a = model.assess(graph.edge(e).unwrap());
        assert!(a.blocked.is_none());
        assert!((a.traffic_delay - 60.0).abs() < 1e-9);
    }

    #[test]
    fn narrow_roads_penalize_large_vehicles() {
        let (graph, e) = straight_edge(0.0, Some(2.4));
        let overlay = HazardOverlayStore::new().snapshot();
        let truck = VehicleConstraints {
            vehicle_type: crate::model::VehicleType::FireTruck,
            ..VehicleConstraints::default()
        };
        let model = CostModel::new(&overlay, &truck, time_only(), params());
        assert_eq!(model.assess(graph.edge(e).unwrap()).accessibility_penalty, NARROW_ROAD_PENALTY);
    }

    #[test]
    fn heuristic_never_exceeds_edge_cost() {
        let (graph, e) = straight_edge(0.0, None);
        let overlay = HazardOverlayStore::new().snapshot();
        let constraints = VehicleConstraints::default();
        for mode in OptimizationMode::ALL {
            let weights = mode.strategy().cost_weights(&PreferenceWeights::default());
            let model = CostModel::new(&overlay, &constraints, weights, params());
            let (a, b) = graph.endpoints(e).unwrap();
            let (from, to) = (graph.node(a).unwrap(), graph.node(b).unwrap());
            let h = model.heuristic(from.geometry, to.geometry);
            assert!(h <= model.cost(graph.edge(e).unwrap()) + 1e-9, "{mode:?}");
        }
    }

    #[test]
    fn strategy_table_names() {
        assert_eq!(OptimizationMode::Shortest.route_name(), "Shortest Path");
        assert_eq!(OptimizationMode::MostAccessible.route_name(), "Most Accessible Route");
        for mode in OptimizationMode::ALL {
            assert_eq!(mode.strategy().mode, mode);
        }
    }
}
