//! Engine context owning the road network, overlay, cache and update bus.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use geo::{BoundingRect, Intersects, LineString, Point};
use itertools::Itertools;
use log::{info, warn};
use petgraph::graph::EdgeIndex;

use crate::{
    EngineConfig, Error, Meters, RouteId,
    algo::{
        comparison::{RouteComparator, RouteComparison},
        metrics::{RouteMetrics, RouteMetricsCalculator},
    },
    cache::{CacheKey, CacheStats, IssuedRoute, OptimizationCache},
    geometry::{LocalProjection, point_line_distance},
    model::{
        AvoidancePriority, HazardOverlayStore, HazardZone, OptimizationRequest,
        OptimizationResult, OptimizationStatus, OverlaySnapshot, RoadNetworkGraph, Route, Severity,
        TrafficCondition, TrafficType, overlay::IndexedZone,
    },
    routing::search::{PathSearchEngine, SearchReport},
    updates::{
        DynamicRouteUpdate, DynamicUpdateBus, RecommendedAction, SubscriptionId, UpdateType,
    },
};

/// Everything needed to answer optimization requests against one road
/// network. All operations take `&self` and may be called from many threads.
pub struct RoutingEngine {
    graph: Arc<RoadNetworkGraph>,
    overlay: HazardOverlayStore,
    cache: OptimizationCache,
    bus: DynamicUpdateBus,
    config: EngineConfig,
}

impl RoutingEngine {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is out of range
    pub fn new(graph: RoadNetworkGraph, config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        info!(
            "Routing engine ready: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self {
            graph: Arc::new(graph),
            overlay: HazardOverlayStore::new(),
            cache: OptimizationCache::new(config.cache_ttl(), config.cache_capacity),
            bus: DynamicUpdateBus::new(),
            config,
        })
    }

    pub fn graph(&self) -> &RoadNetworkGraph {
        &self.graph
    }

    pub fn overlay(&self) -> &HazardOverlayStore {
        &self.overlay
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &DynamicUpdateBus {
        &self.bus
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn issued_route(&self, id: &str) -> Option<Arc<IssuedRoute>> {
        self.cache.issued_route(id)
    }

    /// Computes ranked candidate routes, or returns the cached result for an
    /// identical request against the same overlay state.
    pub fn optimize_route(&self, request: &OptimizationRequest) -> OptimizationResult {
        let started = Instant::now();
        let snapshot = self.overlay.snapshot();

        if let Err(e) = request.validate() {
            warn!("Rejected optimization request: {e}");
            let mut result = OptimizationResult::failure(
                OptimizationStatus::InvalidRequest,
                e.to_string(),
                request.constraints.clone(),
                snapshot.version(),
            );
            result.recommendations.push("Fix the request and try again".to_string());
            result.optimization_time = started.elapsed();
            return result;
        }

        let key = CacheKey::new(request, snapshot.hazard_version(), snapshot.traffic_version());
        if let Some(mut hit) = self.cache.get(&key) {
            hit.optimization_time = started.elapsed();
            hit.from_cache = true;
            return hit;
        }

        let deadline = started + request.timeout().unwrap_or_else(|| self.config.default_timeout());
        let prefix = format!("{:016x}", key.fingerprint());
        let mut result = self.compute(request, &snapshot, deadline, &prefix);
        result.optimization_time = started.elapsed();

        // Approximate and timed-out outcomes depend on machine load
        if matches!(
            result.status,
            OptimizationStatus::Optimized
                | OptimizationStatus::Infeasible
                | OptimizationStatus::InvalidRequest
        ) {
            self.cache.insert(key, result.clone());
        }
        self.cache.register_routes(&result);

        info!(
            "Optimization finished as {:?} with {} routes in {:.1} ms",
            result.status,
            result.routes.len(),
            result.optimization_time.as_secs_f64() * 1000.0
        );
        result
    }

    fn compute(
        &self,
        request: &OptimizationRequest,
        snapshot: &OverlaySnapshot,
        deadline: Instant,
        prefix: &str,
    ) -> OptimizationResult {
        let search = PathSearchEngine::new(&self.graph, snapshot, &self.config);
        let report = match search.generate(request, deadline, prefix) {
            Ok(report) => report,
            Err(e) => {
                let mut result = OptimizationResult::failure(
                    OptimizationStatus::InvalidRequest,
                    e.to_string(),
                    request.constraints.clone(),
                    snapshot.version(),
                );
                result
                    .recommendations
                    .push("Choose points closer to the road network".to_string());
                return result;
            }
        };

        if !report.status.is_success() {
            let mut result = OptimizationResult::failure(
                report.status,
                report.message.clone().unwrap_or_default(),
                request.constraints.clone(),
                snapshot.version(),
            );
            result.recommendations = self.failure_recommendations(request, &report);
            return result;
        }

        let metrics = RouteMetricsCalculator::new(&self.graph, snapshot, &self.config)
            .calculate_all(&report.routes, request);
        let best = metrics
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (idx, m)| match best {
                Some((_, score)) if m.performance.overall_score <= score => best,
                _ => Some((idx, m.performance.overall_score)),
            })
            .map(|(idx, _)| idx);

        let best_route = best.map(|idx| report.routes[idx].id.clone());
        let alternatives = report
            .routes
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != best)
            .map(|(_, route)| route.id.clone())
            .collect();
        let recommendations = best
            .map(|idx| self.route_recommendations(request, &report, idx, &metrics[idx]))
            .unwrap_or_default();

        OptimizationResult {
            success: true,
            status: report.status,
            message: report.message,
            routes: report.routes,
            best_route,
            alternatives,
            metrics,
            optimization_time: Duration::ZERO,
            constraints: request.constraints.clone(),
            recommendations,
            overlay_version: snapshot.version(),
            from_cache: false,
        }
    }

    fn failure_recommendations(
        &self,
        request: &OptimizationRequest,
        report: &SearchReport,
    ) -> Vec<String> {
        let mut out = Vec::new();
        match report.status {
            OptimizationStatus::TimedOut => out.push(format!(
                "Increase the search timeout (currently {} ms)",
                request
                    .timeout()
                    .unwrap_or_else(|| self.config.default_timeout())
                    .as_millis()
            )),
            OptimizationStatus::Infeasible if report.violations.total() > 0 => {
                for limit in report.violations.limiting() {
                    out.push(format!("Every candidate route exceeds {limit}; relax this limit"));
                }
            }
            OptimizationStatus::Infeasible => {
                if request.constraints.avoid_hazards {
                    out.push(
                        "Must-avoid hazards or closures cut off the destination; \
                         allow hazard traversal or wait for conditions to clear"
                            .to_string(),
                    );
                } else {
                    out.push("Road closures cut off the destination".to_string());
                }
                if !request.constraints.emergency_priority {
                    out.push(
                        "Emergency priority may open closures with emergency access".to_string(),
                    );
                }
            }
            _ => {}
        }
        out
    }

    fn route_recommendations(
        &self,
        request: &OptimizationRequest,
        report: &SearchReport,
        best: usize,
        metrics: &RouteMetrics,
    ) -> Vec<String> {
        let route = &report.routes[best];
        let label = request.constraints.vehicle_type.label();
        let mut out = vec![format!("Take the {} ({})", route.name, route.id)];

        if !metrics.safety.intersected_hazards.is_empty() {
            out.push(format!(
                "Route crosses hazard zones {}; proceed with caution",
                metrics.safety.intersected_hazards.join(", ")
            ));
        } else if !metrics.safety.nearby_hazards.is_empty() {
            out.push(format!(
                "Route passes close to hazard zones {}",
                metrics.safety.nearby_hazards.join(", ")
            ));
        }
        if metrics.traffic.delay > 0.0 {
            out.push(format!(
                "Expect about {:.0} min of traffic delay",
                (metrics.traffic.delay / 60.0).ceil()
            ));
        }
        if !metrics.accessibility.slope_compatible {
            out.push(format!("Route includes grades steeper than a {label} handles well"));
        }
        if !metrics.accessibility.width_compatible {
            out.push(format!("Route includes roads narrower than a {label} needs"));
        }
        if report.routes.len() > 1 {
            out.push(format!("{} alternative routes available", report.routes.len() - 1));
        }
        if report.status == OptimizationStatus::Approximate {
            out.push("Some strategies ran out of time; results are approximate".to_string());
        }
        out
    }

    /// Adds or replaces a hazard zone and notifies subscribers of issued
    /// routes it affects. Returns the number of deliveries.
    pub fn add_hazard_zone(&self, zone: HazardZone) -> usize {
        let id = zone.id.clone();
        if self.overlay.add_hazard_zone(zone).is_some() {
            info!("Hazard zone {id} replaced");
        } else {
            info!("Hazard zone {id} added");
        }
        let snapshot = self.overlay.snapshot();
        let Some(indexed) = snapshot.zone(&id) else {
            return 0;
        };
        self.notify_zone(indexed, UpdateType::HazardDetected)
    }

    /// Removes a hazard zone. Routes it affected receive `hazard_cleared`.
    pub fn remove_hazard_zone(&self, id: &str) -> Option<HazardZone> {
        let indexed = self.overlay.snapshot().zone(id).cloned()?;
        let removed = self.overlay.remove_hazard_zone(id)?;
        info!("Hazard zone {id} removed");
        self.notify_zone(&indexed, UpdateType::HazardCleared);
        Some(removed)
    }

    pub fn add_traffic_condition(&self, condition: TrafficCondition) -> usize {
        info!("Traffic condition {} ({:?}) reported", condition.id, condition.traffic_type);
        self.overlay.add_traffic_condition(condition.clone());
        self.notify_traffic(&condition, false)
    }

    pub fn remove_traffic_condition(&self, id: &str) -> Option<TrafficCondition> {
        let removed = self.overlay.remove_traffic_condition(id)?;
        info!("Traffic condition {id} cleared");
        self.notify_traffic(&removed, true);
        Some(removed)
    }

    fn notify_zone(&self, indexed: &IndexedZone, update_type: UpdateType) -> usize {
        let zone = &indexed.zone;
        if !zone.avoidance.enabled {
            return 0;
        }
        let mut delivered = 0;
        for issued in self.watched_routes() {
            let route = &issued.route;
            let touches_envelope = route
                .geometry
                .bounding_rect()
                .is_some_and(|bbox| bbox.intersects(&indexed.envelope()));
            if !touches_envelope {
                continue;
            }
            let affected = self.affected_segments(route, |edge| indexed.line_within_buffer(edge));
            if affected.is_empty() {
                continue;
            }

            let update = if update_type == UpdateType::HazardCleared {
                DynamicRouteUpdate::new(
                    route.id.clone(),
                    update_type,
                    Severity::Low,
                    format!("Hazard zone {} along {} has been cleared", zone.id, route.name),
                )
                .with_action(RecommendedAction::Continue)
            } else {
                let must_reroute = (zone.avoidance.priority == AvoidancePriority::MustAvoid
                    && issued.constraints.avoid_hazards)
                    || zone.severity == Severity::Critical;
                DynamicRouteUpdate::new(
                    route.id.clone(),
                    update_type,
                    zone.severity,
                    format!(
                        "{:?} hazard {} affects {} segments of {}",
                        zone.hazard_type,
                        zone.id,
                        affected.len(),
                        route.name
                    ),
                )
                .with_action(if must_reroute {
                    RecommendedAction::Reroute
                } else {
                    RecommendedAction::Monitor
                })
            };
            delivered += self
                .bus
                .trigger_route_update(&update.with_location(zone.center).with_segments(affected));
        }
        delivered
    }

    fn notify_traffic(&self, condition: &TrafficCondition, cleared: bool) -> usize {
        let proximity = self.config.traffic_proximity;
        let mut delivered = 0;
        for issued in self.watched_routes() {
            let route = &issued.route;
            let affected = self.affected_segments(route, |edge| {
                near_line(condition.location, edge, proximity)
            });
            if affected.is_empty() {
                continue;
            }

            let priority = issued.constraints.emergency_priority;
            let update = if cleared {
                DynamicRouteUpdate::new(
                    route.id.clone(),
                    UpdateType::TrafficChange,
                    Severity::Low,
                    format!("Traffic condition {} along {} has cleared", condition.id, route.name),
                )
                .with_action(RecommendedAction::Continue)
            } else {
                let update_type = if condition.traffic_type == TrafficType::Closure {
                    UpdateType::RoadClosure
                } else {
                    UpdateType::TrafficChange
                };
                let delay = if priority {
                    condition.delay_seconds() * 0.5
                } else {
                    condition.delay_seconds()
                };
                DynamicRouteUpdate::new(
                    route.id.clone(),
                    update_type,
                    condition.severity,
                    format!(
                        "{:?} {} on {} adds about {:.0} min",
                        condition.traffic_type,
                        condition.id,
                        route.name,
                        delay / 60.0
                    ),
                )
                .with_action(if condition.blocks(priority) {
                    RecommendedAction::Reroute
                } else {
                    RecommendedAction::Monitor
                })
                .with_delay(delay)
            };
            delivered += self.bus.trigger_route_update(
                &update.with_location(condition.location).with_segments(affected),
            );
        }
        delivered
    }

    /// Issued routes that somebody listens to
    fn watched_routes(&self) -> Vec<Arc<IssuedRoute>> {
        self.bus
            .subscribed_routes()
            .iter()
            .filter_map(|id| self.cache.issued_route(id))
            .collect()
    }

    /// Indices of the route's segments for which `hit` holds
    fn affected_segments(
        &self,
        route: &Route,
        hit: impl Fn(&LineString<f64>) -> bool,
    ) -> Vec<usize> {
        route
            .segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| match self.graph.edge(EdgeIndex::new(segment.edge_index)) {
                Some(edge) => hit(&edge.geometry),
                None => hit(&LineString::from(vec![segment.from, segment.to])),
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Ranks previously issued routes against the current overlay
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyRouteSet`] if no id resolves to an issued route
    pub fn compare_routes(&self, route_ids: &[RouteId]) -> Result<RouteComparison, Error> {
        let issued: Vec<Arc<IssuedRoute>> = route_ids
            .iter()
            .unique()
            .filter_map(|id| {
                let found = self.cache.issued_route(id);
                if found.is_none() {
                    warn!("Route {id} is not known, skipping it in comparison");
                }
                found
            })
            .collect();
        if issued.is_empty() {
            return Err(Error::EmptyRouteSet);
        }

        let pairs: Vec<_> = issued.iter().map(|i| (&i.route, &i.metrics)).collect();
        let snapshot = self.overlay.snapshot();
        RouteComparator::new(&snapshot).compare(&pairs)
    }

    pub fn register_update_callback(
        &self,
        route_id: &str,
        callback: impl Fn(&DynamicRouteUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.bus.register_update_callback(route_id, callback)
    }

    pub fn unregister_update_callback(&self, route_id: &str) -> usize {
        self.bus.unregister_update_callback(route_id)
    }

    pub fn trigger_route_update(&self, update: &DynamicRouteUpdate) -> usize {
        self.bus.trigger_route_update(update)
    }

    /// Drops cached results, issued routes and the whole overlay.
    /// Subscriptions are kept.
    pub fn clear(&self) {
        self.cache.clear();
        self.overlay.clear();
        info!("Routing engine state cleared");
    }
}

fn near_line(location: Point<f64>, line: &LineString<f64>, proximity: Meters) -> bool {
    let projection = LocalProjection::around(location.y());
    point_line_distance(&projection.point(location), &projection.line(line)) <= proximity
}
