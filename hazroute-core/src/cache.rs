//! Memoized optimization results and the registry of issued routes.
//!
//! Keys embed the overlay versions a result was computed against, so any
//! overlay mutation makes older entries unreachable without touching them.
//! They age out through the TTL or capacity eviction instead. Issued routes
//! are bounded too: the registry keeps the most recent `capacity` results'
//! worth of routes.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use hashbrown::HashMap;
use itertools::Itertools;
use log::{debug, trace};
use serde::Serialize;

use crate::{
    RouteId,
    algo::metrics::RouteMetrics,
    model::{
        OptimizationMode, OptimizationRequest, OptimizationResult, Route, VehicleConstraints,
        VehicleType,
    },
};

/// Float identity by bit pattern, with both zeros folded together
fn bits(value: f64) -> u64 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

/// Deterministic identity of a request against one overlay state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    stops: Vec<(u64, u64)>,
    limits: [Option<u64>; 3],
    avoid_hazards: bool,
    emergency_priority: bool,
    vehicle_type: VehicleType,
    mode: OptimizationMode,
    preferences: [u64; 4],
    hazard_version: u64,
    traffic_version: u64,
}

impl CacheKey {
    pub fn new(request: &OptimizationRequest, hazard_version: u64, traffic_version: u64) -> Self {
        let c = &request.constraints;
        let p = &request.preferences;
        Self {
            stops: request
                .stops()
                .iter()
                .map(|s| (bits(s.x()), bits(s.y())))
                .collect(),
            limits: [
                c.max_distance.map(bits),
                c.max_time.map(bits),
                c.max_slope.map(bits),
            ],
            avoid_hazards: c.avoid_hazards,
            emergency_priority: c.emergency_priority,
            vehicle_type: c.vehicle_type,
            mode: request.mode,
            preferences: [
                bits(p.distance),
                bits(p.time),
                bits(p.safety),
                bits(p.accessibility),
            ],
            hazard_version,
            traffic_version,
        }
    }

    /// Stable 64-bit digest, used to derive route ids
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// A route handed out to a caller, kept for comparison and change detection
#[derive(Debug, Clone)]
pub struct IssuedRoute {
    pub route: Route,
    pub metrics: RouteMetrics,
    pub constraints: VehicleConstraints,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub issued_routes: usize,
    pub hits: u64,
    pub misses: u64,
}

struct CacheEntry {
    result: OptimizationResult,
    inserted: Instant,
    sequence: u64,
}

struct RegistryEntry {
    issued: Arc<IssuedRoute>,
    sequence: u64,
}

pub struct OptimizationCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    routes: RwLock<HashMap<RouteId, RegistryEntry>>,
    ttl: Duration,
    capacity: usize,
    route_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    sequence: AtomicU64,
}

impl OptimizationCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
            route_capacity: capacity.max(1) * OptimizationMode::ALL.len(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Stored result for the key if it has not expired
    pub fn get(&self, key: &CacheKey) -> Option<OptimizationResult> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries
            .get(key)
            .filter(|entry| entry.inserted.elapsed() < self.ttl)
            .map(|entry| entry.result.clone());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: CacheKey, result: OptimizationResult) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted.elapsed() < ttl);

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.sequence)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                trace!("Evicting oldest cache entry");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                result,
                inserted: Instant::now(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    /// Records every route of a result so it can be compared and monitored.
    /// The oldest registrations are forgotten once the registry is full.
    pub fn register_routes(&self, result: &OptimizationResult) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        for (route, metrics) in result.routes.iter().zip(&result.metrics) {
            routes.insert(
                route.id.clone(),
                RegistryEntry {
                    issued: Arc::new(IssuedRoute {
                        route: route.clone(),
                        metrics: metrics.clone(),
                        constraints: result.constraints.clone(),
                    }),
                    sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                },
            );
        }

        let excess = routes.len().saturating_sub(self.route_capacity);
        if excess > 0 {
            let oldest: Vec<RouteId> = routes
                .iter()
                .map(|(id, entry)| (entry.sequence, id))
                .k_smallest(excess)
                .map(|(_, id)| id.clone())
                .collect();
            for id in &oldest {
                routes.remove(id);
            }
            trace!("Forgot {excess} issued routes");
        }
    }

    pub fn issued_route(&self, id: &str) -> Option<Arc<IssuedRoute>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| Arc::clone(&entry.issued))
    }

    pub fn issued_routes(&self) -> Vec<Arc<IssuedRoute>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| Arc::clone(&entry.issued))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            issued_routes: self.routes.read().unwrap_or_else(PoisonError::into_inner).len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drops all results and issued routes
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.routes.write().unwrap_or_else(PoisonError::into_inner).clear();
        debug!("Optimization cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use geo::Point;

    use super::*;
    use crate::model::{OptimizationStatus, PreferenceWeights};

    fn request() -> OptimizationRequest {
        OptimizationRequest::new(Point::new(0.0, 0.0), Point::new(0.001, 0.001))
    }

    fn result(tag: &str) -> OptimizationResult {
        OptimizationResult::failure(
            OptimizationStatus::Infeasible,
            tag,
            VehicleConstraints::default(),
            0,
        )
    }

    #[test]
    fn keys_follow_request_and_versions() {
        let a = CacheKey::new(&request(), 0, 0);
        assert_eq!(a, CacheKey::new(&request(), 0, 0));
        assert_eq!(a.fingerprint(), CacheKey::new(&request(), 0, 0).fingerprint());
        assert_ne!(a, CacheKey::new(&request(), 1, 0));
        assert_ne!(a, CacheKey::new(&request(), 0, 1));

        let other = request().with_preferences(PreferenceWeights::new(1.0, 0.0, 0.0, 0.0));
        assert_ne!(a, CacheKey::new(&other, 0, 0));
    }

    #[test]
    fn negative_zero_matches_zero() {
        let positive = OptimizationRequest::new(Point::new(0.0, 0.0), Point::new(0.001, 0.001));
        let negative = OptimizationRequest::new(Point::new(-0.0, 0.0), Point::new(0.001, 0.001));
        assert_eq!(CacheKey::new(&positive, 0, 0), CacheKey::new(&negative, 0, 0));
    }

    #[test]
    fn hit_and_miss_are_counted() {
        let cache = OptimizationCache::new(Duration::from_secs(60), 4);
        let key = CacheKey::new(&request(), 0, 0);
        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), result("first"));
        assert_eq!(cache.get(&key).unwrap().message.as_deref(), Some("first"));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = OptimizationCache::new(Duration::ZERO, 4);
        let key = CacheKey::new(&request(), 0, 0);
        cache.insert(key.clone(), result("stale"));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = OptimizationCache::new(Duration::from_secs(60), 2);
        let keys: Vec<_> = (0..3).map(|v| CacheKey::new(&request(), v, 0)).collect();
        for key in &keys {
            cache.insert(key.clone(), result("r"));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&keys[0]).is_none());
        assert!(cache.get(&keys[2]).is_some());
    }

    fn issued(ids: &[&str]) -> OptimizationResult {
        let mut result = result("issued");
        for id in ids {
            result.routes.push(Route {
                id: (*id).to_string(),
                name: "Fastest Route".to_string(),
                strategy: OptimizationMode::Fastest,
                waypoints: Vec::new(),
                segments: Vec::new(),
                geometry: geo::LineString::new(Vec::new()),
                total_distance: 0.0,
                total_time: 0.0,
                max_slope: 0.0,
                approximate: false,
            });
            result.metrics.push(RouteMetrics {
                route_id: (*id).to_string(),
                ..RouteMetrics::default()
            });
        }
        result
    }

    #[test]
    fn registry_forgets_oldest_routes_when_full() {
        let cache = OptimizationCache::new(Duration::from_secs(60), 2);
        let limit = 2 * OptimizationMode::ALL.len();
        for batch in 0..50 {
            let ids = [format!("b{batch}-0"), format!("b{batch}-1")];
            cache.register_routes(&issued(&[ids[0].as_str(), ids[1].as_str()]));
            assert!(cache.stats().issued_routes <= limit);
        }
        assert_eq!(cache.stats().issued_routes, limit);
        assert!(cache.issued_route("b0-0").is_none());
        assert!(cache.issued_route("b49-1").is_some());
        assert_eq!(cache.issued_route("b49-0").unwrap().metrics.route_id, "b49-0");
    }

    #[test]
    fn clear_drops_everything() {
        let cache = OptimizationCache::new(Duration::from_secs(60), 2);
        cache.insert(CacheKey::new(&request(), 0, 0), result("r"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().issued_routes, 0);
    }
}
