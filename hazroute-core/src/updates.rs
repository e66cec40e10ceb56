//! Change notifications for issued routes.
//!
//! Subscribers are kept per route id in registration order. Delivery happens
//! synchronously on the triggering thread, after the registry lock has been
//! released, so a callback may itself register or unregister subscribers.

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
    mpsc,
};

use chrono::{DateTime, Utc};
use geo::Point;
use hashbrown::HashMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::{RouteId, Seconds, model::Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    HazardDetected,
    HazardCleared,
    TrafficChange,
    RoadClosure,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Continue,
    Monitor,
    Reroute,
}

/// Event telling the holder of a route that conditions along it changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRouteUpdate {
    pub route_id: RouteId,
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub location: Option<Point<f64>>,
    /// Indices into the route's segment list
    #[serde(default)]
    pub affected_segments: Vec<usize>,
    pub recommended_action: RecommendedAction,
    #[serde(default)]
    pub estimated_delay: Seconds,
    pub timestamp: DateTime<Utc>,
}

impl DynamicRouteUpdate {
    pub fn new(
        route_id: impl Into<RouteId>,
        update_type: UpdateType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            update_type,
            severity,
            description: description.into(),
            location: None,
            affected_segments: Vec::new(),
            recommended_action: RecommendedAction::Monitor,
            estimated_delay: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Point<f64>) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_segments(mut self, segments: Vec<usize>) -> Self {
        self.affected_segments = segments;
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: RecommendedAction) -> Self {
        self.recommended_action = action;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Seconds) -> Self {
        self.estimated_delay = delay;
        self
    }
}

pub type UpdateCallback = Arc<dyn Fn(&DynamicRouteUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
enum Subscriber {
    Callback(UpdateCallback),
    Channel(mpsc::Sender<DynamicRouteUpdate>),
}

type Registry = HashMap<RouteId, Vec<(SubscriptionId, Subscriber)>>;

#[derive(Default)]
pub struct DynamicUpdateBus {
    subscribers: RwLock<Registry>,
    next_id: AtomicU64,
}

impl DynamicUpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, route_id: &str, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(route_id.to_string())
            .or_default()
            .push((id, subscriber));
        trace!("Subscription {id:?} registered for route {route_id}");
        id
    }

    /// Adds a callback invoked for every update of the route
    pub fn register_update_callback(
        &self,
        route_id: &str,
        callback: impl Fn(&DynamicRouteUpdate) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(route_id, Subscriber::Callback(Arc::new(callback)))
    }

    /// Message-passing alternative to callbacks. Dropping the receiver ends
    /// the subscription on the next delivery.
    pub fn subscribe(
        &self,
        route_id: &str,
    ) -> (SubscriptionId, mpsc::Receiver<DynamicRouteUpdate>) {
        let (tx, rx) = mpsc::channel();
        (self.add(route_id, Subscriber::Channel(tx)), rx)
    }

    /// Removes every subscriber of the route, returning how many there were
    pub fn unregister_update_callback(&self, route_id: &str) -> usize {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(route_id)
            .map_or(0, |subs| subs.len());
        debug!("Unregistered {removed} subscribers of route {route_id}");
        removed
    }

    /// Removes a single subscription
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let mut found = false;
        registry.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(sub, _)| *sub != id);
            found |= subs.len() != before;
            !subs.is_empty()
        });
        found
    }

    pub fn has_subscribers(&self, route_id: &str) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(route_id)
            .is_some_and(|subs| !subs.is_empty())
    }

    /// Route ids with at least one subscriber
    pub fn subscribed_routes(&self) -> Vec<RouteId> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Delivers the update to the route's subscribers in registration order
    /// and returns how many received it
    pub fn trigger_route_update(&self, update: &DynamicRouteUpdate) -> usize {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&update.route_id)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        let mut disconnected = Vec::new();
        for (id, subscriber) in subscribers {
            match subscriber {
                Subscriber::Callback(callback) => {
                    callback(update);
                    delivered += 1;
                }
                Subscriber::Channel(tx) => {
                    if tx.send(update.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        disconnected.push(id);
                    }
                }
            }
        }
        for id in disconnected {
            self.unsubscribe(id);
        }

        debug!(
            "Delivered {:?} update for route {} to {delivered} subscribers",
            update.update_type, update.route_id
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, atomic::AtomicUsize};

    use super::*;

    fn manual(route: &str) -> DynamicRouteUpdate {
        DynamicRouteUpdate::new(route, UpdateType::Manual, Severity::Low, "test")
    }

    #[test]
    fn callback_fires_once_per_trigger() {
        let bus = DynamicUpdateBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.register_update_callback("R1", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.trigger_route_update(&manual("R1")), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(bus.unregister_update_callback("R1"), 1);
        assert_eq!(bus.trigger_route_update(&manual("R1")), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_routes_are_not_notified() {
        let bus = DynamicUpdateBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.register_update_callback("R1", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.trigger_route_update(&manual("R2")), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn delivery_follows_registration_order() {
        let bus = DynamicUpdateBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.register_update_callback("R1", move |_| order.lock().unwrap().push(tag));
        }
        bus.trigger_route_update(&manual("R1"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn channel_subscribers_receive_updates() {
        let bus = DynamicUpdateBus::new();
        let (_, rx) = bus.subscribe("R1");
        bus.trigger_route_update(&manual("R1"));
        let update = rx.try_recv().unwrap();
        assert_eq!(update.route_id, "R1");
        assert_eq!(update.update_type, UpdateType::Manual);

        drop(rx);
        assert_eq!(bus.trigger_route_update(&manual("R1")), 0);
        assert!(!bus.has_subscribers("R1"));
    }

    #[test]
    fn callback_may_unregister_itself() {
        let bus = Arc::new(DynamicUpdateBus::new());
        let inner = Arc::clone(&bus);
        bus.register_update_callback("R1", move |update| {
            inner.unregister_update_callback(&update.route_id);
        });
        assert_eq!(bus.trigger_route_update(&manual("R1")), 1);
        assert!(!bus.has_subscribers("R1"));
    }

    #[test]
    fn unsubscribe_removes_single_subscription() {
        let bus = DynamicUpdateBus::new();
        let first = bus.register_update_callback("R1", |_| {});
        bus.register_update_callback("R1", |_| {});
        assert!(bus.unsubscribe(first));
        assert!(!bus.unsubscribe(first));
        assert_eq!(bus.trigger_route_update(&manual("R1")), 1);
    }

    #[test]
    fn update_serializes_type_tag() {
        let update = manual("R1").with_action(RecommendedAction::Reroute);
        let json = serde_json::to_value(update).unwrap();
        assert_eq!(json["type"], "manual");
        assert_eq!(json["recommended_action"], "reroute");
    }
}
