//! Versioned hazard and traffic overlay.
//!
//! Writers serialize on a mutex, build a fresh immutable [`OverlaySnapshot`]
//! and publish it by swapping an `Arc`. Readers only clone the published
//! `Arc`, so they always see a complete snapshot and use its version to
//! detect staleness.

use std::sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
};

use geo::{BoundingRect, LineString, Point, Polygon, Rect};
use log::debug;
use rstar::{
    AABB, RTree,
    primitives::{GeomWithData, Rectangle},
};

use super::{hazard::HazardZone, traffic::TrafficCondition};
use crate::{
    Meters,
    geometry::{LocalProjection, expand_rect, line_polygon_distance, point_line_distance},
};

type ZoneEntry = GeomWithData<Rectangle<[f64; 2]>, usize>;
type TrafficEntry = GeomWithData<[f64; 2], usize>;

/// Hazard zone with its projected boundary cached for distance queries
#[derive(Debug, Clone)]
pub struct IndexedZone {
    pub zone: HazardZone,
    projection: LocalProjection,
    projected: Polygon<f64>,
    envelope: Rect<f64>,
}

impl IndexedZone {
    pub(crate) fn new(zone: HazardZone) -> Self {
        let projection = LocalProjection::around(zone.center.y());
        let projected = projection.polygon(&zone.boundary);
        let bounds = zone
            .boundary
            .bounding_rect()
            .unwrap_or_else(|| Rect::new(zone.center.0, zone.center.0));
        let envelope = expand_rect(bounds, zone.effective_buffer());
        Self {
            zone,
            projection,
            projected,
            envelope,
        }
    }

    /// Lon/lat rectangle covering the polygon and its buffer
    pub fn envelope(&self) -> Rect<f64> {
        self.envelope
    }

    /// Distance in meters from a lon/lat line to the polygon, zero if they touch
    pub fn distance_to_line(&self, line: &LineString<f64>) -> Meters {
        line_polygon_distance(&self.projection.line(line), &self.projected)
    }

    /// Whether the line crosses the polygon or its buffer
    pub fn line_within_buffer(&self, line: &LineString<f64>) -> bool {
        self.distance_to_line(line) <= self.zone.effective_buffer()
    }
}

/// Immutable view of the overlay at one version
#[derive(Debug, Default)]
pub struct OverlaySnapshot {
    hazard_version: u64,
    traffic_version: u64,
    zones: Vec<IndexedZone>,
    traffic: Vec<TrafficCondition>,
    zone_index: RTree<ZoneEntry>,
    traffic_index: RTree<TrafficEntry>,
}

impl OverlaySnapshot {
    fn new(
        hazard_version: u64,
        traffic_version: u64,
        zones: Vec<IndexedZone>,
        traffic: Vec<TrafficCondition>,
    ) -> Self {
        let zone_index = RTree::bulk_load(
            zones
                .iter()
                .enumerate()
                .map(|(idx, z)| {
                    let env = z.envelope;
                    ZoneEntry::new(
                        Rectangle::from_corners(
                            [env.min().x, env.min().y],
                            [env.max().x, env.max().y],
                        ),
                        idx,
                    )
                })
                .collect(),
        );
        let traffic_index = RTree::bulk_load(
            traffic
                .iter()
                .enumerate()
                .map(|(idx, t)| TrafficEntry::new([t.location.x(), t.location.y()], idx))
                .collect(),
        );
        Self {
            hazard_version,
            traffic_version,
            zones,
            traffic,
            zone_index,
            traffic_index,
        }
    }

    /// Combined version, strictly increasing with every mutation
    pub fn version(&self) -> u64 {
        self.hazard_version + self.traffic_version
    }

    pub fn hazard_version(&self) -> u64 {
        self.hazard_version
    }

    pub fn traffic_version(&self) -> u64 {
        self.traffic_version
    }

    pub fn zones(&self) -> impl Iterator<Item = &IndexedZone> {
        self.zones.iter()
    }

    pub fn traffic(&self) -> &[TrafficCondition] {
        &self.traffic
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() && self.traffic.is_empty()
    }

    pub fn zone(&self, id: &str) -> Option<&IndexedZone> {
        self.zones.iter().find(|z| z.zone.id == id)
    }

    /// Zones whose buffered envelope intersects the given lon/lat rectangle
    pub fn zones_intersecting(&self, region: Rect<f64>) -> impl Iterator<Item = &IndexedZone> {
        let envelope = AABB::from_corners(
            [region.min().x, region.min().y],
            [region.max().x, region.max().y],
        );
        self.zone_index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| &self.zones[entry.data])
    }

    /// Traffic conditions within `margin` meters of the rectangle's envelope
    pub fn traffic_near(
        &self,
        region: Rect<f64>,
        margin: Meters,
    ) -> impl Iterator<Item = &TrafficCondition> {
        let region = expand_rect(region, margin);
        let envelope = AABB::from_corners(
            [region.min().x, region.min().y],
            [region.max().x, region.max().y],
        );
        self.traffic_index
            .locate_in_envelope(&envelope)
            .map(|entry| &self.traffic[entry.data])
    }

    /// Traffic conditions lying within `proximity` meters of the line
    pub fn traffic_on_line<'a>(
        &'a self,
        line: &'a LineString<f64>,
        bbox: Rect<f64>,
        proximity: Meters,
    ) -> impl Iterator<Item = &'a TrafficCondition> + 'a {
        self.traffic_near(bbox, proximity).filter(move |condition| {
            traffic_distance(condition.location, line) <= proximity
        })
    }
}

fn traffic_distance(location: Point<f64>, line: &LineString<f64>) -> Meters {
    let projection = LocalProjection::around(location.y());
    point_line_distance(&projection.point(location), &projection.line(line))
}

/// Mutable collection of hazard zones and traffic conditions
#[derive(Debug, Default)]
pub struct HazardOverlayStore {
    current: RwLock<Arc<OverlaySnapshot>>,
    writer: Mutex<()>,
    version: AtomicU64,
}

/// Which halves of a snapshot a mutation touched
#[derive(Clone, Copy)]
enum Touched {
    Hazards,
    Traffic,
    Both,
}

impl HazardOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Arc<OverlaySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Combined version without taking any lock
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Adds or replaces a hazard zone, returning the replaced one
    pub fn add_hazard_zone(&self, zone: HazardZone) -> Option<HazardZone> {
        self.mutate(Touched::Hazards, |zones, _| {
            let indexed = IndexedZone::new(zone);
            match zones.iter_mut().find(|z| z.zone.id == indexed.zone.id) {
                Some(existing) => Some(Some(std::mem::replace(existing, indexed).zone)),
                None => {
                    zones.push(indexed);
                    Some(None)
                }
            }
        })
        .flatten()
    }

    /// Removes a hazard zone. The version only changes if the id existed.
    pub fn remove_hazard_zone(&self, id: &str) -> Option<HazardZone> {
        self.mutate(Touched::Hazards, |zones, _| {
            let position = zones.iter().position(|z| z.zone.id == id)?;
            Some(zones.remove(position).zone)
        })
    }

    /// Adds or replaces a traffic condition, returning the replaced one
    pub fn add_traffic_condition(&self, condition: TrafficCondition) -> Option<TrafficCondition> {
        self.mutate(Touched::Traffic, |_, traffic| {
            match traffic.iter_mut().find(|t| t.id == condition.id) {
                Some(existing) => Some(Some(std::mem::replace(existing, condition))),
                None => {
                    traffic.push(condition);
                    Some(None)
                }
            }
        })
        .flatten()
    }

    /// Removes a traffic condition. The version only changes if the id existed.
    pub fn remove_traffic_condition(&self, id: &str) -> Option<TrafficCondition> {
        self.mutate(Touched::Traffic, |_, traffic| {
            let position = traffic.iter().position(|t| t.id == id)?;
            Some(traffic.remove(position))
        })
    }

    /// Drops every zone and condition. Versions keep increasing.
    pub fn clear(&self) {
        self.mutate(Touched::Both, |zones, traffic| {
            zones.clear();
            traffic.clear();
            Some(())
        });
    }

    /// Owned copies of the zones intersecting a lon/lat rectangle
    pub fn zones_intersecting(&self, region: &Rect<f64>) -> Vec<HazardZone> {
        self.snapshot()
            .zones_intersecting(*region)
            .map(|z| z.zone.clone())
            .collect()
    }

    pub fn hazard_zone(&self, id: &str) -> Option<HazardZone> {
        self.snapshot().zone(id).map(|z| z.zone.clone())
    }

    pub fn traffic_condition(&self, id: &str) -> Option<TrafficCondition> {
        self.snapshot().traffic.iter().find(|t| t.id == id).cloned()
    }

    /// Applies `change` to a copy of the current state. When it returns
    /// `Some`, a new snapshot with bumped versions is published.
    fn mutate<T>(
        &self,
        touched: Touched,
        change: impl FnOnce(&mut Vec<IndexedZone>, &mut Vec<TrafficCondition>) -> Option<T>,
    ) -> Option<T> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();

        let mut zones = current.zones.clone();
        let mut traffic = current.traffic.clone();
        let outcome = change(&mut zones, &mut traffic)?;

        let (hazard_version, traffic_version) = match touched {
            Touched::Hazards => (current.hazard_version + 1, current.traffic_version),
            Touched::Traffic => (current.hazard_version, current.traffic_version + 1),
            Touched::Both => (current.hazard_version + 1, current.traffic_version + 1),
        };
        let next = Arc::new(OverlaySnapshot::new(
            hazard_version,
            traffic_version,
            zones,
            traffic,
        ));
        let version = next.version();

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
        self.version.store(version, Ordering::Release);
        debug!("Overlay advanced to version {version}");

        Some(outcome)
    }
}
