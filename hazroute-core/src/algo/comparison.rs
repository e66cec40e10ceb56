use std::cmp::Ordering;

use geo::BoundingRect;
use serde::{Deserialize, Serialize};

use super::metrics::RouteMetrics;
use crate::{
    Error, RouteId,
    model::{OverlaySnapshot, Route},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecommendations {
    /// Fastest route that crosses no hazard polygon
    pub emergency: Option<RouteId>,
    pub standard: RouteId,
    /// Lowest scoring route, when it is not also the best one
    pub scenic: Option<RouteId>,
    /// Routes touching a must-avoid zone or its buffer
    pub avoid: Vec<RouteId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteComparison {
    /// Compared routes in request order
    pub route_ids: Vec<RouteId>,
    pub best_distance: RouteId,
    pub best_time: RouteId,
    pub best_safety: RouteId,
    pub best_accessibility: RouteId,
    pub overall_best: RouteId,
    pub recommendations: ComparisonRecommendations,
}

/// Ranks issued routes against each other under the current overlay.
/// Ties go to the route listed first.
pub struct RouteComparator<'a> {
    overlay: &'a OverlaySnapshot,
}

impl<'a> RouteComparator<'a> {
    pub fn new(overlay: &'a OverlaySnapshot) -> Self {
        Self { overlay }
    }

    /// # Errors
    ///
    /// Returns [`Error::EmptyRouteSet`] when there is nothing to compare
    pub fn compare(&self, routes: &[(&Route, &RouteMetrics)]) -> Result<RouteComparison, Error> {
        let id_of = |idx: usize| routes[idx].0.id.clone();

        let best_distance = first_min_by(routes, |a, b| a.1.distance.total_cmp(&b.1.distance))
            .ok_or(Error::EmptyRouteSet)?;
        let best_time =
            first_min_by(routes, |a, b| a.1.time.total_cmp(&b.1.time)).ok_or(Error::EmptyRouteSet)?;
        let best_safety = first_min_by(routes, |a, b| {
            b.1.performance.safety_score.total_cmp(&a.1.performance.safety_score)
        })
        .ok_or(Error::EmptyRouteSet)?;
        let best_accessibility = first_min_by(routes, |a, b| {
            b.1.performance
                .accessibility_score
                .total_cmp(&a.1.performance.accessibility_score)
        })
        .ok_or(Error::EmptyRouteSet)?;
        let overall_best = first_min_by(routes, |a, b| {
            b.1.performance.overall_score.total_cmp(&a.1.performance.overall_score)
        })
        .ok_or(Error::EmptyRouteSet)?;
        let lowest = first_min_by(routes, |a, b| {
            a.1.performance.overall_score.total_cmp(&b.1.performance.overall_score)
        })
        .ok_or(Error::EmptyRouteSet)?;

        let hazard_free: Vec<_> = routes
            .iter()
            .filter(|(route, _)| !self.crosses_hazard(route))
            .copied()
            .collect();
        let emergency = first_min_by(&hazard_free, |a, b| a.1.time.total_cmp(&b.1.time))
            .map(|idx| hazard_free[idx].0.id.clone());

        let avoid = routes
            .iter()
            .filter(|(route, _)| self.touches_must_avoid(route))
            .map(|(route, _)| route.id.clone())
            .collect();

        Ok(RouteComparison {
            route_ids: routes.iter().map(|(route, _)| route.id.clone()).collect(),
            best_distance: id_of(best_distance),
            best_time: id_of(best_time),
            best_safety: id_of(best_safety),
            best_accessibility: id_of(best_accessibility),
            overall_best: id_of(overall_best),
            recommendations: ComparisonRecommendations {
                emergency,
                standard: id_of(overall_best),
                scenic: (lowest != overall_best).then(|| id_of(lowest)),
                avoid,
            },
        })
    }

    fn crosses_hazard(&self, route: &Route) -> bool {
        let Some(bbox) = route.geometry.bounding_rect() else {
            return false;
        };
        self.overlay
            .zones_intersecting(bbox)
            .any(|z| z.zone.avoidance.enabled && z.distance_to_line(&route.geometry) <= 0.0)
    }

    fn touches_must_avoid(&self, route: &Route) -> bool {
        let Some(bbox) = route.geometry.bounding_rect() else {
            return false;
        };
        self.overlay
            .zones_intersecting(bbox)
            .any(|z| z.zone.is_must_avoid() && z.line_within_buffer(&route.geometry))
    }
}

/// Index of the first element that no later element beats
fn first_min_by<T>(items: &[T], mut compare: impl FnMut(&T, &T) -> Ordering) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, item) in items.iter().enumerate() {
        match best {
            Some(current) if compare(item, &items[current]) != Ordering::Less => {}
            _ => best = Some(idx),
        }
    }
    best
}
