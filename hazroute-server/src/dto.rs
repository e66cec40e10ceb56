//! Wire types. Coordinates travel as `[lon, lat]` pairs.

use geo::{LineString, Point, Polygon};
use hazroute_core::{
    RouteId,
    model::{
        AvoidancePolicy, HazardType, HazardZone, OptimizationMode, OptimizationRequest,
        PreferenceWeights, Severity, TrafficCondition, TrafficType, VehicleConstraints,
        is_valid_lon_lat,
    },
    updates::{DynamicRouteUpdate, RecommendedAction, UpdateType},
};
use serde::{Deserialize, Serialize};

pub type LonLat = [f64; 2];

fn point(coord: LonLat) -> Point<f64> {
    Point::new(coord[0], coord[1])
}

fn check_lon_lat(name: &str, coord: LonLat) -> Result<Point<f64>, String> {
    let p = point(coord);
    if is_valid_lon_lat(&p) {
        Ok(p)
    } else {
        Err(format!("{name} ({}, {}) is not a valid [lon, lat] pair", coord[0], coord[1]))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Geojson,
}

#[derive(Debug, Default, Deserialize)]
pub struct OptimizeParams {
    #[serde(default)]
    pub format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
pub struct OptimizeBody {
    pub start: LonLat,
    pub destination: LonLat,
    #[serde(default)]
    pub waypoints: Vec<LonLat>,
    #[serde(default)]
    pub constraints: VehicleConstraints,
    #[serde(default)]
    pub mode: OptimizationMode,
    #[serde(default)]
    pub preferences: PreferenceWeights,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl From<OptimizeBody> for OptimizationRequest {
    fn from(body: OptimizeBody) -> Self {
        let mut request = OptimizationRequest::new(point(body.start), point(body.destination))
            .with_waypoints(body.waypoints.into_iter().map(point).collect())
            .with_constraints(body.constraints)
            .with_mode(body.mode)
            .with_preferences(body.preferences);
        request.timeout_ms = body.timeout_ms;
        request
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareBody {
    pub route_ids: Vec<RouteId>,
}

#[derive(Debug, Deserialize)]
pub struct HazardBody {
    pub id: String,
    pub hazard_type: HazardType,
    pub severity: Severity,
    pub center: LonLat,
    /// Used to draw a circle when no boundary is given
    #[serde(default)]
    pub radius: Option<f64>,
    /// Outer ring of the zone
    #[serde(default)]
    pub boundary: Option<Vec<LonLat>>,
    #[serde(default)]
    pub avoidance: AvoidancePolicy,
}

impl TryFrom<HazardBody> for HazardZone {
    type Error = String;

    fn try_from(body: HazardBody) -> Result<Self, Self::Error> {
        if body.id.is_empty() {
            return Err("hazard id must not be empty".to_string());
        }
        let center = check_lon_lat("center", body.center)?;
        let zone = match body.boundary {
            Some(ring) => {
                if ring.len() < 3 {
                    return Err("boundary needs at least three coordinates".to_string());
                }
                let ring = ring
                    .into_iter()
                    .map(|c| check_lon_lat("boundary coordinate", c).map(|p| p.0))
                    .collect::<Result<Vec<_>, _>>()?;
                HazardZone {
                    id: body.id,
                    hazard_type: body.hazard_type,
                    boundary: Polygon::new(LineString::from(ring), Vec::new()),
                    center,
                    radius: body.radius.unwrap_or(0.0),
                    severity: body.severity,
                    avoidance: AvoidancePolicy::default(),
                }
            }
            None => match body.radius {
                Some(radius) if radius.is_finite() && radius > 0.0 => {
                    HazardZone::circular(body.id, body.hazard_type, center, radius, body.severity)
                }
                _ => return Err("either a boundary or a positive radius is required".to_string()),
            },
        };
        Ok(zone.with_avoidance(body.avoidance))
    }
}

#[derive(Debug, Deserialize)]
pub struct TrafficBody {
    pub id: String,
    pub location: LonLat,
    pub traffic_type: TrafficType,
    pub severity: Severity,
    /// Minutes
    #[serde(default)]
    pub delay: f64,
    #[serde(default)]
    pub emergency_access: bool,
}

impl TryFrom<TrafficBody> for TrafficCondition {
    type Error = String;

    fn try_from(body: TrafficBody) -> Result<Self, Self::Error> {
        if body.id.is_empty() {
            return Err("traffic id must not be empty".to_string());
        }
        if !body.delay.is_finite() || body.delay < 0.0 {
            return Err(format!(
                "delay must be a non-negative number of minutes, got {}",
                body.delay
            ));
        }
        Ok(TrafficCondition {
            id: body.id,
            location: check_lon_lat("location", body.location)?,
            traffic_type: body.traffic_type,
            severity: body.severity,
            delay: body.delay,
            emergency_access: body.emergency_access,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    #[serde(default = "manual", rename = "type")]
    pub update_type: UpdateType,
    #[serde(default = "low")]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<LonLat>,
    #[serde(default)]
    pub affected_segments: Vec<usize>,
    #[serde(default)]
    pub recommended_action: Option<RecommendedAction>,
    #[serde(default)]
    pub estimated_delay: f64,
}

fn manual() -> UpdateType {
    UpdateType::Manual
}

fn low() -> Severity {
    Severity::Low
}

impl UpdateBody {
    pub fn into_update(self, route_id: RouteId) -> Result<DynamicRouteUpdate, String> {
        let mut update =
            DynamicRouteUpdate::new(route_id, self.update_type, self.severity, self.description)
                .with_segments(self.affected_segments)
                .with_delay(self.estimated_delay.max(0.0));
        if let Some(location) = self.location {
            update = update.with_location(check_lon_lat("location", location)?);
        }
        if let Some(action) = self.recommended_action {
            update = update.with_action(action);
        }
        Ok(update)
    }
}

#[derive(Debug, Serialize)]
pub struct OverlayChange {
    pub id: String,
    pub overlay_version: u64,
    /// Updates delivered to subscribers of affected routes
    pub notified: usize,
}

#[derive(Debug, Serialize)]
pub struct UpdateDelivery {
    pub route_id: RouteId,
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimize_body_uses_request_defaults() {
        let json = r#"{"start": [0.0, 0.0], "destination": [0.001, 0.002]}"#;
        let body: OptimizeBody = serde_json::from_str(json).unwrap();
        let request = OptimizationRequest::from(body);
        assert_eq!(request.destination, Point::new(0.001, 0.002));
        assert_eq!(request.mode, OptimizationMode::Balanced);
        assert!(request.constraints.avoid_hazards);
        assert!(request.timeout_ms.is_none());
    }

    #[test]
    fn hazard_needs_boundary_or_radius() {
        let body: HazardBody = serde_json::from_str(
            r#"{"id": "f1", "hazard_type": "fire", "severity": "high", "center": [0.0, 0.0]}"#,
        )
        .unwrap();
        assert!(HazardZone::try_from(body).is_err());

        let body: HazardBody = serde_json::from_str(
            r#"{"id": "f1", "hazard_type": "fire", "severity": "high", "center": [0.0, 0.0],
                "radius": 50.0,
                "avoidance": {
                    "enabled": true, "buffer_distance": 10.0, "priority": "must_avoid"
                }}"#,
        )
        .unwrap();
        let zone = HazardZone::try_from(body).unwrap();
        assert!(zone.is_must_avoid());
        assert_eq!(zone.effective_buffer(), 10.0);
    }

    #[test]
    fn polygon_hazard_keeps_ring() {
        let body: HazardBody = serde_json::from_str(
            r#"{"id": "p", "hazard_type": "chemical", "severity": "low", "center": [0.5, 0.5],
                "boundary": [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]}"#,
        )
        .unwrap();
        let zone = HazardZone::try_from(body).unwrap();
        assert_eq!(zone.boundary.exterior().0.len(), 5);
    }

    #[test]
    fn traffic_rejects_bad_coordinates() {
        let body: TrafficBody = serde_json::from_str(
            r#"{"id": "t", "location": [200.0, 0.0],
                "traffic_type": "closure", "severity": "medium"}"#,
        )
        .unwrap();
        assert!(TrafficCondition::try_from(body).is_err());
    }

    #[test]
    fn hazard_center_must_be_lon_lat() {
        let body: HazardBody = serde_json::from_str(
            r#"{"id": "f1", "hazard_type": "fire", "severity": "high",
                "center": [10.0, 95.0], "radius": 50.0}"#,
        )
        .unwrap();
        let err = HazardZone::try_from(body).unwrap_err();
        assert!(err.starts_with("center (10, 95)"), "{err}");
    }

    #[test]
    fn update_body_defaults_to_manual() {
        let body: UpdateBody = serde_json::from_str(r#"{"description": "driver report"}"#).unwrap();
        let update = body.into_update("R1".to_string()).unwrap();
        assert_eq!(update.update_type, UpdateType::Manual);
        assert_eq!(update.severity, Severity::Low);
        assert_eq!(update.recommended_action, RecommendedAction::Monitor);
    }
}
