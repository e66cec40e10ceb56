use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use serde_json::json;

use crate::{
    Error,
    algo::metrics::RouteMetrics,
    model::{HazardZone, OptimizationResult, OverlaySnapshot, Route, TrafficCondition},
};

impl Route {
    /// Converts the route to a `GeoJSON` `LineString` feature, with its
    /// metrics as properties when given.
    pub fn to_geojson_feature(&self, metrics: Option<&RouteMetrics>) -> Result<Feature, Error> {
        let geometry = Geometry::new(GeoJsonValue::from(&self.geometry));
        let mut properties = json!({
            "feature_type": "route",
            "route_id": self.id,
            "name": self.name,
            "strategy": self.strategy,
            "total_distance": self.total_distance,
            "total_time": self.total_time,
            "max_slope": self.max_slope,
            "segments": self.segments.len(),
            "approximate": self.approximate,
        });
        if let Some(metrics) = metrics {
            properties["overall_score"] = json!(metrics.performance.overall_score);
            properties["safety_score"] = json!(metrics.safety.score);
            properties["traffic_delay"] = json!(metrics.traffic.delay);
            properties["elevation_gain"] = json!(metrics.elevation.gain);
            properties["intersected_hazards"] = json!(metrics.safety.intersected_hazards);
        }

        let value = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        });
        Feature::from_json_value(value).map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}

impl OptimizationResult {
    /// Converts every route of the result to a `GeoJSON` `FeatureCollection`.
    pub fn to_geojson(&self) -> Result<FeatureCollection, Error> {
        let features = self
            .routes
            .iter()
            .enumerate()
            .map(|(idx, route)| {
                let mut feature = route.to_geojson_feature(self.metrics.get(idx))?;
                feature.set_property("best", self.best_route.as_deref() == Some(route.id.as_str()));
                Ok(feature)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(FeatureCollection {
            features,
            bbox: None,
            foreign_members: None,
        })
    }

    pub fn to_geojson_string(&self) -> Result<String, Error> {
        serde_json::to_string(&self.to_geojson()?).map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}

impl HazardZone {
    /// Converts the zone boundary to a `GeoJSON` `Polygon` feature
    pub fn to_geojson_feature(&self) -> Result<Feature, Error> {
        let geometry = Geometry::new(GeoJsonValue::from(&self.boundary));
        let value = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": {
                "feature_type": "hazard",
                "hazard_id": self.id,
                "hazard_type": self.hazard_type,
                "severity": self.severity,
                "radius": self.radius,
                "avoidance": self.avoidance.priority,
                "buffer_distance": self.effective_buffer(),
            }
        });
        Feature::from_json_value(value).map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}

impl TrafficCondition {
    pub fn to_geojson_feature(&self) -> Result<Feature, Error> {
        let geometry = Geometry::new(GeoJsonValue::from(&self.location));
        let value = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": {
                "feature_type": "traffic",
                "traffic_id": self.id,
                "traffic_type": self.traffic_type,
                "severity": self.severity,
                "delay_minutes": self.delay,
                "emergency_access": self.emergency_access,
            }
        });
        Feature::from_json_value(value).map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}

impl OverlaySnapshot {
    /// Hazard polygons and traffic points for map overlays
    pub fn to_geojson(&self) -> Result<FeatureCollection, Error> {
        let mut features = self
            .zones()
            .map(|z| z.zone.to_geojson_feature())
            .collect::<Result<Vec<_>, Error>>()?;
        for condition in self.traffic() {
            features.push(condition.to_geojson_feature()?);
        }
        Ok(FeatureCollection {
            features,
            bbox: None,
            foreign_members: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use geo::Point;
    use petgraph::graph::NodeIndex;

    use super::*;
    use crate::{
        EngineConfig,
        loading::{GridSpec, grid_network},
        model::{
            HazardOverlayStore, HazardType, OptimizationRequest, OptimizationStatus, Severity,
            TrafficType, VehicleConstraints,
        },
        routing::search::PathSearchEngine,
    };

    #[test]
    fn result_exports_one_feature_per_route() {
        let graph = grid_network(&GridSpec::default()).unwrap();
        let overlay = HazardOverlayStore::new().snapshot();
        let config = EngineConfig::default();
        let request = OptimizationRequest::new(
            graph.node(NodeIndex::new(0)).unwrap().geometry,
            graph.node(NodeIndex::new(55)).unwrap().geometry,
        );
        let report = PathSearchEngine::new(&graph, &overlay, &config)
            .generate(&request, Instant::now() + Duration::from_secs(10), "g")
            .unwrap();

        let mut result = OptimizationResult::failure(
            OptimizationStatus::Optimized,
            "",
            VehicleConstraints::default(),
            0,
        );
        result.best_route = Some(report.routes[0].id.clone());
        result.routes = report.routes;

        let collection = result.to_geojson().unwrap();
        assert_eq!(collection.features.len(), result.routes.len());
        let first = &collection.features[0];
        assert_eq!(first.property("best"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(first.property("route_id").and_then(|v| v.as_str()), Some("g-0"));

        let text = result.to_geojson_string().unwrap();
        assert!(text.contains("FeatureCollection"));
        assert!(text.contains("LineString"));
    }

    #[test]
    fn overlay_exports_hazards_and_traffic() {
        let store = HazardOverlayStore::new();
        store.add_hazard_zone(HazardZone::circular(
            "flood",
            HazardType::Flood,
            Point::new(0.0, 0.0),
            80.0,
            Severity::Critical,
        ));
        store.add_traffic_condition(TrafficCondition {
            id: "jam".to_string(),
            location: Point::new(0.001, 0.0),
            traffic_type: TrafficType::Congestion,
            severity: Severity::Low,
            delay: 3.0,
            emergency_access: true,
        });

        let collection = store.snapshot().to_geojson().unwrap();
        assert_eq!(collection.features.len(), 2);
        assert_eq!(
            collection.features[0].property("severity").and_then(|v| v.as_str()),
            Some("critical")
        );
        assert_eq!(
            collection.features[1].property("feature_type").and_then(|v| v.as_str()),
            Some("traffic")
        );
    }
}
