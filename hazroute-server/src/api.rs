use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    error_handling::HandleErrorLayer,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use hazroute_core::{
    Error, RoutingEngine,
    model::{HazardZone, OptimizationRequest, OptimizationStatus, TrafficCondition},
};
use serde_json::json;
use tower::{
    BoxError, ServiceBuilder, limit::GlobalConcurrencyLimitLayer, timeout::TimeoutLayer,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::dto::{
    CompareBody, ErrorResponse, HazardBody, OptimizeBody, OptimizeParams, OverlayChange,
    ResponseFormat, TrafficBody, UpdateBody, UpdateDelivery,
};

pub type SharedEngine = Arc<RoutingEngine>;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match e {
            Error::InvalidRequest(_) | Error::NoNodesFound { .. } | Error::InvalidNodeIndex => {
                StatusCode::BAD_REQUEST
            }
            Error::EmptyRouteSet => StatusCode::NOT_FOUND,
            Error::InvalidNetwork(_)
            | Error::IoError(_)
            | Error::GeoJsonError(_)
            | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}", self.message);
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Limits applied to every route
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub request_timeout: Duration,
    pub concurrency: usize,
}

pub fn router(engine: SharedEngine, limits: Limits) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/routes/optimize", post(optimize))
        .route("/routes/compare", post(compare))
        .route("/routes/{id}/updates", post(trigger_update))
        .route("/hazards", post(add_hazard))
        .route("/hazards/{id}", delete(remove_hazard))
        .route("/traffic", post(add_traffic))
        .route("/traffic/{id}", delete(remove_traffic))
        .route("/overlay", get(overlay))
        .route("/reset", post(reset))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(limits.request_timeout))
                .layer(GlobalConcurrencyLimitLayer::new(limits.concurrency)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(engine)
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError {
            status: StatusCode::REQUEST_TIMEOUT,
            message: "request took too long".to_string(),
        }
    } else {
        ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: format!("unhandled middleware error: {err}"),
        }
    }
}

async fn health(State(engine): State<SharedEngine>) -> impl IntoResponse {
    let graph = engine.graph();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "nodes": graph.node_count(),
        "edges": graph.edge_count(),
        "overlay_version": engine.overlay().version(),
        "cache": engine.cache_stats(),
    }))
}

async fn optimize(
    State(engine): State<SharedEngine>,
    Query(params): Query<OptimizeParams>,
    Json(body): Json<OptimizeBody>,
) -> Result<Response, ApiError> {
    let request = OptimizationRequest::from(body);
    let result = tokio::task::spawn_blocking(move || engine.optimize_route(&request))
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("optimization task failed: {e}"),
        })?;

    let status = if result.status == OptimizationStatus::InvalidRequest {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    match params.format {
        ResponseFormat::Json => Ok((status, Json(result)).into_response()),
        ResponseFormat::Geojson => Ok((status, Json(result.to_geojson()?)).into_response()),
    }
}

async fn compare(
    State(engine): State<SharedEngine>,
    Json(body): Json<CompareBody>,
) -> Result<Response, ApiError> {
    let comparison = engine.compare_routes(&body.route_ids)?;
    Ok(Json(comparison).into_response())
}

async fn trigger_update(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<UpdateDelivery>, ApiError> {
    let update = body.into_update(id.clone()).map_err(ApiError::bad_request)?;
    let delivered = engine.trigger_route_update(&update);
    info!(route_id = %id, delivered, "Manual route update triggered");
    Ok(Json(UpdateDelivery {
        route_id: id,
        delivered,
    }))
}

async fn add_hazard(
    State(engine): State<SharedEngine>,
    Json(body): Json<HazardBody>,
) -> Result<(StatusCode, Json<OverlayChange>), ApiError> {
    let zone = HazardZone::try_from(body).map_err(ApiError::bad_request)?;
    let id = zone.id.clone();
    let notified = engine.add_hazard_zone(zone);
    Ok((
        StatusCode::CREATED,
        Json(OverlayChange {
            id,
            overlay_version: engine.overlay().version(),
            notified,
        }),
    ))
}

async fn remove_hazard(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> Result<Json<HazardZone>, ApiError> {
    engine.remove_hazard_zone(&id).map(Json).ok_or_else(|| {
        warn!(hazard_id = %id, "Removal of unknown hazard zone");
        ApiError::not_found(format!("hazard zone {id} does not exist"))
    })
}

async fn add_traffic(
    State(engine): State<SharedEngine>,
    Json(body): Json<TrafficBody>,
) -> Result<(StatusCode, Json<OverlayChange>), ApiError> {
    let condition = TrafficCondition::try_from(body).map_err(ApiError::bad_request)?;
    let id = condition.id.clone();
    let notified = engine.add_traffic_condition(condition);
    Ok((
        StatusCode::CREATED,
        Json(OverlayChange {
            id,
            overlay_version: engine.overlay().version(),
            notified,
        }),
    ))
}

async fn remove_traffic(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> Result<Json<TrafficCondition>, ApiError> {
    engine
        .remove_traffic_condition(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("traffic condition {id} does not exist")))
}

async fn overlay(State(engine): State<SharedEngine>) -> Result<Response, ApiError> {
    let collection = engine.overlay().snapshot().to_geojson()?;
    Ok(Json(collection).into_response())
}

async fn reset(State(engine): State<SharedEngine>) -> StatusCode {
    engine.clear();
    StatusCode::NO_CONTENT
}
