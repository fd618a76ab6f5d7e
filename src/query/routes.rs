//! HTTP handlers and the mapping from service errors to responses.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use banksia::analytics::ProximityRequest;
use banksia::batch::{BatchRequest, BatchResult};
use banksia::boundary::BoundaryRequest;
use banksia::geocoding::{GeocodeRequest, GeocodeResult, ReverseGeocodeResult, ReverseRequest};
use banksia::models::{BoundaryResult, ProximityResult, StatisticalClassification};
use banksia::monitoring::{Alert, HealthReport, HealthStatus};
use banksia::statistical::StatisticalRequest;
use banksia::{ErrorKind, SpatialError, SpatialServices};

pub type AppState = Arc<SpatialServices>;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
}

/// Service error carried to the client as a JSON body.
pub struct ApiError(SpatialError);

impl From<SpatialError> for ApiError {
    fn from(err: SpatialError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput
        | ErrorKind::InvalidCoordinates
        | ErrorKind::GeocodingFailed
        | ErrorKind::UnsupportedOperation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DependencyFailure => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected ({}): {}", kind, self.0);
        }
        let body = ErrorBody {
            error: kind,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: HealthStatus,
    timestamp: DateTime<Utc>,
    version: &'static str,
    active_batches: usize,
}

pub async fn health(State(services): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = services.health_report();
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (
        status,
        Json(HealthResponse {
            status: report.status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            active_batches: services.active_batches(),
        }),
    )
}

pub async fn metrics(State(services): State<AppState>) -> Json<HealthReport> {
    Json(services.health_report())
}

pub async fn geocode(
    State(services): State<AppState>,
    Query(request): Query<GeocodeRequest>,
) -> ApiResult<GeocodeResult> {
    Ok(Json(services.geocode(&request).await?))
}

pub async fn reverse(
    State(services): State<AppState>,
    Query(request): Query<ReverseRequest>,
) -> ApiResult<ReverseGeocodeResult> {
    Ok(Json(services.reverse_geocode(&request).await?))
}

pub async fn proximity(
    State(services): State<AppState>,
    Json(request): Json<ProximityRequest>,
) -> ApiResult<ProximityResult> {
    Ok(Json(services.proximity(&request).await?))
}

pub async fn boundary(
    State(services): State<AppState>,
    Json(request): Json<BoundaryRequest>,
) -> ApiResult<BoundaryResult> {
    Ok(Json(services.boundary(&request).await?))
}

pub async fn statistical(
    State(services): State<AppState>,
    Json(request): Json<StatisticalRequest>,
) -> ApiResult<StatisticalClassification> {
    Ok(Json(services.statistical(&request).await?))
}

pub async fn batch(
    State(services): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<BatchResult> {
    Ok(Json(services.batch(&request).await?))
}

pub async fn resolve_alert(
    State(services): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Alert> {
    Ok(Json(services.resolve_alert(&id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidCoordinates), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::GeocodingFailed), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorKind::DependencyFailure),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody {
            error: ErrorKind::NotFound,
            message: "alert not found: abc".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "NOT_FOUND");
        assert_eq!(json["message"], "alert not found: abc");
    }
}
