//! Event ingestion HTTP surface
//!
//! One POST endpoint per event kind. A request is acknowledged with 201 only
//! after the broker has acknowledged the write.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::model::{decode_event, DomainEvent, MovieEvent, PaymentEvent, UserEvent};
use super::publisher::{publish_event, EventPublisher, PublishError};

#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn EventPublisher>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/events/movie", post(ingest::<MovieEvent>))
        .route("/api/events/user", post(ingest::<UserEvent>))
        .route("/api/events/payment", post(ingest::<PaymentEvent>))
        .route("/api/events/health", get(health_check))
        .route("/api/events/ready", get(readiness_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Decode, re-serialize and publish one event
async fn ingest<E>(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError>
where
    E: DomainEvent + Sync + 'static,
{
    let event: E = decode_event(&body).map_err(|e| {
        tracing::debug!("Rejected {} payload: {}", E::TOPIC, e);
        AppError::ValidationError(e.to_string())
    })?;

    let payload = publish_event(state.publisher.as_ref(), &event)
        .await
        .map_err(|e| {
            tracing::error!("Failed to write message to topic {}: {}", E::TOPIC, e);
            AppError::from(e)
        })?;

    tracing::info!(
        "Successfully produced message to topic {}: {}",
        E::TOPIC,
        String::from_utf8_lossy(&payload)
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "status": "success" })),
    ))
}

/// Liveness only; does not look at the broker
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": true }))
}

/// Readiness: the broker connection must be up
async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if state.publisher.is_connected() {
        Ok(Json(serde_json::json!({
            "status": "ready",
            "broker": "connected"
        })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

// Error handling

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    InternalError(String),
}

impl From<PublishError> for AppError {
    fn from(e: PublishError) -> Self {
        AppError::InternalError(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({
            "error": message
        }))).into_response()
    }
}
