//! HTTP surface of the gateway: a fixed health check plus a catch-all that
//! classifies and forwards every other request.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use uuid::Uuid;

use super::proxy::Upstreams;
use super::router::PathRouter;

pub const HEALTH_BODY: &str = "Strangler Fig Proxy is healthy";

pub struct GatewayState {
    pub router: PathRouter,
    pub upstreams: Upstreams,
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", any(health_check))
        .fallback(forward_request)
        .with_state(state)
}

/// Liveness only; never touches an upstream.
async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, HEALTH_BODY)
}

async fn forward_request(State(state): State<Arc<GatewayState>>, req: Request<Body>) -> Response {
    let method = req.method().clone();
    let decision = state.router.route(req.uri().path());
    // Correlates the routing and failure log lines of one request.
    let request_id = Uuid::new_v4();

    tracing::info!(
        %request_id,
        method = %method,
        path = %decision.path,
        destination = %decision.origin,
        reason = %decision.reason(),
        "Routing request"
    );

    match state.upstreams.forward(decision.origin, req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                %request_id,
                method = %method,
                path = %decision.path,
                destination = %decision.origin,
                "Forwarding failed: {}",
                e
            );
            e.into_response()
        }
    }
}
