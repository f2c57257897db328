//! The events service against a NATS address nothing listens on.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use strangler::events::{build_router, AppState, ConsumeError};
use strangler::{EventsConfig, NatsClient};

async fn offline_client() -> NatsClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let url = format!("nats://{}", addr);
    let config = EventsConfig::from_lookup(|key| match key {
        "NATS_URL" => Some(url.clone()),
        _ => None,
    })
    .expect("config");

    NatsClient::connect(&config).await.expect("client without a broker")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn http_surface_runs_while_broker_is_down() {
    let nats = offline_client().await;
    assert!(!nats.is_connected());

    let app = build_router(AppState {
        publisher: Arc::new(nats.clone()),
    });

    let response = app.clone().oneshot(get("/api/events/health")).await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body, serde_json::json!({"status": true}));

    let response = app.clone().oneshot(get("/api/events/ready")).await.expect("ready");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn publish_and_attach_fail_while_broker_is_down() {
    let nats = offline_client().await;
    let app = build_router(AppState {
        publisher: Arc::new(nats.clone()),
    });

    let publish = app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/api/events/movie")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"movie_id":1,"title":"X","action":"view","user_id":7}"#))
            .expect("request"),
    );

    // Both wait out the JetStream request timeout.
    let (response, attached) = tokio::time::timeout(
        Duration::from_secs(60),
        futures::future::join(publish, nats.subscribe(strangler::events::Topic::Movie)),
    )
    .await
    .expect("broker calls time out on their own");

    assert_eq!(response.expect("response").status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(matches!(attached, Err(ConsumeError::Connect(_))));
}
