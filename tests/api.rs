//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use script_narrator::api::{ApiServer, ApiState, ProviderFactory};
use script_narrator::{NarrationOrchestrator, ProviderKind, SpeechProvider};
use tower::ServiceExt;

mod common;
use common::{MockProvider, fast_settings};

/// Build a test API router; only Gemini counts as configured
fn build_test_router(factory: ProviderFactory) -> axum::Router {
    let state = ApiState {
        orchestrator: Arc::new(NarrationOrchestrator::new(fast_settings(10))),
        providers: factory,
        configured: vec![ProviderKind::Gemini],
    };
    ApiServer::new(state, 0).router()
}

fn pcm_factory() -> ProviderFactory {
    Arc::new(|_kind, _tier| Ok(Box::new(MockProvider::pcm()) as Box<dyn SpeechProvider>))
}

fn narrate_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/narrate")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router(pcm_factory());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_capabilities_lists_providers() {
    let app = build_test_router(pcm_factory());

    let response = app
        .oneshot(Request::builder().uri("/capabilities").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;

    let providers = json["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 3);
    assert_eq!(providers[0]["kind"], "gemini");
    assert_eq!(providers[0]["configured"], true);
    assert_eq!(providers[0]["external_voices"], false);
    assert_eq!(providers[1]["kind"], "elevenlabs");
    assert_eq!(providers[1]["configured"], false);
    assert_eq!(providers[1]["external_voices"], true);

    assert!(json["voices"].as_array().unwrap().iter().any(|v| v == "Kore"));
    assert_eq!(json["tiers"], serde_json::json!(["flash", "pro"]));
}

#[tokio::test]
async fn test_status_starts_idle() {
    let app = build_test_router(pcm_factory());

    let response = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["state"], "idle");
    assert_eq!(json["status"], "idle");
}

#[tokio::test]
async fn test_narrate_returns_wav_attachment() {
    let app = build_test_router(pcm_factory());

    let response = app
        .oneshot(narrate_request(serde_json::json!({
            "text": "aaaa bbbb cccc",
            "voice": { "kind": "prebuilt", "voice": "Puck" },
            "tier": "pro"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"narration-"));
    assert!(disposition.ends_with(".wav\""));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..4], b"RIFF");
    // Header plus two 4-byte chunks
    assert_eq!(body.len(), 44 + 8);
}

#[tokio::test]
async fn test_narrate_rejects_empty_text() {
    let app = build_test_router(pcm_factory());

    let response = app
        .oneshot(narrate_request(serde_json::json!({ "text": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "empty_script");
}

#[tokio::test]
async fn test_narrate_unconfigured_provider() {
    let app = build_test_router(pcm_factory());

    let response = app
        .oneshot(narrate_request(serde_json::json!({
            "text": "hello",
            "provider": "fish-audio",
            "voice": { "kind": "external", "voice_id": "ref-1" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "not_configured");
}

#[tokio::test]
async fn test_narrate_chunk_failure_reports_index() {
    let factory: ProviderFactory =
        Arc::new(|_kind, _tier| Ok(Box::new(MockProvider::pcm().failing_on(2)) as Box<dyn SpeechProvider>));
    let app = build_test_router(factory);

    let response = app
        .oneshot(narrate_request(serde_json::json!({ "text": "aaaa bbbb cccc dddd" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "chunk_failed");
    assert_eq!(json["error"]["chunk"], 2);
    assert!(json["error"]["message"].as_str().unwrap().contains("quota exceeded"));
}

#[tokio::test]
async fn test_abort_is_accepted_when_idle() {
    let app = build_test_router(pcm_factory());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/abort")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}
