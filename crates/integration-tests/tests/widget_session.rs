//! Integration tests for the server-held widget session.
//!
//! These tests open a session through `GET /`, send messages, and read the
//! transcript and selection fragments back.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use mood_integration_tests::{
    MESSAGES_PATH, TestApp, chat_events, event_types, sse_body, text_reply, tool_reply,
};

/// Long enough for a scheduled reveal to land.
const REVEAL_WAIT: Duration = Duration::from_millis(150);

fn card_ids(html: &str) -> Vec<&str> {
    html.split("data-house-id=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .collect()
}

// =============================================================================
// Page
// =============================================================================

#[tokio::test]
async fn test_page_opens_session_with_welcome() {
    let app = TestApp::new().await;

    let (status, html) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Bienvenido a MOOD"));
    assert!(html.contains("Escribe tu mensaje..."));
    assert!(!html.contains("has-selection"));

    let id = app.open_session().await;
    assert!(Uuid::parse_str(&id).is_ok());

    let (status, transcript) = app.get(&format!("/sessions/{id}/transcript")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(transcript.contains("Bienvenido a MOOD"));
}

#[tokio::test]
async fn test_each_page_load_is_a_new_session() {
    let app = TestApp::new().await;
    let first = app.open_session().await;
    let second = app.open_session().await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Messages
// =============================================================================

#[tokio::test]
async fn test_message_with_selection_reveals_houses() {
    let app = TestApp::new().await;
    app.mount_tool_flow(
        tool_reply("toolu_01", &["xsa", "sa"]),
        text_reply("Te muestro dos casas articuladas."),
    )
    .await;
    let id = app.open_session().await;

    let (status, body) = app
        .post_json(
            &format!("/sessions/{id}/messages"),
            &json!({"text": "Necesito 2 habitaciones"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let events = chat_events(&body);
    assert_eq!(event_types(&events).last(), Some(&"finish"));

    tokio::time::sleep(REVEAL_WAIT).await;

    let (_, transcript) = app.get(&format!("/sessions/{id}/transcript")).await;
    assert!(transcript.contains("Necesito 2 habitaciones"));
    assert!(transcript.contains("Te muestro dos casas articuladas."));
    assert!(!transcript.contains("typing-indicator"));

    let (status, selection) = app.get(&format!("/sessions/{id}/selection")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(selection.contains("data-visible=\"true\""));
    assert!(selection.contains("data-loading=\"false\""));
    assert_eq!(card_ids(&selection), vec!["xsa", "sa"]);
    assert!(selection.contains("76 m2"));
    assert!(selection.contains("/houses/snippets/XS_A/XS_A_fachada.jpg"));
}

#[tokio::test]
async fn test_rejected_selection_leaves_panel_hidden() {
    let app = TestApp::new().await;
    app.mount_tool_flow(
        tool_reply("toolu_01", &["xsa", "not-a-real-id"]),
        text_reply("No encontré una de esas casas."),
    )
    .await;
    let id = app.open_session().await;

    let (status, _) = app
        .post_json(
            &format!("/sessions/{id}/messages"),
            &json!({"text": "Muéstrame xsa"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(REVEAL_WAIT).await;

    let (_, selection) = app.get(&format!("/sessions/{id}/selection")).await;
    assert!(selection.contains("data-visible=\"false\""));
    assert!(card_ids(&selection).is_empty());
}

#[tokio::test]
async fn test_selection_view_switches_images() {
    let app = TestApp::new().await;
    app.mount_tool_flow(tool_reply("toolu_01", &["xsa"]), text_reply("Listo."))
        .await;
    let id = app.open_session().await;

    app.post_json(
        &format!("/sessions/{id}/messages"),
        &json!({"text": "Una casa pequeña"}),
    )
    .await;
    tokio::time::sleep(REVEAL_WAIT).await;

    // Reading the fragment never changes the tab
    let (_, before) = app
        .get(&format!("/sessions/{id}/selection?view=layout"))
        .await;
    assert!(before.contains("XS_A_fachada.jpg"));
    assert!(!before.contains("XS_A_layout.jpg"));

    let (status, selection) = app
        .post_json(&format!("/sessions/{id}/view"), &json!({"view": "layout"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(selection.contains("class=\"view-tab is-active\" data-view=\"layout\""));
    assert!(selection.contains("/houses/snippets/XS_A/XS_A_layout.jpg"));

    // The choice sticks for later renders
    let (_, again) = app.get(&format!("/sessions/{id}/selection")).await;
    assert!(again.contains("XS_A_layout.jpg"));

    let (status, _) = app
        .post_json(&format!("/sessions/{id}/view"), &json!({"view": "aerial"}))
        .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let app = TestApp::new().await;
    let id = app.open_session().await;

    let (status, _) = app
        .post_json(&format!("/sessions/{id}/messages"), &json!({"text": "   "}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.provider_requests().await.is_empty());
}

#[tokio::test]
async fn test_message_while_streaming_is_busy() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(text_reply("Hola"), "text/event-stream")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&app.provider)
        .await;
    let id = app.open_session().await;
    let uri = format!("/sessions/{id}/messages");

    let router = app.router.clone();
    let first = tokio::spawn({
        let uri = uri.clone();
        async move {
            use tower::ServiceExt;
            router
                .oneshot(
                    axum::http::Request::post(uri)
                        .header("content-type", "application/json")
                        .body(axum::body::Body::from(r#"{"text":"Hola"}"#))
                        .expect("request"),
                )
                .await
                .expect("response")
                .status()
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, _) = app.post_json(&uri, &json!({"text": "¿Sigues ahí?"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(first.await.expect("first request"), StatusCode::OK);
}

#[tokio::test]
async fn test_provider_error_mid_stream_is_shown() {
    let app = TestApp::new().await;
    app.mount_reply(sse_body(&[
        json!({"type": "message_start", "message": {"id": "msg_err", "model": "claude-sonnet-4-20250514", "usage": {"input_tokens": 10, "output_tokens": 1}}}),
        json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
    ]))
    .await;
    let id = app.open_session().await;

    let (status, body) = app
        .post_json(&format!("/sessions/{id}/messages"), &json!({"text": "Hola"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event_types(&chat_events(&body)).last(), Some(&"error"));

    let (_, transcript) = app.get(&format!("/sessions/{id}/transcript")).await;
    assert!(transcript.contains("No pudimos completar la respuesta"));
    assert!(!transcript.contains("typing-indicator"));
}

#[tokio::test]
async fn test_session_recovers_after_provider_failure() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&app.provider)
        .await;
    app.mount_reply(text_reply("Ahora sí.")).await;
    let id = app.open_session().await;
    let uri = format!("/sessions/{id}/messages");

    let (status, _) = app.post_json(&uri, &json!({"text": "Hola"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = app.post_json(&uri, &json!({"text": "Hola otra vez"})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, transcript) = app.get(&format!("/sessions/{id}/transcript")).await;
    assert!(transcript.contains("Ahora sí."));
}

// =============================================================================
// Unknown Sessions
// =============================================================================

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = TestApp::new().await;
    let id = Uuid::new_v4();

    let (status, _) = app.get(&format!("/sessions/{id}/transcript")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get(&format!("/sessions/{id}/selection")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post_json(&format!("/sessions/{id}/messages"), &json!({"text": "Hola"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_session_id_is_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/sessions/not-a-uuid/transcript").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
