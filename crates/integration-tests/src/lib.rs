//! Integration tests for the MOOD configurator.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mood-integration-tests
//! ```
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; the
//! Anthropic API is replaced by a `wiremock` server returning scripted SSE
//! bodies. No network access or API key is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc)]

use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mood_configurator::config::ClaudeConfig;
use mood_configurator::services::StreamBudget;
use mood_configurator::{AppState, ConfiguratorConfig, build_router};
use mood_core::Catalog;

/// Path the mocked Messages API listens on.
pub const MESSAGES_PATH: &str = "/v1/messages";

/// Reveal delay used by test sessions.
pub const TEST_REVEAL_DELAY: Duration = Duration::from_millis(20);

/// A router wired to a mocked model provider.
pub struct TestApp {
    pub router: Router,
    pub provider: MockServer,
    pub state: AppState,
}

impl TestApp {
    /// Start a provider mock and build the app with the default budget.
    pub async fn new() -> Self {
        Self::with_budget(StreamBudget::default()).await
    }

    /// Start a provider mock and build the app with `budget`.
    pub async fn with_budget(budget: StreamBudget) -> Self {
        let provider = MockServer::start().await;
        let config = test_config(&provider.uri());
        let catalog = Catalog::builtin().expect("builtin catalog");
        let state = AppState::with_budget(config, catalog, budget).expect("app state");

        Self {
            router: build_router(state.clone()),
            provider,
            state,
        }
    }

    /// Send a request through the router and collect the body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(
            Request::get(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, String) {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }

    /// Bodies of every request the provider received, as JSON.
    pub async fn provider_requests(&self) -> Vec<Value> {
        self.provider
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).expect("provider request is JSON"))
            .collect()
    }

    /// Answer every turn with `body`.
    pub async fn mount_reply(&self, body: String) {
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .respond_with(sse_response(body))
            .mount(&self.provider)
            .await;
    }

    /// Answer the first turn with `first` and any turn carrying a tool
    /// result with `after_tool`.
    pub async fn mount_tool_flow(&self, first: String, after_tool: String) {
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_string_contains("tool_result"))
            .respond_with(sse_response(after_tool))
            .with_priority(1)
            .mount(&self.provider)
            .await;
        self.mount_reply(first).await;
    }

    /// Open the widget page and return the new session id.
    pub async fn open_session(&self) -> String {
        let (status, html) = self.get("/").await;
        assert_eq!(status, StatusCode::OK);
        session_id_from_page(&html)
    }
}

/// Configuration pointing the Claude client at `provider_uri`.
pub fn test_config(provider_uri: &str) -> ConfiguratorConfig {
    let api_url =
        Url::parse(&format!("{provider_uri}{MESSAGES_PATH}")).expect("mock provider URL");

    ConfiguratorConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        claude: ClaudeConfig {
            api_key: SecretString::from("sk-ant-REDACTED"),
            model: "claude-sonnet-4-20250514".to_string(),
            api_url,
        },
        catalog_path: None,
        static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../configurator/static")),
        house_images_dir: PathBuf::from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../configurator/static/houses"
        )),
        reveal_delay: TEST_REVEAL_DELAY,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Encode provider events as an Anthropic SSE body.
pub fn sse_body(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| {
            let kind = event["type"].as_str().unwrap_or("message");
            format!("event: {kind}\ndata: {event}\n\n")
        })
        .collect()
}

/// A provider turn that answers with plain text.
pub fn text_reply(text: &str) -> String {
    sse_body(&[
        json!({"type": "message_start", "message": {"id": "msg_text", "model": "claude-sonnet-4-20250514", "usage": {"input_tokens": 900, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "ping"}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 12}}),
        json!({"type": "message_stop"}),
    ])
}

/// A provider turn that calls `select_houses` with `house_ids`.
///
/// The input JSON is split across two deltas, as the API does.
pub fn tool_reply(tool_use_id: &str, house_ids: &[&str]) -> String {
    let input = json!({ "house_ids": house_ids }).to_string();
    let (head, tail) = input.split_at(input.len() / 2);

    sse_body(&[
        json!({"type": "message_start", "message": {"id": "msg_tool", "model": "claude-sonnet-4-20250514", "usage": {"input_tokens": 900, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Déjame buscar opciones. "}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": tool_use_id, "name": "select_houses", "input": {}}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": head}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": tail}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 40}}),
        json!({"type": "message_stop"}),
    ])
}

/// A history holding the welcome message and one user message.
pub fn history_with(text: &str) -> Value {
    json!({
        "messages": [
            {"id": "welcome", "role": "assistant", "parts": [{"type": "text", "text": "# Bienvenido a MOOD"}]},
            {"role": "user", "parts": [{"type": "text", "text": text}]}
        ]
    })
}

/// Split an SSE response into its `data:` payloads.
pub fn sse_data(body: &str) -> Vec<String> {
    body.replace("\r\n", "\n")
        .split("\n\n")
        .filter_map(|frame| {
            frame
                .lines()
                .find_map(|line| line.strip_prefix("data:"))
                .map(|data| data.trim_start().to_string())
        })
        .collect()
}

/// Parse the chat events of an SSE response, checking the `[DONE]` marker.
pub fn chat_events(body: &str) -> Vec<Value> {
    let mut data = sse_data(body);
    assert_eq!(data.pop().as_deref(), Some("[DONE]"), "stream must end with [DONE]");
    data.iter()
        .map(|d| serde_json::from_str(d).expect("event is JSON"))
        .collect()
}

/// Event types in order.
pub fn event_types(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .map(|e| e["type"].as_str().unwrap_or_default())
        .collect()
}

fn session_id_from_page(html: &str) -> String {
    let marker = "data-session-id=\"";
    let start = html.find(marker).expect("session id attribute") + marker.len();
    let len = html
        .get(start..)
        .and_then(|rest| rest.find('"'))
        .expect("closing quote");
    html.get(start..start + len)
        .expect("session id")
        .to_string()
}
