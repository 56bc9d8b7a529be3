//! Claude API client for streamed chat turns.

use std::sync::Arc;

use async_stream::stream;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::instrument;
use url::Url;

use crate::config::ClaudeConfig;

use super::error::{ApiErrorResponse, ClaudeError};
use super::model::{ChatModel, EventStream, TurnRequest};
use super::types::{ChatRequest, StreamEvent};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Claude API client.
///
/// Streams turns from the Anthropic Messages API with tool use.
#[derive(Clone)]
pub struct ClaudeClient {
    inner: Arc<ClaudeClientInner>,
}

struct ClaudeClientInner {
    client: reqwest::Client,
    model: String,
    api_url: Url,
}

impl std::fmt::Debug for ClaudeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeClient")
            .field("model", &self.inner.model)
            .field("api_url", &self.inner.api_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ClaudeClient {
    /// Create a new Claude client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key contains invalid header characters or
    /// the HTTP client cannot be built.
    pub fn new(config: &ClaudeConfig) -> Result<Self, ClaudeError> {
        let api_key = config.api_key.expose_secret();

        let mut key_header = HeaderValue::from_str(api_key).map_err(|_| {
            ClaudeError::Unauthorized("API key contains invalid header characters".to_string())
        })?;
        key_header.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", key_header);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClaudeClientInner {
                client,
                model: config.model.clone(),
                api_url: config.api_url.clone(),
            }),
        })
    }

    /// The model ID requests are sent with.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Send a chat request and get a streaming response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built, the initial request
    /// fails, or the API answers with an error status.
    #[instrument(skip(self, request), fields(model = %self.inner.model, messages = request.messages.len()))]
    pub async fn chat_stream(&self, request: TurnRequest) -> Result<EventStream, ClaudeError> {
        let body = ChatRequest {
            model: self.inner.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: request.messages,
            system: request.system.to_blocks()?,
            tools: request.tools,
            stream: true,
        };

        let response = self
            .inner
            .client
            .post(self.inner.api_url.clone())
            .json(&body)
            .send()
            .await?;

        // Check for error responses before streaming
        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        // Return a stream that parses SSE events
        Ok(Box::pin(stream! {
            use futures::StreamExt;

            let mut buffer = String::new();
            let mut pending = Vec::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        pending.extend_from_slice(&chunk);
                        let text = match take_utf8(&mut pending) {
                            Ok(t) => t,
                            Err(e) => {
                                yield Err(e);
                                continue;
                            }
                        };

                        buffer.push_str(&text.replace("\r\n", "\n"));

                        // Process complete SSE events
                        while let Some(event) = extract_sse_event(&mut buffer) {
                            if let Some(parsed) = parse_sse_event(&event) {
                                yield parsed;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ClaudeError::Stream(e.to_string()));
                        return;
                    }
                }
            }
        }))
    }
}

impl ChatModel for ClaudeClient {
    async fn stream_turn(&self, request: TurnRequest) -> Result<EventStream, ClaudeError> {
        self.chat_stream(request).await
    }
}

/// Map an error status code to a `ClaudeError`.
async fn handle_error_status(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> ClaudeError {
    // Check for rate limiting
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return ClaudeError::RateLimited(retry_after);
    }

    // Check for unauthorized
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return ClaudeError::Unauthorized("Invalid API key".to_string());
    }

    // Try to parse API error response
    match response.text().await {
        Ok(body) => serde_json::from_str::<ApiErrorResponse>(&body).map_or_else(
            |_| ClaudeError::Api {
                error_type: format!("http_{}", status.as_u16()),
                message: body,
            },
            |api_error| ClaudeError::Api {
                error_type: api_error.error.error_type,
                message: api_error.error.message,
            },
        ),
        Err(e) => ClaudeError::Http(e),
    }
}

/// Take the longest valid UTF-8 prefix out of `pending`.
///
/// A multi-byte character split across chunks stays in `pending` until the
/// next chunk completes it.
fn take_utf8(pending: &mut Vec<u8>) -> Result<String, ClaudeError> {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            pending.clear();
            return Err(ClaudeError::Parse(format!("Invalid UTF-8: {e}")));
        }
    };
    let rest = pending.split_off(valid);
    let head = std::mem::replace(pending, rest);
    String::from_utf8(head).map_err(|e| ClaudeError::Parse(format!("Invalid UTF-8: {e}")))
}

/// Extract a complete SSE event from the buffer.
///
/// Returns `Some(event)` if a complete event was found (and removes it from buffer),
/// or `None` if no complete event is available yet.
fn extract_sse_event(buffer: &mut String) -> Option<String> {
    // SSE events are separated by double newlines
    let idx = buffer.find("\n\n")?;
    let rest = buffer.split_off(idx);
    let event = std::mem::replace(buffer, rest.trim_start_matches('\n').to_string());
    Some(event)
}

/// Parse an SSE event string into a `StreamEvent`.
fn parse_sse_event(event: &str) -> Option<Result<StreamEvent, ClaudeError>> {
    // Skip empty events
    if event.trim().is_empty() {
        return None;
    }

    // Parse SSE format: "event: <type>\ndata: <json>"
    let data = event
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)?;

    if data == "[DONE]" {
        return None;
    }

    Some(
        serde_json::from_str::<StreamEvent>(data)
            .map_err(|e| ClaudeError::Parse(format!("Failed to parse stream event: {e}"))),
    )
}
