//! Stateless chat API.
//!
//! The client sends its whole history with each turn and receives the reply
//! as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event, KeepAlive};
use axum::{Json, Router, extract::State, response::Sse, routing::post};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::instrument;

use crate::error::AppError;
use crate::models::ConversationMessage;
use crate::services::{ChatStreamEvent, start_chat_stream};
use crate::state::AppState;

/// Final SSE payload after the last event.
pub const DONE_MARKER: &str = "[DONE]";

/// Build the chat router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/chat", post(chat))
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
}

/// Stream the assistant's reply to a client-held history.
///
/// POST /api/chat
#[instrument(skip(state, request), fields(messages = request.messages.len()))]
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let events = start_chat_stream(
        state.claude().clone(),
        Arc::clone(state.catalog()),
        request.messages,
        state.budget(),
    )
    .await?;

    Ok(into_sse(events))
}

/// Map chat events to SSE, one JSON object per `data:` line, then `[DONE]`.
pub fn into_sse<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = ChatStreamEvent> + Send + 'static,
{
    let sse_stream = events
        .map(|event| {
            let json = serde_json::to_string(&event).unwrap_or_else(|_| {
                r#"{"type":"error","error_text":"Failed to serialize event"}"#.to_string()
            });
            Ok(Event::default().data(json))
        })
        .chain(futures::stream::once(async {
            Ok(Event::default().data(DONE_MARKER))
        }));

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
