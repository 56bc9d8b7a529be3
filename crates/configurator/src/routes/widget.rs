//! Widget routes backed by a server-held chat session.
//!
//! The page and fragments are rendered from the session; sending a message
//! streams the same events as `/api/chat` while applying them to the
//! session.

use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::response::sse::Event;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::Sse,
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use mood_core::ImageView;

use crate::error::AppError;
use crate::presentation::{
    SelectionTemplate, SelectionView, SessionEffect, SessionEvent, SharedSession,
    TranscriptTemplate, TranscriptView, WidgetPageTemplate,
};
use crate::routes::chat::into_sse;
use crate::services::{ChatStreamEvent, start_chat_stream};
use crate::state::AppState;

/// Build the widget router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/sessions/{id}/messages", post(send_message))
        .route("/sessions/{id}/transcript", get(transcript))
        .route("/sessions/{id}/selection", get(selection))
        .route("/sessions/{id}/view", post(select_view))
}

/// Request to send a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Request to switch the image tab.
#[derive(Debug, Deserialize)]
pub struct SelectViewRequest {
    pub view: ImageView,
}

/// Render the widget page for a new session.
///
/// GET /
async fn index(State(state): State<AppState>) -> WidgetPageTemplate {
    let (_, session) = state.sessions().create().await;
    let session = session.lock().await;

    WidgetPageTemplate {
        transcript: TranscriptView::from_session(&session),
        selection: SelectionView::from_session(&session, state.catalog()),
    }
}

/// Send a message and stream the reply.
///
/// POST /sessions/{id}/messages
#[instrument(skip(state, request), fields(session_id = %id))]
async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session = state.sessions().get(id).await?;

    let effects = session
        .lock()
        .await
        .apply(SessionEvent::UserSubmitted { text: request.text })?;
    let history = effects
        .into_iter()
        .find_map(|effect| match effect {
            SessionEffect::StartStream { history } => Some(history),
            SessionEffect::ScheduleReveal { .. } => None,
        })
        .ok_or_else(|| AppError::Internal("submission did not start a stream".to_string()))?;

    let events = match start_chat_stream(
        state.claude().clone(),
        Arc::clone(state.catalog()),
        history,
        state.budget(),
    )
    .await
    {
        Ok(events) => events,
        Err(e) => {
            abort(&session).await;
            return Err(e.into());
        }
    };

    Ok(into_sse(drive_session(session, events)))
}

/// Render the transcript fragment.
///
/// GET /sessions/{id}/transcript
async fn transcript(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<TranscriptTemplate, AppError> {
    let session = state.sessions().get(id).await?;
    let session = session.lock().await;

    Ok(TranscriptTemplate {
        transcript: TranscriptView::from_session(&session),
    })
}

/// Render the selection fragment.
///
/// GET /sessions/{id}/selection
async fn selection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<SelectionTemplate, AppError> {
    let session = state.sessions().get(id).await?;
    let session = session.lock().await;

    Ok(SelectionTemplate {
        selection: SelectionView::from_session(&session, state.catalog()),
    })
}

/// Switch the image tab and render the selection fragment.
///
/// POST /sessions/{id}/view
async fn select_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectViewRequest>,
) -> Result<SelectionTemplate, AppError> {
    let session = state.sessions().get(id).await?;
    let mut session = session.lock().await;
    session.apply(SessionEvent::ImageViewSelected(request.view))?;

    Ok(SelectionTemplate {
        selection: SelectionView::from_session(&session, state.catalog()),
    })
}

// =============================================================================
// Session driving
// =============================================================================

/// Apply each chat event to the session before passing it on.
///
/// The session lock is only held while applying an event. If the stream is
/// dropped before a terminal event, polled or not, the session is returned
/// to idle.
fn drive_session<S>(session: SharedSession, events: S) -> impl Stream<Item = ChatStreamEvent>
where
    S: Stream<Item = ChatStreamEvent> + Send + 'static,
{
    let mut guard = AbortGuard(Some(Arc::clone(&session)));

    stream! {
        let mut events = std::pin::pin!(events);

        while let Some(event) = events.next().await {
            let terminal = matches!(
                event,
                ChatStreamEvent::Finish { .. } | ChatStreamEvent::Error { .. }
            );

            let applied = session.lock().await.apply(SessionEvent::Stream(event.clone()));
            match applied {
                Ok(effects) => run_effects(&session, effects),
                Err(e) => warn!(error = %e, "Stream event rejected by session"),
            }

            if terminal {
                guard.disarm();
            }
            yield event;
        }
    }
}

/// Run effects produced while a stream is in flight.
fn run_effects(session: &SharedSession, effects: Vec<SessionEffect>) {
    for effect in effects {
        match effect {
            SessionEffect::ScheduleReveal { token, after } => {
                let session = Arc::clone(session);
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let revealed = session
                        .lock()
                        .await
                        .apply(SessionEvent::SelectionRevealed { token });
                    if let Err(e) = revealed {
                        warn!(error = %e, token, "Selection reveal rejected");
                    }
                });
            }
            SessionEffect::StartStream { .. } => {
                warn!("Ignoring stream start requested mid-stream");
            }
        }
    }
}

async fn abort(session: &SharedSession) {
    if let Err(e) = session.lock().await.apply(SessionEvent::StreamAborted) {
        warn!(error = %e, "Stream abort rejected by session");
    }
}

/// Sends `StreamAborted` when dropped while armed.
struct AbortGuard(Option<SharedSession>);

impl AbortGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        let Some(session) = self.0.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { abort(&session).await });
        }
    }
}
