//! HTTP route handlers for the configurator.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                        - Health check
//!
//! # Chat API (stateless, client-held history)
//! POST /api/chat                      - Stream a reply as SSE
//!
//! # Widget (server-held session)
//! GET  /                              - Widget page, creates a session
//! POST /sessions/{id}/messages        - Send a message, stream the reply
//! GET  /sessions/{id}/transcript      - Transcript fragment
//! GET  /sessions/{id}/selection       - Selection fragment
//! POST /sessions/{id}/view            - Switch the image tab, selection fragment
//!
//! # Assets
//! GET  /static/*                      - JS, CSS, logo
//! GET  /houses/*                      - House images
//! ```

pub mod chat;
pub mod widget;

use axum::{Router, routing::get};

use crate::state::AppState;

/// Build the application routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(chat::router())
        .merge(widget::router())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
