//! MOOD house configurator library.
//!
//! A chat widget that narrows the MOOD catalog with Claude. The model sees
//! the whole catalog and reports matching houses through the
//! `select_houses` tool; the widget then shows those houses.
//!
//! The crate is a library so the router can be exercised by the
//! integration tests; `main.rs` adds Sentry and serves it.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod claude;
pub mod config;
pub mod error;
pub mod filters;
pub mod models;
pub mod presentation;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

pub use config::ConfiguratorConfig;
pub use error::AppError;
pub use state::{AppState, load_catalog};

/// Build the full router: routes, static assets and request tracing.
pub fn build_router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.config().static_dir);
    let house_images = ServeDir::new(&state.config().house_images_dir);

    Router::new()
        .merge(routes::routes())
        .nest_service("/static", static_dir)
        .nest_service("/houses", house_images)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
