//! HTTP surface: one catch-all handler that reads from the platform named in
//! the request path, plus a health check.

mod error;

use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Uri;
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::backend::Backends;
use crate::config::AppConfig;
use crate::core::{ConnectionDescriptor, DriveError, NormalizedResult, RequestContext, Result};
use crate::platforms;

#[derive(Clone)]
pub struct AppState {
    pub backends: Backends,
    pub request_timeout: Duration,
    pub always_array: bool,
}

impl AppState {
    pub fn new(backends: Backends, request_timeout: Duration) -> Self {
        Self {
            backends,
            request_timeout,
            always_array: false,
        }
    }

    /// Wrap single-document results in a one-element array.
    pub fn with_always_array(mut self, always_array: bool) -> Self {
        self.always_array = always_array;
        self
    }

    pub fn from_config(backends: Backends, config: &AppConfig) -> Self {
        Self::new(backends, config.request_timeout()).with_always_array(config.always_array)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthcheck))
        .fallback(drive)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthcheck() -> &'static str {
    "ok"
}

/// Parse the path, read from the addressed store and answer with its JSON.
///
/// The read runs on its own task that owns the client. Dropping this future
/// (the caller went away) cancels the request token, the read stops at its
/// next backend call and the task still releases the client.
async fn drive(State(state): State<AppState>, uri: Uri) -> Result<Json<NormalizedResult>> {
    let descriptor = ConnectionDescriptor::parse(uri.path())?;
    debug!(platform = %descriptor.platform(), params = ?descriptor.params(), "request parsed");

    let cancel = CancellationToken::new();
    let ctx = RequestContext::new(state.request_timeout, cancel.clone());
    let guard = cancel.drop_guard();

    let backends = state.backends.clone();
    let task = tokio::spawn(async move {
        platforms::fetch_and_release(&descriptor, &backends, &ctx).await
    });

    let joined = task.await;
    guard.disarm();

    let result = joined.map_err(|e| {
        error!(error = %e, "request task failed");
        DriveError::read_failure(format!("request task failed: {e}"))
    })??;

    Ok(Json(if state.always_array {
        result.into_array()
    } else {
        result
    }))
}
