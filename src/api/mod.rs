//! HTTP control surface for starting, stopping, and watching crawl runs.

pub mod registry;
pub mod routes;

pub use registry::{RunHandle, RunRegistry, RunView};
pub use routes::router;

use crate::config::ServerConfig;
use crate::crawlers::PageRenderer;
use crate::sink::OutputSink;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// Shared by every handler
pub struct AppState {
    pub config: ServerConfig,
    pub renderer: Arc<dyn PageRenderer>,
    pub sink: Arc<OutputSink>,
    pub registry: RunRegistry,
    /// Spawned runs, awaited on shutdown so every run writes its report
    pub runs: TaskTracker,
}

impl AppState {
    pub fn new(config: ServerConfig, renderer: Arc<dyn PageRenderer>) -> Self {
        let sink = Arc::new(OutputSink::new(
            &config.crawl.output_path,
            config.crawl.lock_wait(),
        ));
        Self {
            config,
            renderer,
            sink,
            registry: RunRegistry::new(),
            runs: TaskTracker::new(),
        }
    }

    /// Stops the active run, if any, and waits for every spawned run to
    /// finish its in-flight pages and write its report.
    pub async fn drain_runs(&self) {
        self.runs.close();
        if let Some(id) = self.registry.stop().await {
            ::log::info!("Waiting for run {} to wind down", id);
        }
        self.runs.wait().await;
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("a crawl is already in progress (run {0})")]
    Conflict(Uuid),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            ::log::error!("Request failed: {}", message);
        }
        (
            self.status(),
            Json(serde_json::json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Binds the configured address and serves until `shutdown` resolves
pub async fn serve(
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = state.config.bind.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    ::log::info!("Control API listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
