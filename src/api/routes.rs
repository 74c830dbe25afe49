use super::{ApiError, AppState, RunView};
use crate::config::SeedMode;
use crate::crawlers::Traversal;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::ErrorKind;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

type SharedState = Arc<AppState>;

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// A single game page to crawl
    #[serde(default)]
    pub url: Option<String>,

    /// Crawl the built-in seed list instead
    #[serde(default)]
    pub preset: bool,
}

pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(|| async { Json(serde_json::json!({ "message": "Crawl API is running" })) }))
        .route("/api/start-scraping", post(start_run))
        .route("/api/stop-scraping", post(stop_run))
        .route("/api/scraping/status", get(latest_status))
        .route("/api/scraping/logs", get(latest_report))
        .route("/api/runs/{id}", get(run_status))
        .route("/api/scraped-data/refresh", get(stored_count))
        .with_state(state)
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                ::log::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn start_run(
    State(state): State<SharedState>,
    Json(request): Json<StartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let seeds = match (request.url, request.preset) {
        (Some(url), false) => SeedMode::Single { url },
        (None, true) => SeedMode::Preset,
        (Some(_), true) => {
            return Err(ApiError::BadRequest(
                "give either a url or preset, not both".to_string(),
            ));
        }
        (None, false) => {
            return Err(ApiError::BadRequest(
                "a url or preset is required".to_string(),
            ));
        }
    };

    let mut config = state.config.crawl.clone();
    config.seeds = seeds;
    let seed_urls = config
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let traversal = Traversal::new(
        &config,
        Arc::clone(&state.renderer),
        Arc::clone(&state.sink),
    )
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let run = state
        .registry
        .begin(seed_urls.iter().map(|u| u.to_string()).collect())
        .await
        .map_err(ApiError::Conflict)?;

    ::log::info!("Starting run {} with {} seed(s)", run.id, seed_urls.len());
    let traversal = traversal
        .with_progress(Arc::clone(&run.progress))
        .with_cancel(run.cancel.clone());

    let handle = Arc::clone(&run);
    state.runs.spawn(async move {
        let summary = traversal.run(seed_urls).await;
        ::log::info!("Run {} ended: {}", handle.id, summary.status);
        handle.finish(&summary).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "message": "Crawl started",
            "run_id": run.id,
        })),
    ))
}

async fn stop_run(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .registry
        .stop()
        .await
        .ok_or_else(|| ApiError::BadRequest("no crawl is running".to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Stop requested",
        "run_id": id,
    })))
}

async fn latest_status(State(state): State<SharedState>) -> Json<RunView> {
    match state.registry.latest().await {
        Some(run) => Json(run.view().await),
        None => Json(RunView::idle()),
    }
}

async fn run_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunView>, ApiError> {
    let run = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("unknown run {}", id)))?;
    Ok(Json(run.view().await))
}

async fn stored_count(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let count = state
        .sink
        .len()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("no data has been collected yet".to_string()))?;

    let last_updated: DateTime<Utc> = tokio::fs::metadata(state.sink.path())
        .await
        .and_then(|m| m.modified())
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(Json(serde_json::json!({
        "success": true,
        "count": count,
        "last_updated": last_updated,
    })))
}

async fn latest_report(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    match tokio::fs::read_to_string(&state.config.crawl.report_path).await {
        Ok(logs) => Ok(Json(serde_json::json!({ "logs": logs }))),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ApiError::NotFound("no run report yet".to_string()))
        }
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::crawlers::PageRenderer;
    use crate::error::RenderError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    const SEED: &str = "https://demo.fandom.com/wiki/Demo_Game";

    struct StaticRenderer {
        latency: Duration,
    }

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render(&self, url: &Url) -> Result<String, RenderError> {
            tokio::time::sleep(self.latency).await;
            if url.as_str() == SEED {
                Ok(r#"<html><body>
                    <a class="fandom-community-header__community-name">Demo Wiki</a>
                    </body></html>"#
                    .to_string())
            } else {
                Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: "not found".to_string(),
                })
            }
        }
    }

    fn state_in(dir: &tempfile::TempDir, latency: Duration) -> SharedState {
        let mut config = ServerConfig::default();
        config.crawl.domain_delay_ms = 0;
        config.crawl.output_path = dir.path().join("data/out.json");
        config.crawl.report_path = dir.path().join("logs/report.md");
        Arc::new(AppState::new(config, Arc::new(StaticRenderer { latency })))
    }

    async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn wait_until_idle(state: &SharedState) {
        for _ in 0..200 {
            let Some(run) = state.registry.latest().await else {
                return;
            };
            if !run.is_running().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run did not finish");
    }

    #[tokio::test]
    async fn test_status_is_idle_before_any_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, Duration::ZERO);

        let (status, body) = send(&state, get_request("/api/scraping/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_running"], false);
        assert_eq!(body["status"], "idle");
        assert_eq!(body["items_scraped"], 0);
    }

    #[tokio::test]
    async fn test_start_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, Duration::ZERO);

        let (status, body) = send(
            &state,
            post_json("/api/start-scraping", serde_json::json!({ "url": SEED })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = body["run_id"].as_str().unwrap().to_string();

        wait_until_idle(&state).await;

        let (status, body) = send(&state, get_request(&format!("/api/runs/{}", run_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "finished");
        assert_eq!(body["progress"], 100);
        assert_eq!(body["items_scraped"], 1);

        let (status, body) = send(&state, get_request("/api/scraped-data/refresh")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, body) = send(&state, get_request("/api/scraping/logs")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["logs"].as_str().unwrap().contains("`finished`"));
    }

    #[tokio::test]
    async fn test_second_start_conflicts_and_stop_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, Duration::from_millis(200));

        let (status, _) = send(
            &state,
            post_json("/api/start-scraping", serde_json::json!({ "url": SEED })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) = send(
            &state,
            post_json("/api/start-scraping", serde_json::json!({ "preset": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (status, _) = send(&state, post_json("/api/stop-scraping", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);

        wait_until_idle(&state).await;
        let (_, body) = send(&state, get_request("/api/scraping/status")).await;
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["is_running"], false);
    }

    #[tokio::test]
    async fn test_drain_waits_for_report_of_stopped_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, Duration::from_millis(500));

        let (status, _) = send(
            &state,
            post_json("/api/start-scraping", serde_json::json!({ "url": SEED })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(!dir.path().join("logs/report.md").exists());

        state.drain_runs().await;

        let report = std::fs::read_to_string(dir.path().join("logs/report.md")).unwrap();
        assert!(report.contains("`cancelled`"));
        let run = state.registry.latest().await.unwrap();
        assert!(!run.is_running().await);
        assert_eq!(run.view().await.status, "cancelled");
    }

    #[tokio::test]
    async fn test_rejected_requests() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, Duration::ZERO);

        let (status, _) = send(&state, post_json("/api/stop-scraping", Value::Null)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, post_json("/api/start-scraping", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            post_json("/api/start-scraping", serde_json::json!({ "url": "not a url" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            get_request(&format!("/api/runs/{}", Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, get_request("/api/scraped-data/refresh")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, get_request("/api/scraping/logs")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, Duration::ZERO);

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/start-scraping")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = router(Arc::clone(&state)).oneshot(request).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }
}
