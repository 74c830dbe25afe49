use crate::crawlers::{CrawlProgress, ProgressSnapshot, RunSummary};
use crate::report::RunStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One crawl started through the API
#[derive(Debug)]
pub struct RunHandle {
    pub id: Uuid,
    pub seeds: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub progress: Arc<CrawlProgress>,
    pub cancel: CancellationToken,
    outcome: Mutex<Option<RunOutcome>>,
}

#[derive(Debug, Clone)]
struct RunOutcome {
    status: RunStatus,
    visited: usize,
    finished_at: DateTime<Utc>,
}

/// Status document served by the API. Also describes the idle state before
/// any run has been started.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub run_id: Option<Uuid>,
    pub is_running: bool,
    /// Completion estimate, 0 to 100
    pub progress: u8,
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub items_scraped: usize,
    pub visited: Option<usize>,
    pub seeds: Vec<String>,
    pub totals: ProgressSnapshot,
}

impl RunView {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            is_running: false,
            progress: 0,
            status: "idle".to_string(),
            start_time: None,
            end_time: None,
            items_scraped: 0,
            visited: None,
            seeds: Vec::new(),
            totals: ProgressSnapshot::default(),
        }
    }
}

impl RunHandle {
    fn new(seeds: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            seeds,
            started_at: Utc::now(),
            progress: Arc::new(CrawlProgress::new()),
            cancel: CancellationToken::new(),
            outcome: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.outcome.lock().await.is_none()
    }

    /// Records the terminal state of the run
    pub async fn finish(&self, summary: &RunSummary) {
        *self.outcome.lock().await = Some(RunOutcome {
            status: summary.status,
            visited: summary.visited,
            finished_at: Utc::now(),
        });
    }

    pub async fn view(&self) -> RunView {
        let outcome = self.outcome.lock().await.clone();
        let totals = self.progress.snapshot();
        let status = match &outcome {
            Some(outcome) => outcome.status.to_string(),
            None if self.cancel.is_cancelled() => "stopping".to_string(),
            None => "running".to_string(),
        };

        RunView {
            run_id: Some(self.id),
            is_running: outcome.is_none(),
            progress: totals.percent(outcome.is_some()),
            status,
            start_time: Some(self.started_at),
            end_time: outcome.as_ref().map(|o| o.finished_at),
            items_scraped: totals.items_saved(),
            visited: outcome.as_ref().map(|o| o.visited),
            seeds: self.seeds.clone(),
            totals,
        }
    }
}

/// Runs kept for status lookups, including the active one
const RUN_HISTORY: usize = 32;

#[derive(Debug, Default)]
struct Runs {
    by_id: HashMap<Uuid, Arc<RunHandle>>,
    /// Oldest first
    order: VecDeque<Uuid>,
    latest: Option<Uuid>,
}

/// Tracks API-started runs. At most one run is active at a time, and only the
/// most recent runs are remembered.
#[derive(Debug)]
pub struct RunRegistry {
    runs: Mutex<Runs>,
    history: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_history(RUN_HISTORY)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers at most `history` runs (at least one)
    pub fn with_history(history: usize) -> Self {
        Self {
            runs: Mutex::new(Runs::default()),
            history: history.max(1),
        }
    }

    /// Registers a new run, or returns the id of the run still in progress
    pub async fn begin(&self, seeds: Vec<String>) -> Result<Arc<RunHandle>, Uuid> {
        let mut runs = self.runs.lock().await;
        if let Some(latest) = runs.latest.and_then(|id| runs.by_id.get(&id)) {
            if latest.is_running().await {
                return Err(latest.id);
            }
        }

        let handle = Arc::new(RunHandle::new(seeds));
        runs.by_id.insert(handle.id, Arc::clone(&handle));
        runs.order.push_back(handle.id);
        runs.latest = Some(handle.id);

        // Only the newest run can be active, so everything evicted has finished
        while runs.order.len() > self.history {
            if let Some(oldest) = runs.order.pop_front() {
                runs.by_id.remove(&oldest);
            }
        }
        Ok(handle)
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<RunHandle>> {
        self.runs.lock().await.by_id.get(id).cloned()
    }

    pub async fn latest(&self) -> Option<Arc<RunHandle>> {
        let runs = self.runs.lock().await;
        runs.latest.and_then(|id| runs.by_id.get(&id).cloned())
    }

    /// Requests cancellation of the active run. Returns its id, or `None` when
    /// nothing is running.
    pub async fn stop(&self) -> Option<Uuid> {
        let latest = self.latest().await?;
        if !latest.is_running().await || latest.cancel.is_cancelled() {
            return None;
        }
        latest.cancel.cancel();
        ::log::info!("Stop requested for run {}", latest.id);
        Some(latest.id)
    }
}
