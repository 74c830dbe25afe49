use crate::config::CrawlConfig;
use crate::crawlers::progress::{CrawlProgress, ProgressSnapshot};
use crate::crawlers::renderer::PageRenderer;
use crate::crawlers::scheduler::{DomainScheduler, FetchKind, FetchTask};
use crate::crawlers::visited::VisitedSet;
use crate::error::{ConfigError, RenderError};
use crate::filter::CharacterLinkFilter;
use crate::parsers::{self, PageKind};
use crate::records::{CharacterRecord, GameRecord, PageRecord, Rejection};
use crate::report::{RunReporter, RunStatus};
use crate::sink::OutputSink;
use scraper::Html;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use url::Url;

type FetchResult = (FetchTask, Result<String, RenderError>);

/// What a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    /// Unique character pages accepted for fetching
    pub visited: usize,
    pub progress: ProgressSnapshot,
}

/// Two-level crawl: seed game pages, then the character pages they link to.
///
/// Fetches for different domains run concurrently; fetches for one domain are
/// strictly sequential and spaced by the configured delay.
pub struct Traversal {
    renderer: Arc<dyn PageRenderer>,
    sink: Arc<OutputSink>,
    reporter: RunReporter,
    filter: CharacterLinkFilter,
    delay: Duration,
    progress: Arc<CrawlProgress>,
    cancel: CancellationToken,
}

impl Traversal {
    pub fn new(
        config: &CrawlConfig,
        renderer: Arc<dyn PageRenderer>,
        sink: Arc<OutputSink>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            renderer,
            sink,
            reporter: RunReporter::new(&config.report_path),
            filter: CharacterLinkFilter::new(config.link_filter.clone())?,
            delay: config.domain_delay(),
            progress: Arc::new(CrawlProgress::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Share counters with an observer
    pub fn with_progress(mut self, progress: Arc<CrawlProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop accepting new work once `cancel` fires. In-flight fetches still finish.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Crawls every seed to completion and writes the run report
    pub async fn run(self, seeds: Vec<Url>) -> RunSummary {
        ::log::info!("Starting crawl of {} seed page(s)", seeds.len());
        let started = std::time::Instant::now();

        let visited = VisitedSet::new();
        let mut scheduler = DomainScheduler::new(self.delay);
        let mut in_flight: JoinSet<FetchResult> = JoinSet::new();
        let mut in_flight_domains: HashMap<Id, String> = HashMap::new();
        let mut seeds_resolved = 0usize;
        let mut cancelled = false;

        for seed in seeds {
            scheduler.push(FetchTask::root(seed));
            self.progress.record_scheduled();
        }

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                let dropped = scheduler.clear_pending();
                ::log::info!(
                    "Stop requested: dropped {} queued fetches, waiting for {} in flight",
                    dropped,
                    scheduler.in_flight()
                );
            }

            while let Some(task) = scheduler.pop_ready(Instant::now()) {
                let domain = task.domain();
                let renderer = Arc::clone(&self.renderer);
                let handle = in_flight.spawn(async move {
                    let result = renderer.render(&task.url).await;
                    (task, result)
                });
                in_flight_domains.insert(handle.id(), domain);
            }

            if scheduler.is_idle() && in_flight.is_empty() {
                break;
            }

            let wake = scheduler.next_wake();
            tokio::select! {
                joined = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    match joined {
                        Some(Ok((id, (task, result)))) => {
                            in_flight_domains.remove(&id);
                            scheduler.complete(&task.domain(), Instant::now());
                            self.progress.record_completed();
                            if self.handle(task, result, &visited, &mut scheduler).await {
                                seeds_resolved += 1;
                            }
                        }
                        Some(Err(e)) => {
                            ::log::error!("Fetch task failed: {}", e);
                            if let Some(domain) = in_flight_domains.remove(&e.id()) {
                                scheduler.complete(&domain, Instant::now());
                            }
                            self.progress.record_completed();
                            self.progress.record_fetch_failure();
                        }
                        None => {}
                    }
                }
                _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {}
                _ = self.cancel.cancelled(), if !cancelled => {}
            }
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if seeds_resolved == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Finished
        };

        self.renderer.shutdown().await;

        let visited = visited.len().await;
        if let Err(e) = self.reporter.report(status, visited) {
            ::log::error!(
                "Failed to write report to {}: {}",
                self.reporter.path().display(),
                e
            );
        }

        let progress = self.progress.snapshot();
        ::log::info!(
            "Crawl {} in {:.2} seconds: {} games, {} characters saved, {} dropped, {} fetch failures, {} character pages visited",
            status,
            started.elapsed().as_secs_f64(),
            progress.games_saved,
            progress.characters_saved,
            progress.characters_dropped,
            progress.fetch_failures,
            visited
        );

        RunSummary {
            status,
            visited,
            progress,
        }
    }

    /// Processes one finished fetch. Returns true when a seed page was resolved.
    async fn handle(
        &self,
        task: FetchTask,
        result: Result<String, RenderError>,
        visited: &VisitedSet,
        scheduler: &mut DomainScheduler,
    ) -> bool {
        let html = match result {
            Ok(html) => html,
            Err(e) => {
                self.progress.record_fetch_failure();
                match task.kind {
                    FetchKind::Root => ::log::error!("Failed to fetch seed {}: {}", task.url, e),
                    FetchKind::Character { .. } => {
                        ::log::error!("Failed to fetch character page {}: {}", task.url, e)
                    }
                }
                return false;
            }
        };

        match task.kind {
            FetchKind::Root => {
                ::log::info!("Visiting game page: {}", task.url);
                let game = extract_game(&task.url, &html, &self.filter);
                let game_name = game.name.clone();
                let candidates: Vec<Url> = game
                    .character_urls
                    .iter()
                    .filter_map(|u| Url::parse(u).ok())
                    .collect();

                self.emit(PageRecord::Game(game)).await;

                if self.cancel.is_cancelled() {
                    return true;
                }

                let mut queued = 0;
                for url in candidates {
                    if visited.insert_new(url.as_str()).await {
                        ::log::debug!("Queuing character page: {}", url);
                        scheduler.push(FetchTask::character(url, game_name.as_str()));
                        self.progress.record_scheduled();
                        queued += 1;
                    }
                }
                ::log::info!("Queued {} character pages from {}", queued, task.url);
                true
            }
            FetchKind::Character { game } => {
                ::log::info!("Visiting character page: {}", task.url);
                match extract_character(&task.url, &html, game) {
                    Ok(character) => self.emit(PageRecord::Character(character)).await,
                    Err(rejection) => {
                        ::log::warn!("[SKIP] {} - {}", task.url, rejection);
                        self.progress.record_character_dropped();
                    }
                }
                false
            }
        }
    }

    async fn emit(&self, record: PageRecord) {
        match self.sink.append(&record).await {
            Ok(outcome) => {
                if let Some(backup) = &outcome.recovered_from {
                    ::log::warn!(
                        "Previous output was unreadable and was kept at {}",
                        backup.display()
                    );
                }
                match record {
                    PageRecord::Game(_) => self.progress.record_game_saved(),
                    PageRecord::Character(_) => self.progress.record_character_saved(),
                }
            }
            Err(e) => {
                ::log::error!("Failed to store {}: {}", record.url(), e);
                self.progress.record_write_failure();
            }
        }
    }
}

/// Builds the game record for a seed page and collects its character links
fn extract_game(url: &Url, html: &str, filter: &CharacterLinkFilter) -> GameRecord {
    let doc = Html::parse_document(html);
    let fields = parsers::extract_document(&doc, PageKind::Game);

    let character_urls: BTreeSet<String> = parsers::html::links(&doc)
        .iter()
        .filter_map(|href| filter.candidate(href, url))
        .map(|u| u.to_string())
        .collect();

    GameRecord {
        url: url.to_string(),
        name: fields.name,
        image: fields.image,
        description: fields.description,
        attributes: fields.attributes,
        character_urls,
    }
}

fn extract_character(url: &Url, html: &str, game: String) -> Result<CharacterRecord, Rejection> {
    let fields = parsers::extract(html, PageKind::Character);
    CharacterRecord::validated(
        url.to_string(),
        fields.name,
        game,
        fields.image,
        fields.description,
        fields.attributes,
    )
}
