// Re-export modules
pub mod api;
pub mod config;
pub mod crawlers;
pub mod error;
pub mod filter;
pub mod parsers;
pub mod records;
pub mod report;
pub mod sink;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{CrawlConfig, SeedMode};
pub use crawlers::{PageRenderer, RunSummary};
pub use records::{CharacterRecord, GameRecord, PageRecord};
pub use report::RunStatus;

use crawlers::{CrawlProgress, Traversal, WebDriverRenderer};
use sink::OutputSink;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main builder for a single crawl run
pub struct Crawl {
    config: CrawlConfig,
    renderer: Option<Arc<dyn PageRenderer>>,
    progress: Option<Arc<CrawlProgress>>,
    cancel: CancellationToken,
}

impl Crawl {
    /// Create a new Crawl builder for the given seeds with default settings
    pub fn new(seeds: SeedMode) -> Self {
        Self::with_config(CrawlConfig::new(seeds))
    }

    /// Create a builder from a complete configuration
    pub fn with_config(config: CrawlConfig) -> Self {
        Self {
            config,
            renderer: None,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Load configuration from a file
    pub fn with_config_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::with_config(CrawlConfig::from_file(path)?))
    }

    /// Load configuration from a string
    pub fn with_config_str(config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::with_config(CrawlConfig::from_json(config_str)?))
    }

    /// Set the minimum gap between requests to the same domain
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.domain_delay_ms = delay_ms;
        self
    }

    /// Set where extracted records are appended
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    /// Set where the end-of-run report is written
    pub fn with_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.report_path = path.into();
        self
    }

    /// Render pages with something other than a WebDriver session pool
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_progress(mut self, progress: Arc<CrawlProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cancelling the token stops the run after in-flight pages finish
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Run the crawl to completion
    pub async fn run(self) -> Result<RunSummary, Box<dyn std::error::Error>> {
        let seeds = self.config.validate()?;

        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(WebDriverRenderer::new(&self.config)),
        };
        let sink = Arc::new(OutputSink::new(
            &self.config.output_path,
            self.config.lock_wait(),
        ));

        let mut traversal = Traversal::new(&self.config, renderer, sink)?.with_cancel(self.cancel);
        if let Some(progress) = self.progress {
            traversal = traversal.with_progress(progress);
        }

        Ok(traversal.run(seeds).await)
    }
}
