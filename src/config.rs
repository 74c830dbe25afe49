use crate::error::ConfigError;
use crate::filter::LinkFilterConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Game wikis crawled when the preset seed mode is selected.
pub const PRESET_SEEDS: &[&str] = &[
    "https://reddead.fandom.com/wiki/Red_Dead_Redemption_2",
    "https://nfs.fandom.com/wiki/Need_for_Speed:_Unbound",
    "https://detroit-become-human.fandom.com/wiki/Detroit:_Become_Human",
    "https://gta.fandom.com/wiki/Grand_Theft_Auto_V",
    "https://zelda.fandom.com/wiki/Legend_of_Zelda_Wiki",
    "https://fallout.fandom.com/wiki/Fallout_Wiki",
    "https://genshinimpact.fandom.com/wiki/Genshin_Impact_Wiki",
    "https://eldenring.fandom.com/wiki/Elden_Ring_Wiki",
    "https://witcher.fandom.com/wiki/The_Witcher_Wiki",
    "https://cyberpunk2077.fandom.com/wiki/Cyberpunk_2077_Wiki",
    "https://residentevil.fandom.com/wiki/Resident_Evil_Wiki",
    "https://hollowknight.fandom.com/wiki/Hollow_Knight_Wiki",
];

/// One hour
const MAX_DOMAIN_DELAY_MS: u64 = 60 * 60 * 1000;
const MAX_WAIT_SECS: u64 = 60 * 60;

/// Where a crawl starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SeedMode {
    /// One game page
    Single { url: String },

    /// A fixed list of game pages
    List { urls: Vec<String> },

    /// The built-in [`PRESET_SEEDS`]
    Preset,
}

impl SeedMode {
    pub fn urls(&self) -> Vec<String> {
        match self {
            SeedMode::Single { url } => vec![url.clone()],
            SeedMode::List { urls } => urls.clone(),
            SeedMode::Preset => PRESET_SEEDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Configuration for one crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Seed pages
    pub seeds: SeedMode,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Maximum number of concurrent browser sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Upper bound for one page navigation and render, in seconds
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// CSS selector whose presence marks a page as rendered
    #[serde(default = "default_ready_selector")]
    pub ready_selector: Option<String>,

    /// Minimum spacing between two requests to the same domain, in milliseconds
    #[serde(default = "default_domain_delay_ms")]
    pub domain_delay_ms: u64,

    /// JSON array the records are appended to
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Text summary written when the run ends
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// How long an append waits for the output lock, in seconds
    #[serde(default = "default_lock_wait_secs")]
    pub lock_wait_secs: u64,

    #[serde(default)]
    pub link_filter: LinkFilterConfig,
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_max_sessions() -> usize {
    4
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_ready_selector() -> Option<String> {
    Some(".mw-parser-output".to_string())
}

fn default_domain_delay_ms() -> u64 {
    1000
}

fn default_output_path() -> PathBuf {
    PathBuf::from("data/fandom_data.json")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("logs/report.md")
}

fn default_lock_wait_secs() -> u64 {
    30
}

impl CrawlConfig {
    /// Create a new configuration with default values
    pub fn new(seeds: SeedMode) -> Self {
        Self {
            seeds,
            webdriver_url: default_webdriver_url(),
            max_sessions: default_max_sessions(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            ready_selector: default_ready_selector(),
            domain_delay_ms: default_domain_delay_ms(),
            output_path: default_output_path(),
            report_path: default_report_path(),
            lock_wait_secs: default_lock_wait_secs(),
            link_filter: LinkFilterConfig::default(),
        }
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Override the WebDriver URL with the `WEBDRIVER_URL` environment variable, if set
    pub fn apply_env(&mut self) {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver_url = webdriver_url;
            }
        }
    }

    /// Checks the timing limits, then parses every seed, rejecting anything
    /// that is not an absolute http(s) URL
    pub fn validate(&self) -> Result<Vec<Url>, ConfigError> {
        check_limit("domain_delay_ms", self.domain_delay_ms, MAX_DOMAIN_DELAY_MS)?;
        check_limit(
            "navigation_timeout_secs",
            self.navigation_timeout_secs,
            MAX_WAIT_SECS,
        )?;
        check_limit("lock_wait_secs", self.lock_wait_secs, MAX_WAIT_SECS)?;

        let seeds = self.seeds.urls();
        if seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }

        seeds
            .into_iter()
            .map(|seed| match Url::parse(&seed) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
                    Ok(url)
                }
                _ => Err(ConfigError::InvalidSeed(seed)),
            })
            .collect()
    }

    pub fn domain_delay(&self) -> Duration {
        Duration::from_millis(self.domain_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }
}

fn check_limit(field: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::OutOfRange { field, value, max });
    }
    Ok(())
}

/// Configuration for the control API server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Origins allowed to call the API from a browser
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Template for runs started through the API; its seeds are replaced per request
    #[serde(default = "default_crawl")]
    pub crawl: CrawlConfig,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_crawl() -> CrawlConfig {
    CrawlConfig::new(SeedMode::Preset)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            crawl: default_crawl(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = CrawlConfig::from_json(
            r#"{"seeds": {"mode": "single", "url": "https://example.fandom.com/wiki/Demo_Game"}}"#,
        )
        .unwrap();

        assert_eq!(config.webdriver_url, "http://localhost:4444");
        assert_eq!(config.domain_delay(), Duration::from_secs(1));
        assert_eq!(config.navigation_timeout(), Duration::from_secs(30));
        assert_eq!(config.output_path, PathBuf::from("data/fandom_data.json"));
        assert_eq!(config.link_filter.path_prefix, "/wiki/");
        assert_eq!(config.validate().unwrap().len(), 1);
    }

    #[test]
    fn test_seed_modes() {
        let list = SeedMode::List {
            urls: vec!["https://a.fandom.com/wiki/A".into(), "https://b.fandom.com/wiki/B".into()],
        };
        assert_eq!(list.urls().len(), 2);
        assert_eq!(SeedMode::Preset.urls().len(), PRESET_SEEDS.len());

        let config = CrawlConfig::from_json(r#"{"seeds": {"mode": "preset"}}"#).unwrap();
        assert_eq!(config.seeds, SeedMode::Preset);
    }

    #[test]
    fn test_validate_rejects_bad_seeds() {
        let config = CrawlConfig::new(SeedMode::Single {
            url: "ftp://example.com/wiki/X".into(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSeed(_))));

        let config = CrawlConfig::new(SeedMode::Single {
            url: "not a url".into(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSeed(_))));

        let config = CrawlConfig::new(SeedMode::List { urls: vec![] });
        assert!(matches!(config.validate(), Err(ConfigError::NoSeeds)));
    }

    #[test]
    fn test_validate_rejects_huge_timings() {
        let mut config = CrawlConfig::new(SeedMode::Preset);
        config.domain_delay_ms = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "domain_delay_ms",
                ..
            })
        ));

        let mut config = CrawlConfig::new(SeedMode::Preset);
        config.lock_wait_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "lock_wait_secs",
                ..
            })
        ));

        let mut config = CrawlConfig::new(SeedMode::Preset);
        config.domain_delay_ms = 60 * 60 * 1000;
        config.navigation_timeout_secs = 60 * 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        assert!(matches!(
            CrawlConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_server_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bind, "127.0.0.1:8000");
        assert_eq!(config.cors_origins.len(), 3);
        assert_eq!(config.crawl.seeds, SeedMode::Preset);
    }
}
