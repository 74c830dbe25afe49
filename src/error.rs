use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain a rendered snapshot of a page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to connect to WebDriver at {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out after {secs}s rendering {url}")]
    Timeout { url: String, secs: u64 },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on output store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("timed out waiting for lock {0}")]
    LockTimeout(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid seed URL '{0}'")]
    InvalidSeed(String),

    #[error("no seed URLs configured")]
    NoSeeds,

    #[error("{field} is {value}, above the limit of {max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("invalid link filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}
