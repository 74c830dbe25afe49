use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// At least one seed page was fetched and processed
    Finished,
    /// Every seed page failed to render
    Failed,
    /// A stop was requested before the queue drained
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Finished => "finished",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Writes the end-of-run summary, replacing any previous one
#[derive(Debug, Clone)]
pub struct RunReporter {
    path: PathBuf,
}

impl RunReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn report(&self, status: RunStatus, visited: usize) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, render(status, visited))?;
        ::log::info!("Wrote run report to {}", self.path.display());
        Ok(())
    }
}

pub fn render(status: RunStatus, visited: usize) -> String {
    format!(
        "# Crawl report\n\n- Status: `{}`\n- Unique character pages visited: {}\n",
        status, visited
    )
}
