use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Canonical character URLs seen during one run.
///
/// Cloning shares the underlying set. The set only grows and is dropped with
/// the run.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    seen: Arc<Mutex<HashSet<String>>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `url` and returns true if it was not already present. The check
    /// and the insert happen under one lock.
    pub async fn insert_new(&self, url: &str) -> bool {
        let mut seen = self.seen.lock().await;
        if seen.contains(url) {
            ::log::trace!("Skipping already visited: {}", url);
            return false;
        }
        seen.insert(url.to_string());
        true
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.seen.lock().await.contains(url)
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seen.lock().await.is_empty()
    }
}
