use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Running totals for one crawl, shared between the traversal and whoever
/// polls it.
#[derive(Debug, Default)]
pub struct CrawlProgress {
    scheduled: AtomicUsize,
    completed: AtomicUsize,
    games_saved: AtomicUsize,
    characters_saved: AtomicUsize,
    characters_dropped: AtomicUsize,
    fetch_failures: AtomicUsize,
    write_failures: AtomicUsize,
}

/// Point-in-time copy of [`CrawlProgress`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub scheduled: usize,
    pub completed: usize,
    pub games_saved: usize,
    pub characters_saved: usize,
    pub characters_dropped: usize,
    pub fetch_failures: usize,
    pub write_failures: usize,
}

impl CrawlProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_game_saved(&self) {
        self.games_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_character_saved(&self) {
        self.characters_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_character_dropped(&self) {
        self.characters_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            games_saved: self.games_saved.load(Ordering::Relaxed),
            characters_saved: self.characters_saved.load(Ordering::Relaxed),
            characters_dropped: self.characters_dropped.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

impl ProgressSnapshot {
    /// Records written to the output store
    pub fn items_saved(&self) -> usize {
        self.games_saved + self.characters_saved
    }

    /// Coarse completion estimate. Stays below 100 until the run is over since
    /// discovery can still add work.
    pub fn percent(&self, finished: bool) -> u8 {
        if finished {
            return 100;
        }
        if self.scheduled == 0 {
            return 0;
        }
        let ratio = (self.completed * 100) / self.scheduled;
        ratio.min(99) as u8
    }
}
