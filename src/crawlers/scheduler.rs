//! Per-domain task queue enforcing the politeness limit: one request in flight
//! per domain, and a fixed minimum gap between the end of one request and the
//! start of the next on the same domain.
//!
//! The scheduler is a plain data structure driven by explicit instants, so the
//! ordering rules are testable without a clock or a network.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchKind {
    /// A seed page holding a game record
    Root,
    /// A character page, carrying the name of the game it was found on
    Character { game: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub url: Url,
    pub kind: FetchKind,
}

impl FetchTask {
    pub fn root(url: Url) -> Self {
        Self {
            url,
            kind: FetchKind::Root,
        }
    }

    pub fn character(url: Url, game: impl Into<String>) -> Self {
        Self {
            url,
            kind: FetchKind::Character { game: game.into() },
        }
    }

    /// The politeness key for this task
    pub fn domain(&self) -> String {
        self.url.host_str().unwrap_or_default().to_string()
    }
}

#[derive(Debug, Default)]
struct DomainQueue {
    pending: VecDeque<FetchTask>,
    in_flight: bool,
    ready_at: Option<Instant>,
}

impl DomainQueue {
    fn is_ready(&self, now: Instant) -> bool {
        !self.in_flight
            && !self.pending.is_empty()
            && self.ready_at.is_none_or(|at| at <= now)
    }
}

#[derive(Debug)]
pub struct DomainScheduler {
    delay: Duration,
    domains: BTreeMap<String, DomainQueue>,
}

impl DomainScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            domains: BTreeMap::new(),
        }
    }

    /// Queues a task behind any other work for its domain
    pub fn push(&mut self, task: FetchTask) {
        let domain = task.domain();
        ::log::trace!("Scheduling {} on {}", task.url, domain);
        self.domains.entry(domain).or_default().pending.push_back(task);
    }

    /// Takes the next task from a domain that is idle and past its delay.
    /// The domain is marked in flight until [`DomainScheduler::complete`] is called.
    pub fn pop_ready(&mut self, now: Instant) -> Option<FetchTask> {
        let queue = self.domains.values_mut().find(|q| q.is_ready(now))?;
        let task = queue.pending.pop_front()?;
        queue.in_flight = true;
        Some(task)
    }

    /// Marks the in-flight request for `domain` as finished at `now`
    pub fn complete(&mut self, domain: &str, now: Instant) {
        if let Some(queue) = self.domains.get_mut(domain) {
            queue.in_flight = false;
            queue.ready_at = Some(later(now, self.delay));
        }
    }

    /// Earliest instant at which a waiting domain becomes ready, if any domain
    /// is waiting on its delay
    pub fn next_wake(&self) -> Option<Instant> {
        self.domains
            .values()
            .filter(|q| !q.in_flight && !q.pending.is_empty())
            .filter_map(|q| q.ready_at)
            .min()
    }

    pub fn pending(&self) -> usize {
        self.domains.values().map(|q| q.pending.len()).sum()
    }

    pub fn in_flight(&self) -> usize {
        self.domains.values().filter(|q| q.in_flight).count()
    }

    /// No queued work and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.pending() == 0 && self.in_flight() == 0
    }

    /// Drops every queued task, leaving in-flight requests alone. Returns how
    /// many were dropped.
    pub fn clear_pending(&mut self) -> usize {
        self.domains
            .values_mut()
            .map(|q| {
                let dropped = q.pending.len();
                q.pending.clear();
                dropped
            })
            .sum()
    }
}

/// `now + delay`, saturating at a point far enough out to never be reached
fn later(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str) -> FetchTask {
        FetchTask::character(Url::parse(url).unwrap(), "Game")
    }

    #[test]
    fn test_one_in_flight_per_domain() {
        let mut scheduler = DomainScheduler::new(Duration::from_millis(0));
        scheduler.push(task("https://a.example.com/wiki/One"));
        scheduler.push(task("https://a.example.com/wiki/Two"));
        let now = Instant::now();

        let first = scheduler.pop_ready(now).unwrap();
        assert_eq!(first.url.path(), "/wiki/One");
        assert!(scheduler.pop_ready(now).is_none());
        assert_eq!(scheduler.in_flight(), 1);
        assert_eq!(scheduler.pending(), 1);

        scheduler.complete("a.example.com", now);
        let second = scheduler.pop_ready(now).unwrap();
        assert_eq!(second.url.path(), "/wiki/Two");
    }

    #[test]
    fn test_delay_between_requests() {
        let delay = Duration::from_millis(500);
        let mut scheduler = DomainScheduler::new(delay);
        scheduler.push(task("https://a.example.com/wiki/One"));
        scheduler.push(task("https://a.example.com/wiki/Two"));
        let start = Instant::now();

        scheduler.pop_ready(start).unwrap();
        scheduler.complete("a.example.com", start);

        assert!(scheduler.pop_ready(start).is_none());
        assert!(scheduler.pop_ready(start + Duration::from_millis(499)).is_none());
        assert_eq!(scheduler.next_wake(), Some(start + delay));
        assert!(scheduler.pop_ready(start + delay).is_some());
    }

    #[test]
    fn test_domains_are_independent() {
        let mut scheduler = DomainScheduler::new(Duration::from_secs(10));
        scheduler.push(task("https://a.example.com/wiki/One"));
        scheduler.push(task("https://b.example.com/wiki/One"));
        let now = Instant::now();

        let first = scheduler.pop_ready(now).unwrap();
        let second = scheduler.pop_ready(now).unwrap();
        assert_ne!(first.domain(), second.domain());
        assert_eq!(scheduler.in_flight(), 2);
        assert!(scheduler.next_wake().is_none());
    }

    #[test]
    fn test_idle_and_clear() {
        let mut scheduler = DomainScheduler::new(Duration::from_millis(0));
        assert!(scheduler.is_idle());

        scheduler.push(task("https://a.example.com/wiki/One"));
        scheduler.push(task("https://a.example.com/wiki/Two"));
        scheduler.push(task("https://b.example.com/wiki/Three"));
        let now = Instant::now();
        scheduler.pop_ready(now).unwrap();

        assert_eq!(scheduler.clear_pending(), 2);
        assert!(!scheduler.is_idle());
        scheduler.complete("a.example.com", now);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_fifo_within_domain() {
        let mut scheduler = DomainScheduler::new(Duration::from_millis(0));
        for name in ["A", "B", "C"] {
            scheduler.push(task(&format!("https://a.example.com/wiki/{}", name)));
        }
        let now = Instant::now();
        let mut order = Vec::new();
        while let Some(t) = scheduler.pop_ready(now) {
            order.push(t.url.path().to_string());
            scheduler.complete("a.example.com", now);
        }
        assert_eq!(order, vec!["/wiki/A", "/wiki/B", "/wiki/C"]);
    }

    #[test]
    fn test_huge_delay_saturates() {
        let mut scheduler = DomainScheduler::new(Duration::MAX);
        scheduler.push(task("https://a.example.com/wiki/One"));
        scheduler.push(task("https://a.example.com/wiki/Two"));
        let now = Instant::now();

        scheduler.pop_ready(now).unwrap();
        scheduler.complete("a.example.com", now);
        assert!(scheduler.next_wake().unwrap() > now + Duration::from_secs(86400));
        assert!(scheduler.pop_ready(now).is_none());
    }
}
