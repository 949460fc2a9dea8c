//! The URL frontier of a single job
//!
//! A strict FIFO queue (breadth-first order) with an exact "seen" set
//! consulted at enqueue time. The frontier also tracks in-flight entries so
//! that workers can tell "empty for now" apart from "exhausted": the crawl is
//! finished only when the queue is empty and nothing is in flight, since an
//! in-flight page may still discover links.

use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A pending or in-flight discovery
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    pub url: Url,
    /// Link distance from the seed (seed = 0)
    pub depth: u32,
    /// Page on which the URL was discovered
    pub parent: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    found: u64,
    in_flight: usize,
}

/// Deduplicating breadth-first frontier with a hard admission limit
#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    max_pages: u64,
}

impl Frontier {
    /// Creates an empty frontier admitting at most `max_pages` URLs
    pub fn new(max_pages: u64) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            max_pages,
        }
    }

    /// Adds a canonical URL to the queue
    ///
    /// Returns false (and changes nothing) if the URL was already seen by
    /// this job or if `max_pages` URLs have already been admitted.
    pub fn enqueue(&self, url: Url, depth: u32, parent: Option<String>) -> bool {
        {
            let mut state = self.lock();
            if state.found >= self.max_pages || state.seen.contains(url.as_str()) {
                return false;
            }
            state.seen.insert(url.as_str().to_string());
            state.found += 1;
            state.queue.push_back(FrontierEntry {
                url,
                depth,
                parent,
                enqueued_at: Utc::now(),
            });
        }
        self.notify.notify_waiters();
        true
    }

    /// Records a URL as seen without queueing it
    ///
    /// Used for redirect targets so the final URL is not crawled again.
    /// Returns false if it was already seen.
    pub fn mark_seen(&self, url: &Url) -> bool {
        self.lock().seen.insert(url.as_str().to_string())
    }

    pub fn has_seen(&self, url: &Url) -> bool {
        self.lock().seen.contains(url.as_str())
    }

    /// Pops the oldest entry without waiting, marking it in flight
    pub fn dequeue(&self) -> Option<FrontierEntry> {
        let mut state = self.lock();
        let entry = state.queue.pop_front()?;
        state.in_flight += 1;
        Some(entry)
    }

    /// Waits for the next entry
    ///
    /// Returns None once the frontier is exhausted (queue empty, nothing in
    /// flight) or when `cancel` fires. Every entry returned must be released
    /// with [`Frontier::finish`].
    pub async fn next_entry(&self, cancel: &CancellationToken) -> Option<FrontierEntry> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a wakeup in between is not lost
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return None;
            }
            {
                let mut state = self.lock();
                if let Some(entry) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(entry);
                }
                if state.in_flight == 0 {
                    drop(state);
                    // Wake the other idle workers so they observe exhaustion too
                    self.notify.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Releases an entry returned by `dequeue`/`next_entry`
    pub fn finish(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// URLs admitted so far (the job's `pages_found`)
    pub fn found(&self) -> u64 {
        self.lock().found
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// True when nothing is queued and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        state.queue.is_empty() && state.in_flight == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let frontier = Frontier::new(10);
        assert!(frontier.enqueue(url("https://a.test/"), 0, None));
        assert!(frontier.enqueue(url("https://a.test/a"), 1, Some("https://a.test/".into())));
        assert!(frontier.enqueue(url("https://a.test/b"), 1, Some("https://a.test/".into())));

        let order: Vec<String> = std::iter::from_fn(|| frontier.dequeue())
            .map(|e| e.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/", "/a", "/b"]);
    }

    #[test]
    fn test_dedup_at_enqueue_time() {
        let frontier = Frontier::new(10);
        assert!(frontier.enqueue(url("https://a.test/b"), 1, None));
        // Still rejected after the first copy has been dequeued
        frontier.dequeue().unwrap();
        assert!(!frontier.enqueue(url("https://a.test/b"), 2, None));
        assert_eq!(frontier.found(), 1);
    }

    #[test]
    fn test_hard_limit_is_silent() {
        let frontier = Frontier::new(2);
        assert!(frontier.enqueue(url("https://a.test/1"), 0, None));
        assert!(frontier.enqueue(url("https://a.test/2"), 1, None));
        assert!(!frontier.enqueue(url("https://a.test/3"), 1, None));
        assert_eq!(frontier.found(), 2);
        assert!(!frontier.has_seen(&url("https://a.test/3")));
    }

    #[test]
    fn test_mark_seen_blocks_later_enqueue() {
        let frontier = Frontier::new(10);
        assert!(frontier.mark_seen(&url("https://a.test/final")));
        assert!(!frontier.mark_seen(&url("https://a.test/final")));
        assert!(!frontier.enqueue(url("https://a.test/final"), 1, None));
        assert_eq!(frontier.found(), 0);
    }

    #[tokio::test]
    async fn test_next_entry_returns_none_when_exhausted() {
        let frontier = Frontier::new(10);
        let cancel = CancellationToken::new();
        frontier.enqueue(url("https://a.test/"), 0, None);

        let entry = frontier.next_entry(&cancel).await.unwrap();
        assert_eq!(entry.depth, 0);
        assert!(!frontier.is_exhausted());
        frontier.finish();
        assert!(frontier.next_entry(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_worker_waits_for_in_flight_discoveries() {
        let frontier = Arc::new(Frontier::new(10));
        let cancel = CancellationToken::new();
        frontier.enqueue(url("https://a.test/"), 0, None);
        let _seed = frontier.next_entry(&cancel).await.unwrap();

        let waiter = {
            let frontier = Arc::clone(&frontier);
            let cancel = cancel.clone();
            tokio::spawn(async move { frontier.next_entry(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        frontier.enqueue(url("https://a.test/child"), 1, Some("https://a.test/".into()));
        frontier.finish();
        let child = waiter.await.unwrap().unwrap();
        assert_eq!(child.url.path(), "/child");
    }

    #[tokio::test]
    async fn test_cancel_unblocks_next_entry() {
        let frontier = Arc::new(Frontier::new(10));
        let cancel = CancellationToken::new();
        frontier.enqueue(url("https://a.test/"), 0, None);
        let _seed = frontier.dequeue().unwrap();

        let waiter = {
            let frontier = Arc::clone(&frontier);
            let cancel = cancel.clone();
            tokio::spawn(async move { frontier.next_entry(&cancel).await })
        };
        cancel.cancel();
        assert!(waiter.await.unwrap().is_none());
    }
}
