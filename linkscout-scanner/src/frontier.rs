use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

pub const DEFAULT_MAX_PAGES: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Lifecycle of a URL within one crawl session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlState {
    Undiscovered,
    Queued,
    /// Navigated as a page.
    Visited,
    /// Existence-checked as a non-page resource.
    Checked,
}

/// BFS queue plus visited tracking and the session's page caps.
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<String>,
    queued: HashSet<String>,
    settled: HashMap<String, UrlState>,
    pages_visited: usize,
    max_pages: usize,
    batch_size: usize,
}

impl Frontier {
    pub fn new(max_pages: usize, batch_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            settled: HashMap::new(),
            pages_visited: 0,
            max_pages: max_pages.max(1),
            batch_size: batch_size.max(1),
        }
    }

    pub fn state(&self, url: &str) -> UrlState {
        if let Some(state) = self.settled.get(url) {
            *state
        } else if self.queued.contains(url) {
            UrlState::Queued
        } else {
            UrlState::Undiscovered
        }
    }

    /// Enqueues `url` unless it is already queued, visited or checked.
    pub fn push(&mut self, url: &str) -> bool {
        if self.state(url) != UrlState::Undiscovered {
            return false;
        }
        self.queued.insert(url.to_string());
        self.queue.push_back(url.to_string());
        true
    }

    /// Dequeues the next URL that has not been settled yet.
    pub fn pop(&mut self) -> Option<String> {
        while let Some(url) = self.queue.pop_front() {
            self.queued.remove(&url);
            if self.settled.contains_key(&url) {
                debug!("Skipping already settled {}", url);
                continue;
            }
            return Some(url);
        }
        None
    }

    /// Marks a dequeued URL as a visited page. Returns `false` if it was
    /// already settled, in which case the visit must not happen.
    pub fn mark_visited(&mut self, url: &str) -> bool {
        if self.settled.contains_key(url) {
            return false;
        }
        self.settled.insert(url.to_string(), UrlState::Visited);
        self.pages_visited += 1;
        true
    }

    /// Marks a dequeued URL as an existence-checked resource.
    pub fn mark_checked(&mut self, url: &str) -> bool {
        if self.settled.contains_key(url) {
            return false;
        }
        self.settled.insert(url.to_string(), UrlState::Checked);
        true
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited
    }

    pub fn cap_reached(&self) -> bool {
        self.pages_visited >= self.max_pages
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGES, DEFAULT_BATCH_SIZE)
    }
}
