use std::collections::{HashSet, VecDeque};

use crate::urls::CanonicalUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontierState {
    Idle,
    Running,
    Done,
}

/// Breadth-first work queue for one crawl.
///
/// `pending` holds every URL that is queued or currently being fetched; together with `visited`
/// it keeps a URL from being scheduled twice. A URL that fails is released from `pending` without
/// entering `visited`, so a later page may offer it again.
#[derive(Debug)]
pub struct Frontier {
    max_pages: usize,
    state: FrontierState,
    visited: HashSet<CanonicalUrl>,
    queue: VecDeque<CanonicalUrl>,
    pending: HashSet<CanonicalUrl>,
    in_flight: usize,
    pages_downloaded: usize,
}

impl Frontier {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages,
            state: FrontierState::Idle,
            visited: HashSet::new(),
            queue: VecDeque::new(),
            pending: HashSet::new(),
            in_flight: 0,
            pages_downloaded: 0,
        }
    }

    pub fn seed(&mut self, url: CanonicalUrl) {
        if self.state != FrontierState::Idle {
            tracing::debug!(%url, state = ?self.state, "frontier already seeded; ignoring seed");
            return;
        }
        self.state = FrontierState::Running;
        self.offer(url);
    }

    /// Pops the next URL in discovery order, or `None` once the queue is drained or the page
    /// budget is fully reserved by downloaded and in-flight pages.
    pub fn pop_next(&mut self) -> Option<CanonicalUrl> {
        if self.state != FrontierState::Running {
            return None;
        }

        if self.pages_downloaded + self.in_flight >= self.max_pages {
            self.finish_if_idle();
            return None;
        }

        let Some(url) = self.queue.pop_front() else {
            self.finish_if_idle();
            return None;
        };
        self.in_flight += 1;
        Some(url)
    }

    pub fn mark_visited(&mut self, url: &CanonicalUrl) {
        self.settle(url);
        if self.visited.insert(url.clone()) {
            self.pages_downloaded += 1;
        }
    }

    pub fn release(&mut self, url: &CanonicalUrl) {
        self.settle(url);
    }

    /// Queues `url` unless it was already downloaded, queued or is in flight.
    pub fn offer(&mut self, url: CanonicalUrl) -> bool {
        if self.state == FrontierState::Done
            || self.visited.contains(&url)
            || self.pending.contains(&url)
        {
            return false;
        }
        self.pending.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    pub fn state(&self) -> FrontierState {
        self.state
    }

    pub fn pages_downloaded(&self) -> usize {
        self.pages_downloaded
    }

    pub fn is_visited(&self, url: &CanonicalUrl) -> bool {
        self.visited.contains(url)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn settle(&mut self, url: &CanonicalUrl) {
        if self.pending.remove(url) {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
    }

    fn finish_if_idle(&mut self) {
        if self.in_flight == 0 {
            self.state = FrontierState::Done;
        }
    }
}
