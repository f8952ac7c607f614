//! Time-ordered event window with bounded capacity.
//!
//! Entries are pushed in monotonic order, so pruning only ever pops from the
//! front (amortized O(1)). Capacity is fixed at construction; when full, the
//! oldest entry is dropped, so a sustained failure storm cannot grow memory.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    span: Duration,
    capacity: usize,
    entries: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(span: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            span,
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Record an event at `now` and drop stale entries.
    pub fn record(&mut self, now: Instant) {
        self.prune(now);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(now);
    }

    /// Drop entries older than the window span.
    pub fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.entries.front() {
            if now.saturating_duration_since(*oldest) > self.span {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Entries inside the window as of `now`, without mutating.
    pub fn count_at(&self, now: Instant) -> usize {
        // Entries are ordered, so stale ones form a prefix
        let stale = self
            .entries
            .iter()
            .take_while(|t| now.saturating_duration_since(**t) > self.span)
            .count();
        self.entries.len() - stale
    }

    /// Number of retained entries (only accurate right after a prune).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn oldest(&self) -> Option<Instant> {
        self.entries.front().copied()
    }
}
