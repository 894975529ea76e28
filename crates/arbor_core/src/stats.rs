//! Application statistics.
//!
//! Counters are atomic and can be read while transactions are in progress.
//!
//! ```rust,ignore
//! let app = Application::new();
//! // ... writes ...
//! let stats = app.stats().snapshot();
//! println!("pushes: {}", stats.pushes);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters.
#[derive(Debug, Default)]
pub struct AppStats {
    /// Writes attempted through a write context.
    writes: AtomicU64,
    /// Batches opened.
    batches: AtomicU64,
    /// Successful publishes of the commit log.
    pushes: AtomicU64,
    /// Commits merged into the store or published as batch markers.
    commits_merged: AtomicU64,
    /// Reverts that discarded at least one commit.
    reverts: AtomicU64,
    /// Changes rejected by a reaction.
    rejections: AtomicU64,
    /// Observer failures collected during publish.
    observer_failures: AtomicU64,
}

impl AppStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_push(&self, commits: u64) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        self.commits_merged.fetch_add(commits, Ordering::Relaxed);
    }

    pub(crate) fn record_revert(&self) {
        self.reverts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_observer_failures(&self, count: u64) {
        self.observer_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of batches.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Returns the number of publishes.
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    /// Returns the number of commits merged.
    pub fn commits_merged(&self) -> u64 {
        self.commits_merged.load(Ordering::Relaxed)
    }

    /// Returns the number of reverts.
    pub fn reverts(&self) -> u64 {
        self.reverts.load(Ordering::Relaxed)
    }

    /// Returns the number of rejected changes.
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Returns the number of observer failures.
    pub fn observer_failures(&self) -> u64 {
        self.observer_failures.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            writes: self.writes(),
            batches: self.batches(),
            pushes: self.pushes(),
            commits_merged: self.commits_merged(),
            reverts: self.reverts(),
            rejections: self.rejections(),
            observer_failures: self.observer_failures(),
        }
    }
}

/// A point-in-time copy of [`AppStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Writes attempted.
    pub writes: u64,
    /// Batches opened.
    pub batches: u64,
    /// Successful publishes.
    pub pushes: u64,
    /// Commits merged.
    pub commits_merged: u64,
    /// Reverts.
    pub reverts: u64,
    /// Rejected changes.
    pub rejections: u64,
    /// Observer failures.
    pub observer_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = AppStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_push_counts_commits() {
        let stats = AppStats::new();
        stats.record_push(3);
        stats.record_push(2);
        assert_eq!(stats.pushes(), 2);
        assert_eq!(stats.commits_merged(), 5);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(AppStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_write();
                        s.record_observer_failures(2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.writes(), 800);
        assert_eq!(stats.observer_failures(), 1600);
    }
}
