//! Observability: tracing setup and controller counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this twice is a
/// no-op for the second call.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Metrics handle for recording controller activity
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_submitted: AtomicU64,
    submissions_failed: AtomicU64,
    polls: AtomicU64,
    polls_failed: AtomicU64,
    jobs_finished: AtomicU64,
    cancels: AtomicU64,
    cancels_confirmed: AtomicU64,
    cancels_unconfirmed: AtomicU64,
    jobs_abandoned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_submitted", "Metric incremented");
    }

    pub fn submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_failed", "Metric incremented");
    }

    pub fn poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "polls", "Metric incremented");
    }

    pub fn poll_failed(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "polls_failed", "Metric incremented");
    }

    pub fn job_finished(&self) {
        self.jobs_finished.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_finished", "Metric incremented");
    }

    pub fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cancels", "Metric incremented");
    }

    // Cancel outcomes are release/acquire: a reader that sees a cancel
    // settled also sees the state update published before it.
    pub fn cancel_confirmed(&self) {
        self.cancels_confirmed.fetch_add(1, Ordering::Release);
        tracing::debug!(counter = "cancels_confirmed", "Metric incremented");
    }

    pub fn cancel_unconfirmed(&self) {
        self.cancels_unconfirmed.fetch_add(1, Ordering::Release);
        tracing::debug!(counter = "cancels_unconfirmed", "Metric incremented");
    }

    pub fn job_abandoned(&self) {
        self.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_abandoned", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            jobs_finished: self.jobs_finished.load(Ordering::Relaxed),
            cancels: self.cancels.load(Ordering::Relaxed),
            cancels_confirmed: self.cancels_confirmed.load(Ordering::Acquire),
            cancels_unconfirmed: self.cancels_unconfirmed.load(Ordering::Acquire),
            jobs_abandoned: self.jobs_abandoned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub submissions_failed: u64,
    pub polls: u64,
    pub polls_failed: u64,
    pub jobs_finished: u64,
    pub cancels: u64,
    pub cancels_confirmed: u64,
    pub cancels_unconfirmed: u64,
    pub jobs_abandoned: u64,
}

impl MetricsSnapshot {
    /// Remote cancel requests that have not answered yet
    pub fn cancels_in_flight(&self) -> u64 {
        self.cancels
            .saturating_sub(self.cancels_confirmed + self.cancels_unconfirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.job_submitted();
        metrics.poll();
        metrics.poll();
        metrics.cancel();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 1);
        assert_eq!(snapshot.polls, 2);
        assert_eq!(snapshot.cancels, 1);
        assert_eq!(snapshot.polls_failed, 0);
        assert_eq!(snapshot.cancels_in_flight(), 1);

        metrics.cancel_unconfirmed();
        assert_eq!(metrics.snapshot().cancels_in_flight(), 0);
    }
}
