//! Pipeline counters, shared by the intake controller and every worker and dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicUsize,
    ignored: AtomicUsize,
    notices: AtomicUsize,
    enqueued: AtomicUsize,
    generated: AtomicUsize,
    generation_failures: AtomicUsize,
    delivered: AtomicUsize,
    delivery_failures: AtomicUsize,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Inbound messages read by intake.
    pub received: usize,
    /// Messages without a recognized command (and blank messages).
    pub ignored: usize,
    /// Missing-argument notices sent straight to the outtake queue.
    pub notices: usize,
    /// Request units pushed to the intake queue.
    pub enqueued: usize,
    pub generated: usize,
    pub generation_failures: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notice(&self) {
        self.notices.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_generated(&self) {
        self.generated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineReport {
        PipelineReport {
            received: self.received.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            notices: self.notices.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
