//! Counters for the tailer hot paths.
//!
//! All counters are lock-free and may be bumped from any thread; the room
//! thread owns most of them in practice. `snapshot()` gives a coherent-
//! enough point-in-time copy for admin surfaces.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of every tailer counter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TailerMetricsSnapshot {
    pub records_received: u64,
    pub records_received_payload_bytes: u64,
    pub tail_records_received: u64,
    pub backlog_records_received: u64,
    pub records_with_subscriptions: u64,
    pub records_without_subscriptions: u64,
    pub records_out_of_order: u64,
    pub bumped_subscriptions: u64,
    pub gap_records_received: u64,
    pub gap_records_out_of_order: u64,
    pub gaps_with_subscriptions: u64,
    pub gaps_without_subscriptions: u64,
    pub benign_gaps_received: u64,
    pub malignant_gaps_received: u64,
    pub records_served_from_cache: u64,
    pub add_subscriber_requests: u64,
    pub add_subscriber_requests_at_0: u64,
    pub add_subscriber_requests_at_0_fast: u64,
    pub add_subscriber_requests_at_0_slow: u64,
    pub updated_subscriptions: u64,
    pub remove_subscriber_requests: u64,
    pub stale_tail_subscriptions: u64,
    pub forward_queue_rejections: u64,
    pub storage_start_failures: u64,
    pub storage_stop_failures: u64,
}

/// Thread-safe tailer counters.
#[derive(Debug, Default)]
pub struct TailerMetrics {
    pub(crate) records_received: AtomicU64,
    pub(crate) records_received_payload_bytes: AtomicU64,
    pub(crate) tail_records_received: AtomicU64,
    pub(crate) backlog_records_received: AtomicU64,
    pub(crate) records_with_subscriptions: AtomicU64,
    pub(crate) records_without_subscriptions: AtomicU64,
    pub(crate) records_out_of_order: AtomicU64,
    pub(crate) bumped_subscriptions: AtomicU64,
    pub(crate) gap_records_received: AtomicU64,
    pub(crate) gap_records_out_of_order: AtomicU64,
    pub(crate) gaps_with_subscriptions: AtomicU64,
    pub(crate) gaps_without_subscriptions: AtomicU64,
    pub(crate) benign_gaps_received: AtomicU64,
    pub(crate) malignant_gaps_received: AtomicU64,
    pub(crate) records_served_from_cache: AtomicU64,
    pub(crate) add_subscriber_requests: AtomicU64,
    pub(crate) add_subscriber_requests_at_0: AtomicU64,
    pub(crate) add_subscriber_requests_at_0_fast: AtomicU64,
    pub(crate) add_subscriber_requests_at_0_slow: AtomicU64,
    pub(crate) updated_subscriptions: AtomicU64,
    pub(crate) remove_subscriber_requests: AtomicU64,
    pub(crate) stale_tail_subscriptions: AtomicU64,
    pub(crate) forward_queue_rejections: AtomicU64,
    pub(crate) storage_start_failures: AtomicU64,
    pub(crate) storage_stop_failures: AtomicU64,
}

pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn add(counter: &AtomicU64, value: u64) {
    counter.fetch_add(value, Ordering::Relaxed);
}

impl TailerMetrics {
    pub fn snapshot(&self) -> TailerMetricsSnapshot {
        TailerMetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            records_received_payload_bytes: self
                .records_received_payload_bytes
                .load(Ordering::Relaxed),
            tail_records_received: self.tail_records_received.load(Ordering::Relaxed),
            backlog_records_received: self.backlog_records_received.load(Ordering::Relaxed),
            records_with_subscriptions: self.records_with_subscriptions.load(Ordering::Relaxed),
            records_without_subscriptions: self
                .records_without_subscriptions
                .load(Ordering::Relaxed),
            records_out_of_order: self.records_out_of_order.load(Ordering::Relaxed),
            bumped_subscriptions: self.bumped_subscriptions.load(Ordering::Relaxed),
            gap_records_received: self.gap_records_received.load(Ordering::Relaxed),
            gap_records_out_of_order: self.gap_records_out_of_order.load(Ordering::Relaxed),
            gaps_with_subscriptions: self.gaps_with_subscriptions.load(Ordering::Relaxed),
            gaps_without_subscriptions: self.gaps_without_subscriptions.load(Ordering::Relaxed),
            benign_gaps_received: self.benign_gaps_received.load(Ordering::Relaxed),
            malignant_gaps_received: self.malignant_gaps_received.load(Ordering::Relaxed),
            records_served_from_cache: self.records_served_from_cache.load(Ordering::Relaxed),
            add_subscriber_requests: self.add_subscriber_requests.load(Ordering::Relaxed),
            add_subscriber_requests_at_0: self.add_subscriber_requests_at_0.load(Ordering::Relaxed),
            add_subscriber_requests_at_0_fast: self
                .add_subscriber_requests_at_0_fast
                .load(Ordering::Relaxed),
            add_subscriber_requests_at_0_slow: self
                .add_subscriber_requests_at_0_slow
                .load(Ordering::Relaxed),
            updated_subscriptions: self.updated_subscriptions.load(Ordering::Relaxed),
            remove_subscriber_requests: self.remove_subscriber_requests.load(Ordering::Relaxed),
            stale_tail_subscriptions: self.stale_tail_subscriptions.load(Ordering::Relaxed),
            forward_queue_rejections: self.forward_queue_rejections.load(Ordering::Relaxed),
            storage_start_failures: self.storage_start_failures.load(Ordering::Relaxed),
            storage_stop_failures: self.storage_stop_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = TailerMetrics::default();
        incr(&metrics.records_received);
        incr(&metrics.records_received);
        add(&metrics.records_received_payload_bytes, 128);
        let snap = metrics.snapshot();
        assert_eq!(snap.records_received, 2);
        assert_eq!(snap.records_received_payload_bytes, 128);
        assert_eq!(snap.records_out_of_order, 0);
    }
}
