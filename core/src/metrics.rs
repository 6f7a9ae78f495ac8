//! # stompmq Metrics
//!
//! Lock-free broker counters. Every update is a single relaxed atomic add so
//! the request path never blocks on bookkeeping; [`BrokerMetrics::snapshot`]
//! gives a consistent-enough view for logging.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 64-byte aligned wrapper so hot counters do not share a cache line.
#[repr(align(64))]
#[derive(Debug, Default)]
struct CacheLineAligned<T>(T);

#[derive(Debug, Default)]
pub struct BrokerMetrics {
    active_connections: CacheLineAligned<AtomicUsize>,
    frames_received: CacheLineAligned<AtomicU64>,
    frame_errors: AtomicU64,
    error_responses: AtomicU64,
    messages_persisted: AtomicU64,
    messages_delivered: CacheLineAligned<AtomicU64>,
    delivery_failures: AtomicU64,
    destinations: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub active_connections: usize,
    pub frames_received: u64,
    pub frame_errors: u64,
    pub error_responses: u64,
    pub messages_persisted: u64,
    pub messages_delivered: u64,
    pub delivery_failures: u64,
    pub destinations: usize,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn connection_opened(&self) {
        self.active_connections.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn connection_closed(&self) {
        self.active_connections.0.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn frame_received(&self) {
        self.frames_received.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_response(&self) {
        self.error_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_persisted(&self) {
        self.messages_persisted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn message_delivered(&self) {
        self.messages_delivered.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivery_failed(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_destination_count(&self, count: usize) {
        self.destinations.store(count, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.0.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.0.load(Ordering::Relaxed),
            frames_received: self.frames_received.0.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            error_responses: self.error_responses.load(Ordering::Relaxed),
            messages_persisted: self.messages_persisted.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.0.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            destinations: self.destinations.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    pub fn report(&self) -> String {
        format!(
            "connections={} frames={} frame_errors={} errors={} persisted={} delivered={} \
             delivery_failures={} destinations={}",
            self.active_connections,
            self.frames_received,
            self.frame_errors,
            self.error_responses,
            self.messages_persisted,
            self.messages_delivered,
            self.delivery_failures,
            self.destinations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = BrokerMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        metrics.frame_received();
        metrics.message_delivered();
        metrics.message_delivered();
        metrics.update_destination_count(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.frames_received, 1);
        assert_eq!(snapshot.messages_delivered, 2);
        assert_eq!(snapshot.destinations, 3);
        assert!(snapshot.report().contains("delivered=2"));
    }
}
