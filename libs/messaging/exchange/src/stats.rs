//! Lock-free routing statistics.
//!
//! Every counter is monotonic for the lifetime of the exchange. Increments
//! use `fetch_add`, so concurrent routers never lose an update; relative order
//! between two routers touching the same counter is unspecified.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RoutingStatistics {
    received_count: AtomicU64,
    received_bytes: AtomicU64,
    routed_count: AtomicU64,
    routed_bytes: AtomicU64,
    dropped_count: AtomicU64,
    dropped_bytes: AtomicU64,
    binding_count_high: AtomicU64,
}

/// Point-in-time copy of the counters, suitable for export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub msg_receives: u64,
    pub msg_routes: u64,
    pub msg_drops: u64,
    pub byte_receives: u64,
    pub byte_routes: u64,
    pub byte_drops: u64,
    pub binding_count: u64,
    pub binding_count_high: u64,
}

impl RoutingStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, size: u64) {
        self.received_count.fetch_add(1, Ordering::Relaxed);
        self.received_bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_routed(&self, size: u64) {
        self.routed_count.fetch_add(1, Ordering::Relaxed);
        self.routed_bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, size: u64) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
        self.dropped_bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// Raise the binding high-water mark to `count` if it is higher.
    ///
    /// Returns the high-water value after the update.
    pub fn observe_binding_count(&self, count: u64) -> u64 {
        let mut current_high = self.binding_count_high.load(Ordering::Acquire);
        while count > current_high {
            match self.binding_count_high.compare_exchange_weak(
                current_high,
                count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return count,
                Err(actual) => current_high = actual,
            }
        }
        current_high
    }

    pub fn msg_receives(&self) -> u64 {
        self.received_count.load(Ordering::Relaxed)
    }

    pub fn msg_routes(&self) -> u64 {
        self.routed_count.load(Ordering::Relaxed)
    }

    pub fn msg_drops(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn byte_receives(&self) -> u64 {
        self.received_bytes.load(Ordering::Relaxed)
    }

    pub fn byte_routes(&self) -> u64 {
        self.routed_bytes.load(Ordering::Relaxed)
    }

    pub fn byte_drops(&self) -> u64 {
        self.dropped_bytes.load(Ordering::Relaxed)
    }

    pub fn binding_count_high(&self) -> u64 {
        self.binding_count_high.load(Ordering::Acquire)
    }

    /// Copy all counters; `binding_count` is supplied by the owner
    pub fn snapshot(&self, binding_count: u64) -> StatisticsSnapshot {
        StatisticsSnapshot {
            msg_receives: self.msg_receives(),
            msg_routes: self.msg_routes(),
            msg_drops: self.msg_drops(),
            byte_receives: self.byte_receives(),
            byte_routes: self.byte_routes(),
            byte_drops: self.byte_drops(),
            binding_count,
            binding_count_high: self.binding_count_high(),
        }
    }
}
