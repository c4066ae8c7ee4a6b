// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-interface transport statistics.
//!
//! A struct of atomics updated only by the reader thread and read without
//! locking by anyone else, matching the teacher's `TcpTransportMetrics`
//! convention.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for one CAN interface.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    last_frame_time_bits: AtomicU64,
    total_packets: AtomicU64,
    running_count: AtomicU64,
    packets_per_second_bits: AtomicU64,
}

impl InterfaceStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one received frame at wall-clock time `now`.
    pub fn record_frame(&self, now: f64) {
        self.total_packets.fetch_add(1, Ordering::Relaxed);
        self.running_count.fetch_add(1, Ordering::Relaxed);
        self.last_frame_time_bits.store(now.to_bits(), Ordering::Relaxed);
    }

    /// Called once per wall second: folds the running count into the
    /// windowed average `(running + avg) / 2` and resets the running count.
    pub fn tick_second(&self) {
        let running = self.running_count.swap(0, Ordering::Relaxed) as f64;
        let prev = f64::from_bits(self.packets_per_second_bits.load(Ordering::Relaxed));
        let avg = (running + prev) / 2.0;
        self.packets_per_second_bits.store(avg.to_bits(), Ordering::Relaxed);
    }

    /// Zero total, running, and average.
    pub fn reset(&self) {
        self.total_packets.store(0, Ordering::Relaxed);
        self.running_count.store(0, Ordering::Relaxed);
        self.packets_per_second_bits.store(0.0f64.to_bits(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn last_frame_time(&self) -> f64 {
        f64::from_bits(self.last_frame_time_bits.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn total_packets(&self) -> u64 {
        self.total_packets.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn packets_per_second(&self) -> f64 {
        f64::from_bits(self.packets_per_second_bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_average_folds_toward_running_count() {
        let stats = InterfaceStats::new();
        for _ in 0..10 {
            stats.record_frame(1.0);
        }
        stats.tick_second();
        assert_eq!(stats.packets_per_second(), 5.0);
        stats.tick_second();
        assert_eq!(stats.packets_per_second(), 2.5);
    }

    #[test]
    fn reset_zeros_everything() {
        let stats = InterfaceStats::new();
        stats.record_frame(5.0);
        stats.tick_second();
        stats.reset();
        assert_eq!(stats.total_packets(), 0);
        assert_eq!(stats.packets_per_second(), 0.0);
    }
}
