//! Capture pipeline statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::device::DeviceStats;

/// Snapshot of a session's pipeline counters
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    /// Packets surfaced by the capture loop
    pub packets_received: u64,
    /// Captured bytes surfaced by the capture loop
    pub bytes_received: u64,
    /// Packets written to the capture file
    pub packets_written: u64,
    /// Packets handed to the dispatch queue
    pub packets_queued: u64,
    /// Packets delivered to the handler
    pub packets_delivered: u64,
    /// Packets dropped because the queue was full or closed
    pub packets_dropped: u64,
    /// Queued packets discarded during stop
    pub packets_discarded: u64,
    /// Packets that could not be copied out of the capture buffer
    pub copy_failures: u64,
    /// Packets dropped by the kernel (from the device, if queried)
    pub kernel_dropped: u64,
    /// Packets dropped by the interface (from the device, if queried)
    pub interface_dropped: u64,
    /// Time since the counters started
    pub duration: Duration,
    /// Packets per second
    pub packets_per_second: f64,
    /// Bytes per second
    pub bytes_per_second: f64,
}

impl CaptureStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge kernel/library counters into this snapshot
    pub fn with_device_stats(mut self, device: DeviceStats) -> Self {
        self.kernel_dropped = device.dropped;
        self.interface_dropped = device.if_dropped;
        self
    }

    /// Packets lost inside the pipeline
    pub fn pipeline_losses(&self) -> u64 {
        self.packets_dropped + self.packets_discarded + self.copy_failures
    }

    /// Calculate pipeline drop rate as percentage
    pub fn drop_rate(&self) -> f64 {
        if self.packets_received == 0 {
            return 0.0;
        }
        (self.pipeline_losses() as f64 / self.packets_received as f64) * 100.0
    }

    /// Check if there are significant drops
    pub fn has_significant_drops(&self, threshold_percent: f64) -> bool {
        self.drop_rate() > threshold_percent
    }

    /// Format statistics as human-readable string
    pub fn format(&self) -> String {
        format!(
            "Received: {} packets ({} bytes)\n\
             Written: {} packets\n\
             Delivered: {} of {} queued packets\n\
             Dropped: {} packets ({:.2}%), {} discarded, {} copy failures\n\
             Kernel dropped: {}, IF dropped: {}\n\
             Duration: {:.2}s\n\
             Rate: {:.2} pps, {:.2} KB/s",
            self.packets_received,
            self.bytes_received,
            self.packets_written,
            self.packets_delivered,
            self.packets_queued,
            self.packets_dropped,
            self.drop_rate(),
            self.packets_discarded,
            self.copy_failures,
            self.kernel_dropped,
            self.interface_dropped,
            self.duration.as_secs_f64(),
            self.packets_per_second,
            self.bytes_per_second / 1024.0
        )
    }
}

/// Thread-safe statistics accumulator shared by the session and its workers
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    packets_received: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    packets_written: Arc<AtomicU64>,
    packets_queued: Arc<AtomicU64>,
    packets_delivered: Arc<AtomicU64>,
    packets_dropped: Arc<AtomicU64>,
    packets_discarded: Arc<AtomicU64>,
    copy_failures: Arc<AtomicU64>,
    start_time: Instant,
}

impl StatsAccumulator {
    /// Create a new statistics accumulator
    pub fn new() -> Self {
        Self {
            packets_received: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            packets_written: Arc::new(AtomicU64::new(0)),
            packets_queued: Arc::new(AtomicU64::new(0)),
            packets_delivered: Arc::new(AtomicU64::new(0)),
            packets_dropped: Arc::new(AtomicU64::new(0)),
            packets_discarded: Arc::new(AtomicU64::new(0)),
            copy_failures: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Record a packet surfaced by the capture loop
    pub fn record_packet(&self, size: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.packets_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.packets_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.packets_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record dropped packets
    pub fn record_drops(&self, count: u64) {
        self.packets_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, count: u64) {
        self.packets_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_copy_failure(&self) {
        self.copy_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> CaptureStats {
        let packets_received = self.packets_received.load(Ordering::Relaxed);
        let bytes_received = self.bytes_received.load(Ordering::Relaxed);
        let duration = self.start_time.elapsed();

        let secs = duration.as_secs_f64();
        let packets_per_second = if secs > 0.0 {
            packets_received as f64 / secs
        } else {
            0.0
        };
        let bytes_per_second = if secs > 0.0 {
            bytes_received as f64 / secs
        } else {
            0.0
        };

        CaptureStats {
            packets_received,
            bytes_received,
            packets_written: self.packets_written.load(Ordering::Relaxed),
            packets_queued: self.packets_queued.load(Ordering::Relaxed),
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            copy_failures: self.copy_failures.load(Ordering::Relaxed),
            kernel_dropped: 0,
            interface_dropped: 0,
            duration,
            packets_per_second,
            bytes_per_second,
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
