//! Capture configuration

use std::time::Duration;

/// Default snapshot length (maximum bytes per packet)
pub const DEFAULT_SNAPLEN: i32 = 1500;

/// Default read timeout for the capture device (milliseconds)
pub const DEFAULT_TIMEOUT_MS: i32 = 1000;

/// Default number of packets the hand-off queue holds before dropping
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Extension appended to capture file base names
pub const CAPTURE_FILE_EXTENSION: &str = "pcap";

/// Configuration for a capture session
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Maximum bytes to capture per packet
    pub snaplen: i32,
    /// Read timeout in milliseconds
    pub timeout_ms: i32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// Put the device in non-blocking mode after opening
    pub nonblocking: bool,
    /// Enable immediate mode (deliver packets immediately)
    pub immediate_mode: bool,
    /// Kernel buffer size (0 = libpcap default)
    pub buffer_size: i32,
    /// Optimize compiled filter programs
    pub optimize_filter: bool,
    /// Capacity of the hand-off queue used in callback mode
    pub queue_capacity: usize,
    /// Maximum packets pulled from the device per poll
    pub poll_batch: usize,
    /// Sleep between polls that surfaced no packet
    pub idle_backoff: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            promiscuous: false,
            nonblocking: true,
            immediate_mode: false,
            buffer_size: 0,
            optimize_filter: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_batch: 64,
            idle_backoff: Duration::from_millis(1),
        }
    }
}

impl CaptureConfig {
    /// Default configuration with the given queue capacity (0 selects the default)
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            queue_capacity: normalize_capacity(capacity),
            ..Self::default()
        }
    }
}

/// Map a requested queue capacity to the effective one
pub(crate) fn normalize_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        DEFAULT_QUEUE_CAPACITY
    } else {
        capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.snaplen, DEFAULT_SNAPLEN);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!config.promiscuous);
        assert!(config.nonblocking);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        assert_eq!(
            CaptureConfig::with_queue_capacity(0).queue_capacity,
            DEFAULT_QUEUE_CAPACITY
        );
        assert_eq!(CaptureConfig::with_queue_capacity(8).queue_capacity, 8);
    }
}
