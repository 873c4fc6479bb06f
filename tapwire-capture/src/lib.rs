//! Packet capture sessions for tapwire
//!
//! This crate drives a live capture device and hands its packets either to a
//! capture file or to a user callback running on its own thread.
//!
//! ## Features
//!
//! - **Sessions**: `init` / `start_*` / `stop` / `terminate` lifecycle with reuse
//! - **Bounded hand-off**: callback dumps never buffer more than a fixed number of packets
//! - **Interface Management**: List, query, and select network interfaces
//! - **Statistics**: Pipeline counters plus the capture library's own counters
//!
//! ## Example
//!
//! ```no_run
//! use tapwire_capture::CaptureSession;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = CaptureSession::new();
//! session.init("eth0", Some("udp port 53"))?;
//!
//! session.start_callback_dump(|packet| {
//!     println!("#{} {} bytes", packet.sequence, packet.original_length);
//! })?;
//!
//! // Later, stop the capture and release the device
//! session.stop();
//! session.terminate();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod interface;
pub mod pcap_backend;
pub mod queue;
pub mod session;
pub mod stats;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types
pub use config::{CaptureConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_SNAPLEN, DEFAULT_TIMEOUT_MS};
pub use device::{
    CaptureBackend, CaptureDevice, DeviceStats, FilterProgram, NetInfo, PacketSink, Poll,
};
pub use interface::{
    default_interface, get_interface, list_capture_interfaces, list_interfaces, InterfaceInfo,
};
pub use pcap_backend::{PcapBackend, PcapDevice, PcapSink};
pub use queue::{BoundedPacketQueue, Push};
pub use session::CaptureSession;
pub use stats::{CaptureStats, StatsAccumulator};
pub use worker::LoopInterrupt;
