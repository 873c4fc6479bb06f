//! Device and capture-file bindings
//!
//! The session drives packet capture through these traits so the
//! pipeline does not depend on a particular capture library. The libpcap
//! implementation lives in [`crate::pcap_backend`].

use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use tapwire_core::{PacketHeader, Result};

use crate::config::CaptureConfig;

/// Callback that makes a blocked capture loop return, callable from any thread
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// IPv4 network and mask of an interface, used when compiling filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetInfo {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl NetInfo {
    /// Network info for an interface without IPv4 configuration
    pub const UNKNOWN: NetInfo = NetInfo {
        network: Ipv4Addr::UNSPECIFIED,
        mask: Ipv4Addr::UNSPECIFIED,
    };

    /// Build from an address and prefix length
    pub fn from_prefix(address: Ipv4Addr, prefix: u8) -> Self {
        let bits = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix.min(32)))
        };
        Self {
            network: Ipv4Addr::from(u32::from(address) & bits),
            mask: Ipv4Addr::from(bits),
        }
    }
}

impl fmt::Display for NetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.mask)
    }
}

/// A compiled filter program, ready to be installed on the device that compiled it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProgram {
    /// Source expression
    pub expression: String,
    /// Whether the program was optimized
    pub optimize: bool,
    /// Number of BPF instructions
    pub instructions: usize,
    /// Network resolved for the interface; libpcap itself compiles with an unknown netmask
    pub net: NetInfo,
}

/// Outcome of a single poll of the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// This many packets were surfaced to the callback
    Packets(usize),
    /// Nothing was ready
    Idle,
    /// The loop was broken or the source is exhausted
    Interrupted,
}

/// Counters kept by the capture library / kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Packets received by the filter
    pub received: u64,
    /// Packets dropped because the kernel buffer was full
    pub dropped: u64,
    /// Packets dropped by the network interface
    pub if_dropped: u64,
}

/// Opens capture devices and resolves interface properties
pub trait CaptureBackend: Send + Sync + 'static {
    type Device: CaptureDevice;

    /// Open a live capture on `interface`
    fn open(&self, interface: &str, config: &CaptureConfig) -> Result<Self::Device>;

    /// Resolve the IPv4 network and mask of `interface`
    fn lookup_net(&self, interface: &str) -> Result<NetInfo>;
}

/// An open capture device
///
/// Dropping the device closes it.
pub trait CaptureDevice: Send + 'static {
    type Sink: PacketSink;

    /// Switch the device to non-blocking reads
    fn set_nonblocking(&mut self) -> Result<()>;

    /// Compile a filter expression for this device
    fn compile_filter(
        &mut self,
        expression: &str,
        net: &NetInfo,
        optimize: bool,
    ) -> Result<FilterProgram>;

    /// Install a program returned by [`CaptureDevice::compile_filter`]
    fn install_filter(&mut self, program: &FilterProgram) -> Result<()>;

    /// Open a capture file writer matching this device's link type
    fn open_sink(&mut self, path: &Path) -> Result<Self::Sink>;

    /// Handle that interrupts a blocking read from another thread, if supported
    fn interrupt_waker(&mut self) -> Option<Waker> {
        None
    }

    /// Pull up to `max_packets` packets, passing each to `on_packet`.
    ///
    /// The header and bytes are only valid during the callback.
    fn dispatch(
        &mut self,
        max_packets: usize,
        on_packet: &mut dyn FnMut(&PacketHeader, &[u8]),
    ) -> Result<Poll>;

    /// Kernel/library counters for this device
    fn stats(&mut self) -> Result<DeviceStats>;
}

/// Capture file writer
///
/// Dropping the sink closes the file.
pub trait PacketSink: Send + 'static {
    /// Append one packet
    fn write_packet(&mut self, header: &PacketHeader, data: &[u8]);

    /// Flush buffered packets to disk
    fn flush(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_info_from_prefix() {
        let net = NetInfo::from_prefix(Ipv4Addr::new(192, 168, 1, 77), 24);
        assert_eq!(net.network, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(net.mask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(net.to_string(), "192.168.1.0/255.255.255.0");
    }

    #[test]
    fn test_net_info_edge_prefixes() {
        let any = NetInfo::from_prefix(Ipv4Addr::new(10, 1, 2, 3), 0);
        assert_eq!(any, NetInfo::UNKNOWN);

        let host = NetInfo::from_prefix(Ipv4Addr::new(10, 1, 2, 3), 32);
        assert_eq!(host.network, Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(host.mask, Ipv4Addr::BROADCAST);
    }
}
