//! libpcap implementation of the device bindings

use std::path::Path;
use std::sync::Arc;

use pcap::{Activated, Active, Capture, Device, Linktype, Packet, Savefile};
use tapwire_core::{Error, PacketHeader, Result, Timestamp};
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::device::{
    CaptureBackend, CaptureDevice, DeviceStats, FilterProgram, NetInfo, PacketSink, Poll, Waker,
};
use crate::interface;

/// Opens live captures through libpcap
#[derive(Debug, Clone, Copy, Default)]
pub struct PcapBackend;

impl CaptureBackend for PcapBackend {
    type Device = PcapDevice;

    fn open(&self, interface: &str, config: &CaptureConfig) -> Result<PcapDevice> {
        debug!(interface = %interface, "Opening pcap capture");

        let mut capture = Capture::from_device(interface)
            .map_err(|e| Error::DeviceOpen(format!("{}: {}", interface, e)))?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .immediate_mode(config.immediate_mode);

        if config.buffer_size > 0 {
            capture = capture.buffer_size(config.buffer_size);
        }

        let capture = capture
            .open()
            .map_err(|e| Error::DeviceOpen(format!("{}: {}", interface, e)))?;

        info!(
            interface = %interface,
            snaplen = config.snaplen,
            promiscuous = config.promiscuous,
            "Capture opened"
        );

        Ok(PcapDevice {
            interface: interface.to_string(),
            capture: Some(capture),
        })
    }

    fn lookup_net(&self, interface: &str) -> Result<NetInfo> {
        match interface::lookup_net(interface) {
            Err(Error::DeviceLookup(reason)) if pcap_knows(interface) => {
                debug!(interface = %interface, reason = %reason, "Device has no listed address");
                Ok(NetInfo::UNKNOWN)
            }
            result => result,
        }
    }
}

/// Whether libpcap lists the device, including pseudo-devices the OS does not
fn pcap_knows(interface: &str) -> bool {
    Device::list()
        .map(|devices| devices.iter().any(|device| device.name == interface))
        .unwrap_or(false)
}

/// Compile `expression` on `capture` and describe the result.
///
/// The `pcap` crate compiles with `PCAP_NETMASK_UNKNOWN`, so `net` does not
/// change the generated code. It is recorded on the program for diagnostics.
/// Expressions relying on the netmask (`ip broadcast`) fail to compile.
fn compile_program<T: Activated + ?Sized>(
    capture: &mut Capture<T>,
    expression: &str,
    net: &NetInfo,
    optimize: bool,
) -> Result<FilterProgram> {
    let program = capture
        .compile(expression, optimize)
        .map_err(|e| Error::filter_compile(expression.to_string(), e.to_string()))?;

    Ok(FilterProgram {
        expression: expression.to_string(),
        optimize,
        instructions: program.get_instructions().len(),
        net: *net,
    })
}

/// A live libpcap capture handle
pub struct PcapDevice {
    interface: String,
    // Only `None` after a failed switch to non-blocking mode consumed the handle.
    capture: Option<Capture<Active>>,
}

impl PcapDevice {
    fn capture(&mut self) -> Result<&mut Capture<Active>> {
        self.capture
            .as_mut()
            .ok_or_else(|| Error::capture(format!("{}: capture handle lost", self.interface)))
    }

    /// Link type of the capture
    pub fn datalink(&mut self) -> Result<Linktype> {
        Ok(self.capture()?.get_datalink())
    }
}

impl CaptureDevice for PcapDevice {
    type Sink = PcapSink;

    fn set_nonblocking(&mut self) -> Result<()> {
        let capture = self
            .capture
            .take()
            .ok_or_else(|| Error::DeviceOpen(format!("{}: capture handle lost", self.interface)))?;
        let capture = capture
            .setnonblock()
            .map_err(|e| Error::DeviceOpen(format!("{}: setnonblock: {}", self.interface, e)))?;
        self.capture = Some(capture);
        Ok(())
    }

    fn compile_filter(
        &mut self,
        expression: &str,
        net: &NetInfo,
        optimize: bool,
    ) -> Result<FilterProgram> {
        compile_program(self.capture()?, expression, net, optimize)
    }

    fn install_filter(&mut self, program: &FilterProgram) -> Result<()> {
        // `Capture::filter` compiles again; the crate cannot install a `BpfProgram`
        self.capture()?
            .filter(&program.expression, program.optimize)
            .map_err(|e| Error::filter_install(program.expression.clone(), e.to_string()))
    }

    fn open_sink(&mut self, path: &Path) -> Result<PcapSink> {
        let savefile = self
            .capture()?
            .savefile(path)
            .map_err(|e| Error::sink_open(path.display().to_string(), e.to_string()))?;
        Ok(PcapSink { savefile })
    }

    fn interrupt_waker(&mut self) -> Option<Waker> {
        let handle = self.capture.as_mut()?.breakloop_handle();
        Some(Arc::new(move || handle.breakloop()))
    }

    fn dispatch(
        &mut self,
        max_packets: usize,
        on_packet: &mut dyn FnMut(&PacketHeader, &[u8]),
    ) -> Result<Poll> {
        let capture = self.capture()?;
        let mut surfaced = 0;

        while surfaced < max_packets.max(1) {
            match capture.next_packet() {
                Ok(packet) => {
                    let ts = packet.header.ts;
                    let header = PacketHeader::new(
                        Timestamp::new(ts.tv_sec as i64, ts.tv_usec as i64),
                        packet.header.caplen,
                        packet.header.len,
                    );
                    on_packet(&header, packet.data);
                    surfaced += 1;
                }
                Err(pcap::Error::TimeoutExpired) => break,
                Err(pcap::Error::NoMorePackets) if surfaced == 0 => return Ok(Poll::Interrupted),
                Err(pcap::Error::NoMorePackets) => break,
                Err(e) => return Err(Error::capture(e.to_string())),
            }
        }

        if surfaced == 0 {
            Ok(Poll::Idle)
        } else {
            Ok(Poll::Packets(surfaced))
        }
    }

    fn stats(&mut self) -> Result<DeviceStats> {
        let stats = self
            .capture()?
            .stats()
            .map_err(|e| Error::capture(format!("Failed to get stats: {}", e)))?;
        Ok(DeviceStats {
            received: u64::from(stats.received),
            dropped: u64::from(stats.dropped),
            if_dropped: u64::from(stats.if_dropped),
        })
    }
}

/// libpcap capture file writer
pub struct PcapSink {
    savefile: Savefile,
}

impl PcapSink {
    /// Open a standalone capture file for the given link type
    pub fn create(linktype: Linktype, path: &Path) -> Result<Self> {
        let savefile = Capture::dead(linktype)
            .and_then(|capture| capture.savefile(path))
            .map_err(|e| Error::sink_open(path.display().to_string(), e.to_string()))?;
        Ok(Self { savefile })
    }
}

impl PacketSink for PcapSink {
    fn write_packet(&mut self, header: &PacketHeader, data: &[u8]) {
        let raw = pcap::PacketHeader {
            ts: libc::timeval {
                tv_sec: header.timestamp.seconds as _,
                tv_usec: header.timestamp.micros as _,
            },
            caplen: header.caplen,
            len: header.len,
        };
        self.savefile.write(&Packet::new(&raw, data));
    }

    fn flush(&mut self) -> Result<()> {
        self.savefile
            .flush()
            .map_err(|e| Error::capture(format!("Failed to flush capture file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    #[test]
    fn test_sink_writes_capture_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sink.pcap");

        let mut sink = PcapSink::create(Linktype::ETHERNET, &path).unwrap();
        let header = PacketHeader::new(Timestamp::new(1_700_000_000, 42), 4, 4);
        sink.write_packet(&header, &[0xde, 0xad, 0xbe, 0xef]);
        sink.flush().unwrap();
        drop(sink);

        // 24-byte global header + 16-byte record header + payload
        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size, 24 + 16 + 4);
    }

    #[test]
    fn test_sink_open_failure() {
        let result = PcapSink::create(Linktype::ETHERNET, Path::new("/nonexistent/dir/out.pcap"));
        assert!(matches!(result, Err(Error::SinkOpen { .. })));
    }

    #[test]
    fn test_compile_program_records_net() {
        let mut capture = Capture::dead(Linktype::ETHERNET).unwrap();
        let net = NetInfo::from_prefix(Ipv4Addr::new(192, 168, 7, 20), 24);

        let program = compile_program(&mut capture, "udp port 53", &net, true).unwrap();
        assert_eq!(program.expression, "udp port 53");
        assert!(program.optimize);
        assert!(program.instructions > 0);
        assert_eq!(program.net, net);

        let unknown = compile_program(&mut capture, "tcp", &NetInfo::UNKNOWN, false).unwrap();
        assert_eq!(unknown.net, NetInfo::UNKNOWN);
    }

    #[test]
    fn test_compile_program_rejects_bad_syntax() {
        let mut capture = Capture::dead(Linktype::ETHERNET).unwrap();
        let net = NetInfo::from_prefix(Ipv4Addr::new(10, 0, 0, 1), 8);
        let result = compile_program(&mut capture, "invalid filter syntax !!!", &net, true);
        assert!(matches!(result, Err(Error::FilterCompile { .. })));
    }

    #[test]
    fn test_lookup_net_pseudo_device() {
        assert_eq!(PcapBackend.lookup_net("any").unwrap(), NetInfo::UNKNOWN);
        let missing = PcapBackend.lookup_net("nonexistent_interface_xyz");
        assert!(matches!(missing, Err(Error::DeviceLookup(_))));
    }

    #[test]
    fn test_open_nonexistent_device() {
        let result = PcapBackend.open("nonexistent_interface_xyz", &CaptureConfig::default());
        assert!(matches!(result, Err(Error::DeviceOpen(_))));
    }

    #[test]
    fn test_open_loopback() {
        let result = PcapBackend
            .open("lo", &CaptureConfig::default())
            .or_else(|_| PcapBackend.open("lo0", &CaptureConfig::default()));

        // This might fail if not running with permissions
        match result {
            Ok(mut device) => {
                assert!(device.set_nonblocking().is_ok());
                assert!(device.datalink().is_ok());
                let result = device.compile_filter("invalid filter syntax !!!", &NetInfo::UNKNOWN, true);
                assert!(matches!(result, Err(Error::FilterCompile { .. })));
            }
            Err(e) => {
                println!("Could not open loopback (may need privileges): {}", e);
            }
        }
    }
}
