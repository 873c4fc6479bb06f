//! Scripted capture backend for exercising the pipeline without privileges

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pcap::Linktype;
use tapwire_core::{Error, PacketHeader, Result, Timestamp};

use crate::config::CaptureConfig;
use crate::device::{
    CaptureBackend, CaptureDevice, DeviceStats, FilterProgram, NetInfo, Poll, Waker,
};
use crate::pcap_backend::PcapSink;

pub(crate) const PACKET_LEN: usize = 60;

#[derive(Default)]
pub(crate) struct Script {
    pending: Mutex<VecDeque<(PacketHeader, Vec<u8>)>>,
    generated: AtomicU64,
    surfaced: AtomicU64,
    endless: AtomicBool,
    fail_open: AtomicBool,
    fail_lookup: AtomicBool,
    fail_install: AtomicBool,
    fail_sink: AtomicBool,
    pub(crate) opened: AtomicUsize,
    pub(crate) closed: AtomicUsize,
    pub(crate) nonblocking: AtomicBool,
    pub(crate) wakeups: AtomicUsize,
    pub(crate) installed: Mutex<Option<FilterProgram>>,
}

impl Script {
    fn next_packet(&self) -> (PacketHeader, Vec<u8>) {
        let n = self.generated.fetch_add(1, Ordering::SeqCst);
        let header = PacketHeader::new(
            Timestamp::new(1_000 + (n / 1000) as i64, ((n % 1000) * 1000) as i64),
            PACKET_LEN as u32,
            PACKET_LEN as u32,
        );
        let mut data = vec![0u8; PACKET_LEN];
        data[..8].copy_from_slice(&n.to_be_bytes());
        (header, data)
    }
}

/// Backend whose devices surface packets fed by the test
#[derive(Clone, Default)]
pub(crate) struct ScriptedBackend {
    pub(crate) script: Arc<Script>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Devices generate packets whenever polled
    pub(crate) fn endless(self) -> Self {
        self.script.endless.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_open(self) -> Self {
        self.script.fail_open.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_lookup(self) -> Self {
        self.script.fail_lookup.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_install(self) -> Self {
        self.script.fail_install.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_sink(&self, fail: bool) {
        self.script.fail_sink.store(fail, Ordering::SeqCst);
    }

    /// Queue `count` well-formed packets for the device to surface
    pub(crate) fn feed(&self, count: usize) {
        let mut pending = self.script.pending.lock();
        for _ in 0..count {
            pending.push_back(self.script.next_packet());
        }
    }

    /// Queue a packet whose header claims more bytes than the buffer holds
    pub(crate) fn feed_corrupt(&self) {
        let (mut header, data) = self.script.next_packet();
        header.caplen = (PACKET_LEN * 2) as u32;
        self.script.pending.lock().push_back((header, data));
    }

    pub(crate) fn pending(&self) -> usize {
        self.script.pending.lock().len()
    }

    pub(crate) fn surfaced(&self) -> u64 {
        self.script.surfaced.load(Ordering::SeqCst)
    }

    pub(crate) fn open_devices(&self) -> usize {
        self.script.opened.load(Ordering::SeqCst) - self.script.closed.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for ScriptedBackend {
    type Device = ScriptedDevice;

    fn open(&self, interface: &str, _config: &CaptureConfig) -> Result<ScriptedDevice> {
        if self.script.fail_open.load(Ordering::SeqCst) {
            return Err(Error::DeviceOpen(format!("{}: no such device", interface)));
        }
        self.script.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedDevice {
            script: Arc::clone(&self.script),
        })
    }

    fn lookup_net(&self, interface: &str) -> Result<NetInfo> {
        if self.script.fail_lookup.load(Ordering::SeqCst) {
            return Err(Error::DeviceLookup(format!(
                "{}: no IPv4 address assigned",
                interface
            )));
        }
        Ok(NetInfo::from_prefix(Ipv4Addr::new(10, 0, 0, 1), 8))
    }
}

pub(crate) struct ScriptedDevice {
    script: Arc<Script>,
}

impl CaptureDevice for ScriptedDevice {
    type Sink = PcapSink;

    fn set_nonblocking(&mut self) -> Result<()> {
        self.script.nonblocking.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn compile_filter(
        &mut self,
        expression: &str,
        net: &NetInfo,
        optimize: bool,
    ) -> Result<FilterProgram> {
        if expression.contains("invalid") {
            return Err(Error::filter_compile(expression, "syntax error"));
        }
        Ok(FilterProgram {
            expression: expression.to_string(),
            optimize,
            instructions: expression.split_whitespace().count(),
            net: *net,
        })
    }

    fn install_filter(&mut self, program: &FilterProgram) -> Result<()> {
        if self.script.fail_install.load(Ordering::SeqCst) {
            return Err(Error::filter_install(
                program.expression.as_str(),
                "device rejected program",
            ));
        }
        *self.script.installed.lock() = Some(program.clone());
        Ok(())
    }

    fn open_sink(&mut self, path: &Path) -> Result<PcapSink> {
        if self.script.fail_sink.load(Ordering::SeqCst) {
            return Err(Error::sink_open(
                path.display().to_string(),
                "permission denied".to_string(),
            ));
        }
        PcapSink::create(Linktype::ETHERNET, path)
    }

    fn interrupt_waker(&mut self) -> Option<Waker> {
        let script = Arc::clone(&self.script);
        Some(Arc::new(move || {
            script.wakeups.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn dispatch(
        &mut self,
        max_packets: usize,
        on_packet: &mut dyn FnMut(&PacketHeader, &[u8]),
    ) -> Result<Poll> {
        let mut surfaced = 0;
        while surfaced < max_packets {
            let next = self.script.pending.lock().pop_front();
            let (header, data) = match next {
                Some(packet) => packet,
                None if self.script.endless.load(Ordering::SeqCst) => self.script.next_packet(),
                None => break,
            };
            on_packet(&header, &data);
            surfaced += 1;
        }

        self.script
            .surfaced
            .fetch_add(surfaced as u64, Ordering::SeqCst);
        if surfaced == 0 {
            Ok(Poll::Idle)
        } else {
            Ok(Poll::Packets(surfaced))
        }
    }

    fn stats(&mut self) -> Result<DeviceStats> {
        Ok(DeviceStats {
            received: self.script.surfaced.load(Ordering::SeqCst),
            dropped: 0,
            if_dropped: 0,
        })
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
