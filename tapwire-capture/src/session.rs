//! Capture session lifecycle
//!
//! A [`CaptureSession`] binds one interface, optionally installs a filter, and
//! then runs either a file dump or a callback dump until stopped. Callback
//! dumps hand packets from the capture worker to a dispatch worker through a
//! [`BoundedPacketQueue`], so a slow handler loses packets instead of growing
//! memory without bound.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tapwire_core::{CapturedPacket, Error, Result, SessionState};
use tracing::dispatcher::DefaultGuard;
use tracing::{debug, error, info, warn, Dispatch};

use crate::config::{CaptureConfig, CAPTURE_FILE_EXTENSION};
use crate::device::{CaptureBackend, CaptureDevice, DeviceStats};
use crate::pcap_backend::PcapBackend;
use crate::queue::BoundedPacketQueue;
use crate::stats::{CaptureStats, StatsAccumulator};
use crate::worker::{CaptureMode, CaptureWorker, DispatchWorker, LoopInterrupt};

/// A packet capture session on a single interface
pub struct CaptureSession<B: CaptureBackend = PcapBackend> {
    backend: B,
    config: CaptureConfig,
    dispatch: Dispatch,
    state: SessionState,
    interface: String,
    filter: Option<String>,
    device: Option<Arc<Mutex<B::Device>>>,
    queue: Arc<BoundedPacketQueue<CapturedPacket>>,
    stats: StatsAccumulator,
    sequence: Arc<AtomicU64>,
    interrupt: Option<LoopInterrupt>,
    capture_worker: Option<JoinHandle<()>>,
    dispatch_worker: Option<JoinHandle<()>>,
    output_path: Option<PathBuf>,
}

impl CaptureSession<PcapBackend> {
    /// Create a libpcap session with the default configuration
    pub fn new() -> Self {
        Self::with_config(CaptureConfig::default())
    }

    /// Create a libpcap session whose callback queue holds `capacity` packets
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(CaptureConfig::with_queue_capacity(capacity))
    }

    /// Create a libpcap session with custom configuration
    pub fn with_config(config: CaptureConfig) -> Self {
        Self::with_backend(PcapBackend, config)
    }
}

impl Default for CaptureSession<PcapBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: CaptureBackend> CaptureSession<B> {
    /// Create a session that opens devices through `backend`
    pub fn with_backend(backend: B, mut config: CaptureConfig) -> Self {
        config.queue_capacity = crate::config::normalize_capacity(config.queue_capacity);
        let queue = Arc::new(BoundedPacketQueue::new(config.queue_capacity));

        Self {
            backend,
            config,
            dispatch: tracing::dispatcher::get_default(|current| current.clone()),
            state: SessionState::Uninitialized,
            interface: String::new(),
            filter: None,
            device: None,
            queue,
            stats: StatsAccumulator::new(),
            sequence: Arc::new(AtomicU64::new(0)),
            interrupt: None,
            capture_worker: None,
            dispatch_worker: None,
            output_path: None,
        }
    }

    /// Route this session's diagnostics, including its workers', to `dispatch`
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    fn log_scope(&self) -> DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }

    /// Set promiscuous mode for the next `init`
    pub fn set_promiscuous(&mut self, enable: bool) {
        self.config.promiscuous = enable;
        let _log = self.log_scope();
        debug!("Promiscuous mode: {}", enable);
    }

    /// Set snapshot length for the next `init`
    pub fn set_snaplen(&mut self, snaplen: i32) {
        self.config.snaplen = snaplen;
        let _log = self.log_scope();
        debug!("Snapshot length: {}", snaplen);
    }

    /// Set read timeout for the next `init`
    pub fn set_timeout(&mut self, timeout_ms: i32) {
        self.config.timeout_ms = timeout_ms;
        let _log = self.log_scope();
        debug!("Timeout: {}ms", timeout_ms);
    }

    /// Open `interface` and install `filter`, if any.
    ///
    /// An empty filter is the same as no filter. When a step after opening
    /// the device fails, the device stays allocated and the session stays
    /// `Uninitialized`; [`terminate`](Self::terminate) releases it.
    pub fn init(&mut self, interface: &str, filter: Option<&str>) -> Result<()> {
        let _log = self.log_scope();

        if interface.is_empty() {
            return Err(Error::invalid_argument("interface", "must not be empty"));
        }
        if self.device.is_some() {
            return Err(Error::AlreadyInitialized(self.interface.clone()));
        }

        let device = self.backend.open(interface, &self.config).map_err(|e| {
            error!(interface = %interface, error = %e, "Failed to open device");
            e
        })?;

        let device = Arc::new(Mutex::new(device));
        self.device = Some(Arc::clone(&device));
        self.interface = interface.to_string();
        self.filter = filter
            .filter(|expression| !expression.is_empty())
            .map(str::to_string);

        if let Err(e) = self.configure(&mut device.lock()) {
            error!(interface = %interface, error = %e, "Failed to initialize capture");
            return Err(e);
        }

        self.state = SessionState::Initialized;
        info!(
            interface = %interface,
            filter = self.filter.as_deref().unwrap_or(""),
            "Capture session initialized"
        );
        Ok(())
    }

    fn configure(&self, device: &mut B::Device) -> Result<()> {
        if self.config.nonblocking {
            device.set_nonblocking()?;
        }

        let Some(expression) = self.filter.as_deref() else {
            return Ok(());
        };

        let net = self.backend.lookup_net(&self.interface)?;
        let program = device.compile_filter(expression, &net, self.config.optimize_filter)?;
        device.install_filter(&program)?;

        debug!(
            filter = %expression,
            net = %net,
            instructions = program.instructions,
            "Filter installed"
        );
        Ok(())
    }

    /// The device handle, if the session is ready to start a capture
    fn ready_device(&self) -> Result<Arc<Mutex<B::Device>>> {
        if self.state == SessionState::Capturing {
            return Err(Error::AlreadyCapturing);
        }
        match &self.device {
            Some(device) if self.state.is_start_ready() => Ok(Arc::clone(device)),
            _ => Err(Error::NotInitialized),
        }
    }

    /// Write captured packets to `path` with the `.pcap` extension appended
    pub fn start_file_dump(&mut self, path: &str) -> Result<()> {
        let _log = self.log_scope();

        if path.is_empty() {
            return Err(Error::invalid_argument("path", "must not be empty"));
        }
        let device = self.ready_device()?;

        let output = PathBuf::from(format!("{}.{}", path, CAPTURE_FILE_EXTENSION));
        let (sink, waker) = {
            let mut device = device.lock();
            let sink = device.open_sink(&output).map_err(|e| {
                error!(path = %output.display(), error = %e, "Failed to open capture file");
                e
            })?;
            (sink, device.interrupt_waker())
        };

        let interrupt = LoopInterrupt::new(waker);
        let worker = CaptureWorker {
            interface: self.interface.clone(),
            device,
            mode: CaptureMode::File(sink),
            interrupt: interrupt.clone(),
            stats: self.stats.clone(),
            sequence: Arc::clone(&self.sequence),
            poll_batch: self.config.poll_batch,
            idle_backoff: self.config.idle_backoff,
        };
        self.capture_worker = Some(worker.spawn(self.dispatch.clone())?);
        self.interrupt = Some(interrupt);
        self.state = SessionState::Capturing;

        info!(
            interface = %self.interface,
            path = %output.display(),
            "Started file dump"
        );
        self.output_path = Some(output);
        Ok(())
    }

    /// Deliver each captured packet to `handler` on a dispatch thread
    ///
    /// Packets arriving while the queue is full are dropped and counted.
    pub fn start_callback_dump<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnMut(CapturedPacket) + Send + 'static,
    {
        let _log = self.log_scope();
        let device = self.ready_device()?;
        let waker = device.lock().interrupt_waker();

        self.queue.reopen();
        let dispatcher = DispatchWorker {
            queue: Arc::clone(&self.queue),
            handler,
            stats: self.stats.clone(),
        }
        .spawn(&self.interface, self.dispatch.clone())?;

        let interrupt = LoopInterrupt::new(waker);
        let worker = CaptureWorker {
            interface: self.interface.clone(),
            device,
            mode: CaptureMode::Queue(Arc::clone(&self.queue)),
            interrupt: interrupt.clone(),
            stats: self.stats.clone(),
            sequence: Arc::clone(&self.sequence),
            poll_batch: self.config.poll_batch,
            idle_backoff: self.config.idle_backoff,
        };
        let capture = match worker.spawn(self.dispatch.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                self.queue.close();
                if dispatcher.join().is_err() {
                    error!("Packet handler panicked");
                }
                return Err(e);
            }
        };

        self.capture_worker = Some(capture);
        self.dispatch_worker = Some(dispatcher);
        self.interrupt = Some(interrupt);
        self.state = SessionState::Capturing;

        info!(
            interface = %self.interface,
            capacity = self.queue.capacity(),
            "Started callback dump"
        );
        Ok(())
    }

    /// Stop the running capture, if any.
    ///
    /// Blocks until the capture worker has exited and every packet queued
    /// before the call has been delivered to the handler. After a handler
    /// panic the remaining packets are counted as discarded instead.
    pub fn stop(&mut self) {
        let _log = self.log_scope();

        if self.state != SessionState::Capturing {
            return;
        }
        info!("Stopping packet capture on {}", self.interface);

        if let Some(interrupt) = self.interrupt.take() {
            interrupt.trigger();
        }
        if let Some(worker) = self.capture_worker.take() {
            if worker.join().is_err() {
                error!(interface = %self.interface, "Capture worker panicked");
            }
        }

        self.queue.close();
        if let Some(worker) = self.dispatch_worker.take() {
            if worker.join().is_err() {
                error!(interface = %self.interface, "Dispatch worker panicked");
            }
        }

        let leftovers = self.queue.clear();
        if leftovers > 0 {
            warn!(count = leftovers, "Discarded undelivered packets");
            self.stats.record_discarded(leftovers as u64);
        }

        self.state = SessionState::Stopped;
        let stats = self.stats.snapshot();
        info!(
            interface = %self.interface,
            received = stats.packets_received,
            delivered = stats.packets_delivered,
            written = stats.packets_written,
            dropped = stats.packets_dropped,
            "Capture stopped"
        );
    }

    /// Stop any capture and release the device
    pub fn terminate(&mut self) {
        let _log = self.log_scope();
        self.stop();

        if let Some(device) = self.device.take() {
            drop(device);
            debug!("Released device {}", self.interface);
        }
        if self.state != SessionState::Terminated {
            info!(interface = %self.interface, "Capture session terminated");
        }
        self.state = SessionState::Terminated;
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Interface bound by the last `init`
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Filter installed by the last `init`
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn is_capturing(&self) -> bool {
        self.state == SessionState::Capturing
    }

    /// Packets waiting for the handler
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Pipeline counters accumulated over the session's lifetime
    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }

    /// Counters kept by the capture library for the open device
    pub fn device_stats(&self) -> Result<DeviceStats> {
        let device = self.device.as_ref().ok_or(Error::NotInitialized)?;
        let stats = device.lock().stats()?;
        Ok(stats)
    }

    /// Capture file of the running or most recent file dump
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.terminate();
    }
}
