//! Capture and dispatch worker threads

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tapwire_core::{CapturedPacket, PacketHeader, Result};
use tracing::{debug, error, info, trace, warn, Dispatch};

use crate::device::{CaptureDevice, PacketSink, Poll, Waker};
use crate::queue::{BoundedPacketQueue, Push};
use crate::stats::StatsAccumulator;

/// Request to leave the capture loop, observable from the worker thread
#[derive(Clone)]
pub struct LoopInterrupt {
    requested: Arc<AtomicBool>,
    waker: Option<Waker>,
}

impl LoopInterrupt {
    pub fn new(waker: Option<Waker>) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    /// Set the flag and break a blocked read
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(wake) = &self.waker {
            wake();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Where the capture worker sends surfaced packets
pub(crate) enum CaptureMode<S> {
    File(S),
    Queue(Arc<BoundedPacketQueue<CapturedPacket>>),
}

impl<S: PacketSink> CaptureMode<S> {
    fn name(&self) -> &'static str {
        match self {
            CaptureMode::File(_) => "file",
            CaptureMode::Queue(_) => "callback",
        }
    }

    fn handle(
        &mut self,
        header: &PacketHeader,
        data: &[u8],
        stats: &StatsAccumulator,
        sequence: &AtomicU64,
    ) {
        stats.record_packet(header.caplen as usize);

        match self {
            CaptureMode::File(sink) => {
                sink.write_packet(header, data);
                stats.record_written();
            }
            CaptureMode::Queue(queue) => {
                let sequence = sequence.fetch_add(1, Ordering::Relaxed);
                let packet = match CapturedPacket::copy_from(sequence, header, data) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!(sequence, error = %e, "Skipping packet");
                        stats.record_copy_failure();
                        return;
                    }
                };

                match queue.push(packet) {
                    Push::Queued => stats.record_queued(),
                    Push::Dropped => {
                        trace!(sequence, "Queue full, packet dropped");
                        stats.record_drops(1);
                    }
                    Push::Closed => {
                        trace!(sequence, "Queue closed, packet dropped");
                        stats.record_drops(1);
                    }
                }
            }
        }
    }

    fn finish(self, interface: &str) {
        if let CaptureMode::File(mut sink) = self {
            if let Err(e) = sink.flush() {
                error!(interface = %interface, error = %e, "Failed to flush capture file");
            }
            debug!(interface = %interface, "Capture file closed");
        }
    }
}

/// Pulls packets from the device until interrupted
pub(crate) struct CaptureWorker<D: CaptureDevice> {
    pub(crate) interface: String,
    pub(crate) device: Arc<Mutex<D>>,
    pub(crate) mode: CaptureMode<D::Sink>,
    pub(crate) interrupt: LoopInterrupt,
    pub(crate) stats: StatsAccumulator,
    pub(crate) sequence: Arc<AtomicU64>,
    pub(crate) poll_batch: usize,
    pub(crate) idle_backoff: Duration,
}

impl<D: CaptureDevice> CaptureWorker<D> {
    pub(crate) fn spawn(self, dispatch: Dispatch) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(format!("tapwire-capture-{}", self.interface))
            .spawn(move || {
                let _log = tracing::dispatcher::set_default(&dispatch);
                self.run();
            })?;
        Ok(handle)
    }

    fn run(self) {
        let CaptureWorker {
            interface,
            device,
            mut mode,
            interrupt,
            stats,
            sequence,
            poll_batch,
            idle_backoff,
        } = self;

        info!(interface = %interface, mode = mode.name(), "Capture worker started");
        let mut surfaced: u64 = 0;
        // libpcap keeps a break request that arrived after the previous run's last read
        let mut stale_break = false;

        while !interrupt.is_triggered() {
            let poll = device.lock().dispatch(
                poll_batch,
                &mut |header: &PacketHeader, data: &[u8]| {
                    mode.handle(header, data, &stats, &sequence)
                },
            );

            match poll {
                Ok(Poll::Packets(count)) => {
                    surfaced += count as u64;
                    stale_break = false;
                }
                Ok(Poll::Idle) => {
                    stale_break = false;
                    thread::sleep(idle_backoff);
                }
                Ok(Poll::Interrupted) if !interrupt.is_triggered() && !stale_break => {
                    debug!(interface = %interface, "Ignoring stale loop break");
                    stale_break = true;
                }
                Ok(Poll::Interrupted) => {
                    debug!(interface = %interface, "Capture loop broken");
                    break;
                }
                Err(e) if interrupt.is_triggered() => {
                    debug!(interface = %interface, error = %e, "Capture loop ended during stop");
                    break;
                }
                Err(e) => {
                    error!(interface = %interface, error = %e, "Capture loop failed");
                    break;
                }
            }
        }

        mode.finish(&interface);
        info!(interface = %interface, packets = surfaced, "Capture worker finished");
    }
}

/// Delivers queued packets to the handler until the queue is closed and empty
pub(crate) struct DispatchWorker<H> {
    pub(crate) queue: Arc<BoundedPacketQueue<CapturedPacket>>,
    pub(crate) handler: H,
    pub(crate) stats: StatsAccumulator,
}

impl<H> DispatchWorker<H>
where
    H: FnMut(CapturedPacket) + Send + 'static,
{
    pub(crate) fn spawn(self, interface: &str, dispatch: Dispatch) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(format!("tapwire-dispatch-{}", interface))
            .spawn(move || {
                let _log = tracing::dispatcher::set_default(&dispatch);
                self.run();
            })?;
        Ok(handle)
    }

    fn run(mut self) {
        debug!("Dispatch worker started");
        let mut delivered: u64 = 0;

        while let Some(batch) = self.queue.wait_drain() {
            let mut batch = batch.into_iter();
            while let Some(packet) = batch.next() {
                let sequence = packet.sequence;
                let handler = &mut self.handler;
                if panic::catch_unwind(AssertUnwindSafe(move || handler(packet))).is_err() {
                    // The failed packet and the rest of its batch never reach the handler
                    let unhandled = batch.len() as u64 + 1;
                    self.abandon(sequence, unhandled);
                    return;
                }
                self.stats.record_delivered();
                delivered += 1;
            }
        }

        debug!(delivered, "Dispatch worker finished");
    }

    /// Stop accepting packets after a handler panic and count what is left
    fn abandon(&self, sequence: u64, unhandled: u64) {
        self.queue.close();
        let leftovers = self.queue.clear() as u64;
        self.stats.record_discarded(unhandled + leftovers);
        error!(
            sequence,
            discarded = unhandled + leftovers,
            "Packet handler panicked, dispatch stopped"
        );
    }
}
