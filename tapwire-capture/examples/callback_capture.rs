//! Example: Callback packet capture
//!
//! Delivers packets from the default interface to a closure running on the
//! dispatch thread.
//! Note: Requires root/administrator privileges to run.
//!
//! Run with: sudo cargo run --example callback_capture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tapwire_capture::{default_interface, CaptureSession};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let iface = default_interface()?;
    println!("Capturing on: {} ({})", iface.name, iface.description);

    let mut session = CaptureSession::with_capacity(256);
    session.init(&iface.name, None)?;

    println!("Starting packet capture... (will capture 20 packets)");
    println!();

    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();

    session.start_callback_dump(move |packet| {
        c.fetch_add(1, Ordering::SeqCst);
        println!(
            "[{}] {} captured {} of {} bytes",
            packet.sequence, packet.timestamp, packet.capture_length, packet.original_length
        );
    })?;

    // Capture for 10 seconds or 20 packets
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(10) && count.load(Ordering::SeqCst) < 20 {
        thread::sleep(Duration::from_millis(100));
    }

    session.stop();

    println!("\n=== Final Statistics ===");
    println!("{}", session.stats().format());

    session.terminate();
    Ok(())
}
