//! Example: Filtered capture to a file
//!
//! Writes DNS traffic seen on the default interface to `dns.pcap` for five
//! seconds.
//! Note: Requires root/administrator privileges to run.
//!
//! Run with: sudo cargo run --example file_capture

use std::thread;
use std::time::Duration;
use tapwire_capture::{default_interface, CaptureSession};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let iface = default_interface()?;
    let filter = "udp port 53";
    println!("Capturing on: {} with filter '{}'", iface.name, filter);

    let mut session = CaptureSession::new();
    if let Err(e) = session.init(&iface.name, Some(filter)) {
        // The device may already be open even though init failed
        session.terminate();
        return Err(e.into());
    }

    session.start_file_dump("dns")?;
    thread::sleep(Duration::from_secs(5));
    session.stop();

    if let Some(path) = session.output_path() {
        println!("Wrote {}", path.display());
    }

    let stats = session.stats();
    match session.device_stats() {
        Ok(device) => println!("{}", stats.with_device_stats(device).format()),
        Err(_) => println!("{}", stats.format()),
    }

    session.terminate();
    Ok(())
}
