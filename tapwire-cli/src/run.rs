//! Capture run loop for the `tapwire` binary

use std::io::{self, Write};

use anyhow::{Context, Result};
use tapwire_capture::{list_interfaces, CaptureSession, CaptureStats};
use tapwire_core::CapturedPacket;
use tracing::info;

use crate::args::Cli;
use crate::schedule::{CancellationToken, Timer};

/// One console line summarizing a packet
pub fn packet_line(packet: &CapturedPacket) -> String {
    let mut line = format!(
        "{:>8} {} {} bytes",
        packet.sequence, packet.timestamp, packet.original_length
    );
    if packet.is_truncated() {
        line.push_str(&format!(" (captured {})", packet.capture_length));
    }
    line
}

/// Print every interface with its addresses
pub fn print_interfaces() -> Result<()> {
    let interfaces = list_interfaces().context("failed to list interfaces")?;
    let mut out = io::stdout().lock();

    for iface in &interfaces {
        let mut flags = Vec::new();
        if iface.is_up {
            flags.push("up");
        }
        if iface.is_loopback {
            flags.push("loopback");
        }
        writeln!(out, "{} [{}]", iface.name, flags.join(","))?;

        for addr in &iface.addresses {
            writeln!(out, "    {}/{}", addr.ip, addr.prefix)?;
        }
    }
    Ok(())
}

/// Capture until the configured duration elapses or Ctrl-C is pressed
pub fn run(cli: &Cli) -> Result<CaptureStats> {
    let interface = cli
        .interface
        .as_deref()
        .context("no capture interface given")?;

    let mut session = CaptureSession::with_config(cli.capture_config());
    session
        .init(interface, cli.filter.as_deref())
        .with_context(|| format!("failed to initialize capture on {}", interface))?;

    match &cli.output {
        Some(base) => session
            .start_file_dump(base)
            .with_context(|| format!("failed to start file dump to {}", base))?,
        None => session
            .start_callback_dump(|packet| {
                let _ = writeln!(io::stdout().lock(), "{}", packet_line(&packet));
            })
            .context("failed to start capture")?,
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.cancel())
            .context("failed to install Ctrl-C handler")?;
    }

    let timer = Timer::new();
    if let Some(duration) = cli.duration() {
        let shutdown = shutdown.clone();
        timer.set_timeout(move || shutdown.cancel(), duration);
        info!("Capturing on {} for {}s", interface, duration.as_secs());
    } else {
        info!("Capturing on {} until interrupted", interface);
    }

    shutdown.wait();
    timer.stop();
    session.stop();

    let mut stats = session.stats();
    if let Ok(device) = session.device_stats() {
        stats = stats.with_device_stats(device);
    }
    if let Some(path) = session.output_path() {
        info!(path = %path.display(), "Capture file written");
    }

    session.terminate();
    Ok(stats)
}
