//! CLI argument parsing
//!
//! Every option can also be supplied through a `TAPWIRE_*` environment variable.

use std::time::Duration;

use clap::Parser;
use tapwire_capture::{CaptureConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_SNAPLEN};

#[derive(Parser, Debug)]
#[command(name = "tapwire")]
#[command(version, about = "Capture packets to a pcap file or stream them to the console", long_about = None)]
pub struct Cli {
    /// Network interface to capture on
    #[arg(
        short = 'i',
        long,
        env = "TAPWIRE_INTERFACE",
        required_unless_present = "list_interfaces"
    )]
    pub interface: Option<String>,

    /// BPF filter expression
    #[arg(short = 'f', long, env = "TAPWIRE_FILTER", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Write packets to <BASE>.pcap instead of printing them
    #[arg(short = 'o', long, env = "TAPWIRE_OUTPUT", value_name = "BASE")]
    pub output: Option<String>,

    /// Stop after this many seconds (0 = until Ctrl-C)
    #[arg(
        short = 'd',
        long,
        env = "TAPWIRE_DURATION",
        value_name = "SECONDS",
        default_value_t = 0
    )]
    pub duration: u64,

    /// Packets buffered for the console printer before new ones are dropped
    #[arg(short = 'c', long, env = "TAPWIRE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub capacity: usize,

    /// Maximum bytes captured per packet
    #[arg(short = 's', long, env = "TAPWIRE_SNAPLEN", default_value_t = DEFAULT_SNAPLEN)]
    pub snaplen: i32,

    /// Enable promiscuous mode
    #[arg(short = 'p', long, env = "TAPWIRE_PROMISC")]
    pub promiscuous: bool,

    /// List available network interfaces and exit
    #[arg(short = 'l', long)]
    pub list_interfaces: bool,

    /// Verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Capture configuration selected by the arguments
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            snaplen: self.snaplen,
            promiscuous: self.promiscuous,
            ..CaptureConfig::with_queue_capacity(self.capacity)
        }
    }

    /// How long to capture, `None` meaning until interrupted
    pub fn duration(&self) -> Option<Duration> {
        (self.duration > 0).then(|| Duration::from_secs(self.duration))
    }

    /// Default log filter for the verbosity level
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
