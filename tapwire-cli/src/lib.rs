//! CLI interface for tapwire
//!
//! This crate provides the command-line front end: argument parsing, the
//! capture run loop and a cancellable timer used to end timed captures.

pub mod args;
pub mod run;
pub mod schedule;

pub use args::Cli;
pub use run::{packet_line, print_interfaces, run};
pub use schedule::{CancellationToken, Timer};
