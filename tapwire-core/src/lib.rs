//! tapwire core library
//!
//! This crate provides the fundamental types and error handling shared by
//! the tapwire capture pipeline and its command-line front end.

pub mod error;
pub mod packet;
pub mod state;

// Re-export commonly used types
pub use error::{Error, Result};
pub use packet::{CapturedPacket, PacketHeader, Timestamp};
pub use state::SessionState;
