//! Error types for tapwire

use thiserror::Error;

/// Result type alias for tapwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tapwire
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid argument passed to a session operation
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// The session already holds a device handle
    #[error("Session is already initialized on '{0}'")]
    AlreadyInitialized(String),

    /// The session has no usable device handle
    #[error("Session is not initialized")]
    NotInitialized,

    /// A file dump or callback dump is already running
    #[error("Capture is already running")]
    AlreadyCapturing,

    /// Opening or configuring the capture device failed
    #[error("Failed to open device: {0}")]
    DeviceOpen(String),

    /// Looking up the network/mask of an interface failed
    #[error("Failed to look up device: {0}")]
    DeviceLookup(String),

    /// Filter expression could not be compiled
    #[error("Failed to compile filter '{filter}': {reason}")]
    FilterCompile { filter: String, reason: String },

    /// Compiled filter could not be installed on the device
    #[error("Failed to install filter '{filter}': {reason}")]
    FilterInstall { filter: String, reason: String },

    /// Capture file could not be opened
    #[error("Failed to open capture file '{path}': {reason}")]
    SinkOpen { path: String, reason: String },

    /// A single packet could not be copied out of the capture buffer
    #[error("Packet allocation failure: {0}")]
    PacketAllocation(String),

    /// Interface not found
    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    /// Capture error
    #[error("Packet capture error: {0}")]
    Capture(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(name: S, reason: S) -> Self {
        Error::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a capture error with a custom message
    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Error::Capture(msg.into())
    }

    /// Create a filter compile error
    pub fn filter_compile<S: Into<String>>(filter: S, reason: S) -> Self {
        Error::FilterCompile {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    /// Create a filter install error
    pub fn filter_install<S: Into<String>>(filter: S, reason: S) -> Self {
        Error::FilterInstall {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    /// Create a sink open error
    pub fn sink_open<S: Into<String>>(path: S, reason: S) -> Self {
        Error::SinkOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
