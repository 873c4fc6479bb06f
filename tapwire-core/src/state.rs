//! Capture session lifecycle state

use std::fmt;

/// State of a capture session
///
/// ```text
/// Uninitialized -> Initialized -> Capturing -> Stopped -> Capturing ...
///       any state --terminate()--> Terminated --init()--> Initialized
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No device has been opened yet
    #[default]
    Uninitialized,
    /// Device opened and filter installed, nothing running
    Initialized,
    /// A file dump or callback dump is running
    Capturing,
    /// Capture stopped, device still bound
    Stopped,
    /// Device released
    Terminated,
}

impl SessionState {
    /// Whether a dump may be started from this state
    pub fn is_start_ready(&self) -> bool {
        matches!(self, SessionState::Initialized | SessionState::Stopped)
    }

    /// Whether `init` may be called from this state
    pub fn is_initializable(&self) -> bool {
        matches!(self, SessionState::Uninitialized | SessionState::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Capturing => "capturing",
            SessionState::Stopped => "stopped",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_ready_states() {
        assert!(SessionState::Initialized.is_start_ready());
        assert!(SessionState::Stopped.is_start_ready());
        assert!(!SessionState::Uninitialized.is_start_ready());
        assert!(!SessionState::Capturing.is_start_ready());
        assert!(!SessionState::Terminated.is_start_ready());
    }

    #[test]
    fn test_initializable_states() {
        assert!(SessionState::Uninitialized.is_initializable());
        assert!(SessionState::Terminated.is_initializable());
        assert!(!SessionState::Stopped.is_initializable());
        assert_eq!(SessionState::default(), SessionState::Uninitialized);
    }
}
