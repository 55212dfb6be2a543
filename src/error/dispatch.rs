// Dispatch error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Dispatch error code constants.
///
/// Error code range: 4001
pub struct DispatchErrorCodes {}

impl DispatchErrorCodes {
    /// An observer panicked while handling a notification
    pub const OBSERVER_PANICKED: i32 = 4001;
}

/// Log a dispatch error with structured context
///
/// Used by the dispatcher to report contained observer failures; never
/// propagates anything to the native calling thread.
pub fn log_dispatch_error(err: &DispatchError, context: &str) {
    error!(
        "Dispatch error in {}: code={}, component=EventDispatcher, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Failures raised by individual observers during a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Observer panicked inside its notification
    ObserverPanicked {
        observer: u64,
        event: String,
        message: String,
    },
}

impl ErrorCode for DispatchError {
    fn code(&self) -> i32 {
        match self {
            DispatchError::ObserverPanicked { .. } => DispatchErrorCodes::OBSERVER_PANICKED,
        }
    }

    fn message(&self) -> String {
        match self {
            DispatchError::ObserverPanicked {
                observer,
                event,
                message,
            } => format!(
                "Observer {} panicked while handling {}: {}",
                observer, event, message
            ),
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DispatchError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_panicked_message() {
        let err = DispatchError::ObserverPanicked {
            observer: 3,
            event: "lifecycle(end-file)".to_string(),
            message: "index out of bounds".to_string(),
        };
        assert_eq!(err.code(), 4001);
        assert!(err.message().contains("Observer 3"));
        assert!(err.message().contains("lifecycle(end-file)"));
        assert!(format!("{}", err).contains("DispatchError"));
    }
}
