// Error types for the native playback bridge
//
// This module defines custom error types for engine lifecycle and event
// dispatch, providing structured error handling with error codes suitable for
// reporting across the JNI boundary.

mod dispatch;
mod engine;

pub use dispatch::{log_dispatch_error, DispatchError, DispatchErrorCodes};
pub use engine::{log_engine_error, EngineError, EngineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
