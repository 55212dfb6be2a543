// Engine lifecycle error types and constants

use crate::engine::SessionState;
use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Engine error code constants shared with the Kotlin layer.
///
/// Error code range: 3001-3005
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    /// Operation invoked outside its legal lifecycle window
    pub const INVALID_STATE: i32 = 3001;

    /// Native allocation or initialization failed
    pub const ENGINE_INIT_ERROR: i32 = 3002;

    /// Native call returned a failure status
    pub const NATIVE_CALL_FAILURE: i32 = 3003;

    /// Session mutex was poisoned
    pub const LOCK_POISONED: i32 = 3004;

    /// Property value could not be decoded
    pub const MALFORMED_PROPERTY: i32 = 3005;
}

/// Log an engine error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, component=EngineHandle, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Engine-related errors
///
/// These errors cover the native session lifecycle, surface binding, and the
/// command/property primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Operation invoked while the session was in a state that forbids it
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Native session could not be created or initialized
    EngineInitError { reason: String },

    /// Native setter or control call reported a failure status
    NativeCallFailure { operation: String, code: i32 },

    /// Mutex was poisoned
    LockPoisoned { component: String },

    /// Property exists but its value could not be decoded
    MalformedProperty { name: String, reason: String },
}

impl EngineError {
    /// Status code to hand back across a non-exceptional boundary.
    ///
    /// Native failures keep the engine's own status; everything else maps to
    /// the generic `-1` failure.
    pub fn status_code(&self) -> i32 {
        match self {
            EngineError::NativeCallFailure { code, .. } => *code,
            _ => -1,
        }
    }
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::InvalidState { .. } => EngineErrorCodes::INVALID_STATE,
            EngineError::EngineInitError { .. } => EngineErrorCodes::ENGINE_INIT_ERROR,
            EngineError::NativeCallFailure { .. } => EngineErrorCodes::NATIVE_CALL_FAILURE,
            EngineError::LockPoisoned { .. } => EngineErrorCodes::LOCK_POISONED,
            EngineError::MalformedProperty { .. } => EngineErrorCodes::MALFORMED_PROPERTY,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::InvalidState { operation, state } => {
                format!("{} is not allowed while the session is {}", operation, state)
            }
            EngineError::EngineInitError { reason } => {
                format!("Engine initialization failed: {}", reason)
            }
            EngineError::NativeCallFailure { operation, code } => {
                format!("Native call {} failed with status {}", operation, code)
            }
            EngineError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            EngineError::MalformedProperty { name, reason } => {
                format!("Property {} could not be decoded: {}", name, reason)
            }
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EngineError {}
