//! Backend abstractions for the native engine boundary.
//!
//! `EngineBackend` stands for the native library (loaded once per process)
//! and hands out `NativeSession`s. A session exposes the raw call surface
//! with the engine's own status codes; `EngineHandle` turns those into
//! `EngineError`s and enforces the lifecycle.

use std::num::NonZeroI64;
use std::sync::Arc;

use crate::dispatch::EventSink;
use crate::error::EngineError;
use crate::events::{LogLevel, PropertyFormat};

/// Native status codes shared by all backends.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const NOMEM: i32 = -2;
    pub const UNINITIALIZED: i32 = -3;
    pub const INVALID_PARAMETER: i32 = -4;
    pub const OPTION_NOT_FOUND: i32 = -5;
    pub const OPTION_FORMAT: i32 = -6;
    pub const PROPERTY_NOT_FOUND: i32 = -8;
    pub const PROPERTY_FORMAT: i32 = -9;
    pub const COMMAND: i32 = -12;
}

/// Non-owning reference to a platform drawable surface.
///
/// The platform layer owns the surface; this is only the window id the
/// native engine renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(NonZeroI64);

impl SurfaceHandle {
    pub fn new(raw: i64) -> Option<Self> {
        NonZeroI64::new(raw).map(SurfaceHandle)
    }

    pub fn raw(self) -> i64 {
        self.0.get()
    }
}

/// Context given to the backend when a session is allocated.
///
/// The platform application context itself is published process-wide by the
/// JNI layer (through `ndk-context`) before the first session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineContext {
    /// Minimum native log level to request.
    pub log_level: LogLevel,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            log_level: LogLevel::V,
        }
    }
}

/// Native engine library.
pub trait EngineBackend: Send + Sync {
    /// Load the native library. Called at most once per process.
    fn load_library(&self) -> Result<(), EngineError>;

    /// Allocate a new native session that pushes its events into `events`.
    fn open(
        &self,
        context: &EngineContext,
        events: EventSink,
    ) -> Result<Box<dyn NativeSession>, EngineError>;
}

/// One live native session. Calls are serialized by the owning handle.
pub trait NativeSession: Send {
    fn initialize(&mut self) -> i32;

    /// Release the session. Must stop the session's event thread before
    /// returning unless called from that thread.
    fn destroy(self: Box<Self>);

    fn attach_surface(&mut self, surface: SurfaceHandle) -> i32;
    fn detach_surface(&mut self) -> i32;

    fn command(&mut self, args: &[&str]) -> i32;

    fn set_option_string(&mut self, name: &str, value: &str) -> i32;

    fn get_property_string(&mut self, name: &str) -> Option<String>;
    fn set_property_string(&mut self, name: &str, value: &str) -> i32;

    fn get_property_int(&mut self, name: &str) -> Option<i64>;
    fn set_property_int(&mut self, name: &str, value: i64) -> i32;

    fn observe_property(&mut self, name: &str, format: PropertyFormat) -> i32;
}

mod desktop_stub;
pub use desktop_stub::{StubBackend, StubBehavior};

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "android", feature = "libmpv"))] {
        mod libmpv;
        pub use libmpv::LibMpvBackend;

        /// Backend used when none is injected: the linked libmpv.
        pub fn default_backend() -> Arc<dyn EngineBackend> {
            Arc::new(LibMpvBackend::new())
        }
    } else {
        /// Backend used when none is injected: the in-memory stub.
        pub fn default_backend() -> Arc<dyn EngineBackend> {
            Arc::new(StubBackend::new())
        }
    }
}
