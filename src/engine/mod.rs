//! Engine module housing the native session layer.
//!
//! `backend` defines the native call surface and its implementations;
//! `core` holds `EngineHandle`, which sequences the session lifecycle on top;
//! `shared` keeps a process-wide handle for platform layers.

pub mod backend;
pub mod core;
pub mod shared;

#[cfg(any(target_os = "android", feature = "libmpv"))]
pub use backend::LibMpvBackend;
pub use backend::{
    default_backend, EngineBackend, EngineContext, NativeSession, StubBackend, StubBehavior,
    SurfaceHandle,
};
pub use core::{EngineHandle, EventSubscription, SessionState};
pub use shared::{SharedEngine, SurfaceBinding};
