// mpv bridge core - native playback engine boundary
// Session lifecycle, thread-safe event fan-out and logging for libmpv

// Module declarations
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod playback;
pub mod testing;

#[cfg(target_os = "android")]
mod jni_bridge;

// Re-exports for convenience
pub use config::BridgeConfig;
pub use dispatch::{DispatchSummary, EventDispatcher, EventObserver, EventSink, ObserverId};
pub use engine::{EngineContext, EngineHandle, EventSubscription, SessionState, SurfaceHandle};
pub use error::{DispatchError, EngineError, ErrorCode};
pub use events::{EngineEvent, EngineEventId, LogLevel, LogLine, PropertyFormat, PropertyValue};
pub use playback::{format_timestamp, EndFileReport, PlaybackTracker, Track, TrackKind};

/// JNI_OnLoad is called when the native library is loaded by Android
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    logging::init_logging();
    log::info!("JNI_OnLoad called - mpv bridge loaded");
    jni::sys::JNI_VERSION_1_6
}
