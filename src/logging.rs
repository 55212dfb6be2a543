//! Logging bridge for native engine diagnostics.
//!
//! Each native log line becomes exactly one `tracing` event on target `mpv`,
//! tagged with its prefix and mapped level. Nothing is buffered or filtered
//! here; the installed subscriber decides what to keep.

use tracing::Level;

use crate::events::{LogLevel, LogLine};

/// Logcat tag used on Android.
pub const LOG_TAG: &str = "MPV_Native";

/// Tracing level used for a native log level.
pub fn tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::None | LogLevel::Fatal | LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::V => Level::DEBUG,
        LogLevel::Debug | LogLevel::Trace => Level::TRACE,
    }
}

/// Forward one native log line to the process logging sink.
pub fn forward(line: &LogLine) {
    // Native lines carry their own trailing newline.
    let text = line.text.trim_end_matches(['\r', '\n']);
    let prefix = line.prefix.as_str();

    match tracing_level(line.level()) {
        Level::ERROR => tracing::error!(target: "mpv", prefix, "[{}] {}", prefix, text),
        Level::WARN => tracing::warn!(target: "mpv", prefix, "[{}] {}", prefix, text),
        Level::INFO => tracing::info!(target: "mpv", prefix, "[{}] {}", prefix, text),
        Level::DEBUG => tracing::debug!(target: "mpv", prefix, "[{}] {}", prefix, text),
        _ => tracing::trace!(target: "mpv", prefix, "[{}] {}", prefix, text),
    }
}

/// Install the process-wide subscriber. Safe to call more than once.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    match tracing_android::layer(LOG_TAG) {
        Ok(layer) => {
            let _ = tracing_subscriber::registry().with(layer).try_init();
        }
        Err(err) => {
            eprintln!("[{}] Failed to create logcat layer: {}", LOG_TAG, err);
        }
    }
}

/// Install the process-wide subscriber. Safe to call more than once.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .try_init();
}
