//! Configuration for the engine bridge
//!
//! Runtime configuration loaded from JSON so default engine options and the
//! properties the player watches can be tuned without recompiling. Missing or
//! invalid files fall back to the built-in defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::events::{LogLevel, PropertyFormat};

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Native engine session parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum native log level requested from the engine
    pub log_level: LogLevel,
    /// Options applied between create and init, in order
    pub options: Vec<EngineOption>,
}

/// One `name=value` engine option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOption {
    pub name: String,
    pub value: String,
}

impl EngineOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::V,
            options: vec![
                EngineOption::new("vo", "gpu"),
                EngineOption::new("gpu-context", "android"),
                EngineOption::new("hwdec", "auto"),
                EngineOption::new("cache", "yes"),
                EngineOption::new("demuxer-max-bytes", "128MiB"),
                EngineOption::new("demuxer-readahead-secs", "20"),
                EngineOption::new("demuxer-max-back-bytes", "150MiB"),
                EngineOption::new("force-seekable", "yes"),
            ],
        }
    }
}

/// Player-side behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Properties observed as soon as the engine is initialized
    pub observed_properties: Vec<ObservedProperty>,
    /// Step used by relative seek controls
    pub seek_step_secs: f64,
}

/// Property name plus the format its changes should be reported in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedProperty {
    pub name: String,
    pub format: PropertyFormat,
}

impl ObservedProperty {
    pub fn new(name: impl Into<String>, format: PropertyFormat) -> Self {
        Self {
            name: name.into(),
            format,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            observed_properties: vec![
                ObservedProperty::new("time-pos", PropertyFormat::Double),
                ObservedProperty::new("duration", PropertyFormat::Double),
                ObservedProperty::new("pause", PropertyFormat::Flag),
            ],
            seek_step_secs: 10.0,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from JSON file
    ///
    /// Never fails: an unreadable file or invalid JSON logs a warning and
    /// yields the default configuration.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration on Android
    ///
    /// Bundled assets are only reachable through the AssetManager, so the
    /// built-in defaults are used.
    #[cfg(target_os = "android")]
    pub fn load_android() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/bridge_config.json")
    }
}
