//! Typed event and property model shared by the engine and the dispatcher.
//!
//! The native engine speaks in raw integers: lifecycle event ids, property
//! format codes and log levels. These types keep the raw value reachable
//! (`code()`, `raw()`) so nothing gets remapped on the way through.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value representation requested from (or reported by) the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyFormat {
    None,
    String,
    OsdString,
    Flag,
    Int64,
    Double,
    Node,
}

impl PropertyFormat {
    pub fn raw(self) -> i32 {
        match self {
            PropertyFormat::None => 0,
            PropertyFormat::String => 1,
            PropertyFormat::OsdString => 2,
            PropertyFormat::Flag => 3,
            PropertyFormat::Int64 => 4,
            PropertyFormat::Double => 5,
            PropertyFormat::Node => 6,
        }
    }

    /// Unknown codes fall back to `None`, which the engine treats as
    /// "notify without a value".
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => PropertyFormat::String,
            2 => PropertyFormat::OsdString,
            3 => PropertyFormat::Flag,
            4 => PropertyFormat::Int64,
            5 => PropertyFormat::Double,
            6 => PropertyFormat::Node,
            _ => PropertyFormat::None,
        }
    }
}

/// Dynamically typed property payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    None,
    Int(i64),
    Flag(bool),
    Text(String),
    Double(f64),
}

impl PropertyValue {
    /// String form the engine would report for this value.
    pub fn to_native_string(&self) -> Option<String> {
        match self {
            PropertyValue::None => None,
            PropertyValue::Int(v) => Some(v.to_string()),
            PropertyValue::Flag(v) => Some(if *v { "yes" } else { "no" }.to_string()),
            PropertyValue::Text(v) => Some(v.clone()),
            PropertyValue::Double(v) => Some(format!("{:.6}", v)),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Flag(v) => Some(i64::from(*v)),
            PropertyValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v != 0),
            PropertyValue::Text(v) => match v.as_str() {
                "yes" => Some(true),
                "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert into the representation an observer asked for.
    ///
    /// A value that has no form in the requested format becomes `None`, the
    /// same as a property that does not exist.
    pub fn convert(&self, format: PropertyFormat) -> PropertyValue {
        let converted = match format {
            PropertyFormat::None | PropertyFormat::Node => None,
            PropertyFormat::String | PropertyFormat::OsdString => {
                self.to_native_string().map(PropertyValue::Text)
            }
            PropertyFormat::Flag => self.as_flag().map(PropertyValue::Flag),
            PropertyFormat::Int64 => self.as_int().map(PropertyValue::Int),
            PropertyFormat::Double => self.as_double().map(PropertyValue::Double),
        };
        converted.unwrap_or(PropertyValue::None)
    }
}

/// Lifecycle event ids emitted by the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEventId {
    None,
    Shutdown,
    LogMessage,
    GetPropertyReply,
    SetPropertyReply,
    CommandReply,
    StartFile,
    EndFile,
    FileLoaded,
    Idle,
    Tick,
    PlaybackRestart,
    Other(i32),
}

impl EngineEventId {
    pub const NONE: i32 = 0;
    pub const SHUTDOWN: i32 = 1;
    pub const LOG_MESSAGE: i32 = 2;
    pub const GET_PROPERTY_REPLY: i32 = 3;
    pub const SET_PROPERTY_REPLY: i32 = 4;
    pub const COMMAND_REPLY: i32 = 5;
    pub const START_FILE: i32 = 6;
    pub const END_FILE: i32 = 7;
    pub const FILE_LOADED: i32 = 8;
    pub const IDLE: i32 = 11;
    pub const TICK: i32 = 14;
    pub const PLAYBACK_RESTART: i32 = 21;

    pub fn from_code(code: i32) -> Self {
        match code {
            Self::NONE => EngineEventId::None,
            Self::SHUTDOWN => EngineEventId::Shutdown,
            Self::LOG_MESSAGE => EngineEventId::LogMessage,
            Self::GET_PROPERTY_REPLY => EngineEventId::GetPropertyReply,
            Self::SET_PROPERTY_REPLY => EngineEventId::SetPropertyReply,
            Self::COMMAND_REPLY => EngineEventId::CommandReply,
            Self::START_FILE => EngineEventId::StartFile,
            Self::END_FILE => EngineEventId::EndFile,
            Self::FILE_LOADED => EngineEventId::FileLoaded,
            Self::IDLE => EngineEventId::Idle,
            Self::TICK => EngineEventId::Tick,
            Self::PLAYBACK_RESTART => EngineEventId::PlaybackRestart,
            other => EngineEventId::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            EngineEventId::None => Self::NONE,
            EngineEventId::Shutdown => Self::SHUTDOWN,
            EngineEventId::LogMessage => Self::LOG_MESSAGE,
            EngineEventId::GetPropertyReply => Self::GET_PROPERTY_REPLY,
            EngineEventId::SetPropertyReply => Self::SET_PROPERTY_REPLY,
            EngineEventId::CommandReply => Self::COMMAND_REPLY,
            EngineEventId::StartFile => Self::START_FILE,
            EngineEventId::EndFile => Self::END_FILE,
            EngineEventId::FileLoaded => Self::FILE_LOADED,
            EngineEventId::Idle => Self::IDLE,
            EngineEventId::Tick => Self::TICK,
            EngineEventId::PlaybackRestart => Self::PLAYBACK_RESTART,
            EngineEventId::Other(code) => code,
        }
    }
}

impl fmt::Display for EngineEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineEventId::None => "none",
            EngineEventId::Shutdown => "shutdown",
            EngineEventId::LogMessage => "log-message",
            EngineEventId::GetPropertyReply => "get-property-reply",
            EngineEventId::SetPropertyReply => "set-property-reply",
            EngineEventId::CommandReply => "command-reply",
            EngineEventId::StartFile => "start-file",
            EngineEventId::EndFile => "end-file",
            EngineEventId::FileLoaded => "file-loaded",
            EngineEventId::Idle => "idle",
            EngineEventId::Tick => "tick",
            EngineEventId::PlaybackRestart => "playback-restart",
            EngineEventId::Other(code) => return write!(f, "event-{}", code),
        };
        f.write_str(name)
    }
}

/// Native log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    None,
    Fatal,
    Error,
    Warn,
    Info,
    V,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            r if r <= 0 => LogLevel::None,
            r if r <= 10 => LogLevel::Fatal,
            r if r <= 20 => LogLevel::Error,
            r if r <= 30 => LogLevel::Warn,
            r if r <= 40 => LogLevel::Info,
            r if r <= 50 => LogLevel::V,
            r if r <= 60 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            LogLevel::None => 0,
            LogLevel::Fatal => 10,
            LogLevel::Error => 20,
            LogLevel::Warn => 30,
            LogLevel::Info => 40,
            LogLevel::V => 50,
            LogLevel::Debug => 60,
            LogLevel::Trace => 70,
        }
    }

    /// Name accepted by the engine when requesting log messages.
    pub fn as_request_str(self) -> &'static str {
        match self {
            LogLevel::None => "no",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::V => "v",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// One diagnostic line reported by the native engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub prefix: String,
    pub level: i32,
    pub text: String,
}

impl LogLine {
    pub fn level(&self) -> LogLevel {
        LogLevel::from_raw(self.level)
    }
}

/// Event emitted by the native engine and fanned out by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    PropertyChanged { name: String, value: PropertyValue },
    Lifecycle { id: EngineEventId },
    Log(LogLine),
}

impl EngineEvent {
    pub fn property(name: impl Into<String>, value: PropertyValue) -> Self {
        EngineEvent::PropertyChanged {
            name: name.into(),
            value,
        }
    }

    pub fn lifecycle(code: i32) -> Self {
        EngineEvent::Lifecycle {
            id: EngineEventId::from_code(code),
        }
    }

    /// Short description used in dispatch diagnostics.
    pub fn describe(&self) -> String {
        match self {
            EngineEvent::PropertyChanged { name, .. } => format!("property({})", name),
            EngineEvent::Lifecycle { id } => format!("lifecycle({})", id),
            EngineEvent::Log(line) => format!("log({})", line.prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_codes_are_stable() {
        assert_eq!(EngineEventId::from_code(0), EngineEventId::None);
        assert_eq!(EngineEventId::from_code(7), EngineEventId::EndFile);
        assert_eq!(EngineEventId::from_code(11), EngineEventId::Idle);
        assert_eq!(EngineEventId::from_code(14), EngineEventId::Tick);
        assert_eq!(EngineEventId::from_code(21), EngineEventId::PlaybackRestart);
        assert_eq!(EngineEventId::PlaybackRestart.code(), 21);
        assert_eq!(EngineEventId::FileLoaded.code(), 8);
    }

    #[test]
    fn test_unknown_event_codes_pass_through() {
        let id = EngineEventId::from_code(22);
        assert_eq!(id, EngineEventId::Other(22));
        assert_eq!(id.code(), 22);
        assert_eq!(id.to_string(), "event-22");
    }

    #[test]
    fn test_property_format_raw_values() {
        assert_eq!(PropertyFormat::None.raw(), 0);
        assert_eq!(PropertyFormat::Flag.raw(), 3);
        assert_eq!(PropertyFormat::Double.raw(), 5);
        assert_eq!(PropertyFormat::from_raw(4), PropertyFormat::Int64);
        assert_eq!(PropertyFormat::from_raw(99), PropertyFormat::None);
    }

    #[test]
    fn test_property_value_conversion() {
        let paused = PropertyValue::Text("yes".to_string());
        assert_eq!(
            paused.convert(PropertyFormat::Flag),
            PropertyValue::Flag(true)
        );

        let volume = PropertyValue::Int(50);
        assert_eq!(
            volume.convert(PropertyFormat::String),
            PropertyValue::Text("50".to_string())
        );
        assert_eq!(
            volume.convert(PropertyFormat::Double),
            PropertyValue::Double(50.0)
        );

        let title = PropertyValue::Text("Big Buck Bunny".to_string());
        assert_eq!(title.convert(PropertyFormat::Int64), PropertyValue::None);
        assert_eq!(title.convert(PropertyFormat::None), PropertyValue::None);
    }

    #[test]
    fn test_double_string_form() {
        assert_eq!(
            PropertyValue::Double(12.5).to_native_string().as_deref(),
            Some("12.500000")
        );
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::from_raw(10), LogLevel::Fatal);
        assert_eq!(LogLevel::from_raw(30), LogLevel::Warn);
        assert_eq!(LogLevel::from_raw(50), LogLevel::V);
        assert_eq!(LogLevel::from_raw(70), LogLevel::Trace);
        assert_eq!(LogLevel::V.as_request_str(), "v");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EngineEvent::property("volume", PropertyValue::Int(50));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"property_changed\""));
        assert!(json.contains("\"volume\""));
    }
}
