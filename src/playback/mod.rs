//! Player-side model built on top of engine events and properties.
//!
//! `Track` and `EndFileReport` decode what the engine exposes as properties;
//! `PlaybackTracker` is an observer that folds the event stream into the
//! current playback position and status.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::dispatch::EventObserver;
use crate::events::EngineEventId;

/// Kind of media track as reported in `track-list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Sub,
}

impl TrackKind {
    /// Property that selects the active track of this kind.
    pub fn selection_property(self) -> &'static str {
        match self {
            TrackKind::Video => "vid",
            TrackKind::Audio => "aid",
            TrackKind::Sub => "sid",
        }
    }
}

/// One entry of the engine's track list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub selected: bool,
}

impl Track {
    /// Human readable label: title and language when known, id otherwise.
    pub fn label(&self) -> String {
        match (&self.title, &self.lang) {
            (Some(title), Some(lang)) => format!("#{} {} ({})", self.id, title, lang),
            (Some(title), None) => format!("#{} {}", self.id, title),
            (None, Some(lang)) => format!("#{} ({})", self.id, lang),
            (None, None) => format!("#{}", self.id),
        }
    }
}

/// Why the last file stopped playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndFileReport {
    pub reason: String,
    pub error: String,
}

impl EndFileReport {
    pub const UNKNOWN_REASON: &'static str = "unknown";
    pub const NO_ERROR: &'static str = "no error";

    pub fn new(reason: Option<String>, error: Option<String>) -> Self {
        Self {
            reason: reason.unwrap_or_else(|| Self::UNKNOWN_REASON.to_string()),
            error: error.unwrap_or_else(|| Self::NO_ERROR.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.reason == "error"
    }
}

/// Format a position in seconds as `MM:SS`, or `H:MM:SS` past one hour.
///
/// Negative and non-finite inputs render as `00:00`.
pub fn format_timestamp(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Point-in-time view of playback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub position: Option<f64>,
    pub duration: Option<f64>,
    pub paused: bool,
    pub loaded: bool,
    pub ended: bool,
}

impl PlaybackSnapshot {
    /// `position / duration` text, e.g. `01:05 / 02:00`.
    pub fn progress_label(&self) -> String {
        format!(
            "{} / {}",
            format_timestamp(self.position.unwrap_or(0.0)),
            format_timestamp(self.duration.unwrap_or(0.0))
        )
    }
}

/// Observer tracking position, duration and play status.
#[derive(Debug, Default)]
pub struct PlaybackTracker {
    state: Mutex<PlaybackSnapshot>,
}

impl PlaybackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut PlaybackSnapshot)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl EventObserver for PlaybackTracker {
    fn on_property_none(&self, name: &str) {
        match name {
            "time-pos" => self.update(|s| s.position = None),
            "duration" => self.update(|s| s.duration = None),
            _ => {}
        }
    }

    fn on_property_int(&self, name: &str, value: i64) {
        self.on_property_double(name, value as f64);
    }

    fn on_property_flag(&self, name: &str, value: bool) {
        if name == "pause" {
            self.update(|s| s.paused = value);
        }
    }

    fn on_property_text(&self, name: &str, value: &str) {
        match name {
            "pause" => self.update(|s| s.paused = value == "yes"),
            "time-pos" | "duration" => {
                if let Ok(parsed) = value.parse::<f64>() {
                    self.on_property_double(name, parsed);
                }
            }
            _ => {}
        }
    }

    fn on_property_double(&self, name: &str, value: f64) {
        match name {
            "time-pos" => self.update(|s| s.position = Some(value)),
            "duration" => self.update(|s| s.duration = Some(value)),
            _ => {}
        }
    }

    fn on_event(&self, id: EngineEventId) {
        match id {
            EngineEventId::StartFile => self.update(|s| {
                s.position = None;
                s.loaded = false;
                s.ended = false;
            }),
            EngineEventId::FileLoaded => self.update(|s| s.loaded = true),
            EngineEventId::EndFile => self.update(|s| {
                s.loaded = false;
                s.ended = true;
            }),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.9), "01:05");
        assert_eq!(format_timestamp(3599.0), "59:59");
        assert_eq!(format_timestamp(3600.0), "1:00:00");
        assert_eq!(format_timestamp(7384.0), "2:03:04");
        assert_eq!(format_timestamp(-3.0), "00:00");
        assert_eq!(format_timestamp(f64::NAN), "00:00");
    }

    #[test]
    fn test_track_list_decoding() {
        let json = r#"[
            {"id": 1, "type": "video", "selected": true},
            {"id": 2, "type": "audio", "lang": "jpn", "title": "Commentary"},
            {"id": 1, "type": "sub", "lang": "eng", "selected": false, "codec": "ass"}
        ]"#;
        let tracks: Vec<Track> = serde_json::from_str(json).unwrap();

        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].kind, TrackKind::Video);
        assert!(tracks[0].selected);
        assert_eq!(tracks[1].label(), "#2 Commentary (jpn)");
        assert!(!tracks[1].selected);
        assert_eq!(tracks[2].kind.selection_property(), "sid");
        assert_eq!(tracks[0].label(), "#1");
    }

    #[test]
    fn test_end_file_report_fallbacks() {
        let report = EndFileReport::new(None, None);
        assert_eq!(report.reason, "unknown");
        assert_eq!(report.error, "no error");
        assert!(!report.is_error());

        let report = EndFileReport::new(Some("error".into()), Some("loading failed".into()));
        assert!(report.is_error());
    }

    #[test]
    fn test_tracker_follows_events() {
        let tracker = PlaybackTracker::new();

        tracker.on_event(EngineEventId::StartFile);
        tracker.on_property_double("duration", 120.0);
        tracker.on_property_double("time-pos", 65.0);
        tracker.on_property_flag("pause", true);
        tracker.on_event(EngineEventId::FileLoaded);

        let snapshot = tracker.snapshot();
        assert!(snapshot.loaded);
        assert!(snapshot.paused);
        assert_eq!(snapshot.progress_label(), "01:05 / 02:00");

        tracker.on_property_none("time-pos");
        tracker.on_event(EngineEventId::EndFile);
        let snapshot = tracker.snapshot();
        assert!(snapshot.ended);
        assert!(!snapshot.loaded);
        assert_eq!(snapshot.position, None);
        assert_eq!(snapshot.duration, Some(120.0));
    }

    #[test]
    fn test_tracker_accepts_text_values() {
        let tracker = PlaybackTracker::new();
        tracker.on_property_text("pause", "yes");
        tracker.on_property_text("time-pos", "12.5");
        tracker.on_property_text("time-pos", "garbage");

        let snapshot = tracker.snapshot();
        assert!(snapshot.paused);
        assert_eq!(snapshot.position, Some(12.5));
    }
}
