use crate::config::{EngineOption, ObservedProperty};
use crate::error::{log_engine_error, EngineError};
use crate::playback::{EndFileReport, Track, TrackKind};

use super::EngineHandle;

impl EngineHandle {
    // ========================================================================
    // SESSION SETUP
    // ========================================================================

    /// Create, configure and initialize a session from the handle's config,
    /// then observe the configured properties.
    pub fn start(&self) -> Result<(), EngineError> {
        self.create(&self.context())?;
        self.apply_options(&self.config().engine.options)?;
        self.init()?;
        self.observe_properties(&self.config().playback.observed_properties)
    }

    /// Apply options in order. A rejected option is logged and skipped;
    /// returns how many were accepted.
    pub fn apply_options(&self, options: &[EngineOption]) -> Result<usize, EngineError> {
        let mut applied = 0;
        for option in options {
            match self.set_option_string(&option.name, &option.value) {
                Ok(()) => applied += 1,
                Err(EngineError::NativeCallFailure { code, .. }) => {
                    log::warn!(
                        "[EngineHandle] Skipping option {}={} (status {})",
                        option.name,
                        option.value,
                        code
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(applied)
    }

    pub fn observe_properties(&self, properties: &[ObservedProperty]) -> Result<(), EngineError> {
        for property in properties {
            self.observe_property(&property.name, property.format)?;
        }
        Ok(())
    }

    // ========================================================================
    // PLAYBACK CONTROLS
    // ========================================================================

    pub fn load_file(&self, url: &str) -> Result<(), EngineError> {
        log::info!("[EngineHandle] Loading {}", url);
        self.command(&["loadfile", url])
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        self.command(&["stop"])
    }

    /// Flip the `pause` property and return the new paused state.
    pub fn toggle_pause(&self) -> Result<bool, EngineError> {
        let paused = self.get_property_string("pause")?.as_deref() == Some("yes");
        self.set_paused(!paused)?;
        Ok(!paused)
    }

    pub fn set_paused(&self, paused: bool) -> Result<(), EngineError> {
        self.set_property_string("pause", if paused { "yes" } else { "no" })
    }

    pub fn seek_relative(&self, secs: f64) -> Result<(), EngineError> {
        self.command(&["seek", &secs.to_string(), "relative"])
    }

    pub fn seek_absolute(&self, secs: f64) -> Result<(), EngineError> {
        self.command(&["seek", &secs.to_string(), "absolute"])
    }

    /// Relative seek by the configured step, backwards when `forward` is false.
    pub fn seek_step(&self, forward: bool) -> Result<(), EngineError> {
        let step = self.config().playback.seek_step_secs;
        self.seek_relative(if forward { step } else { -step })
    }

    /// Show a message on the on-screen display.
    pub fn show_text(&self, text: &str) -> Result<(), EngineError> {
        self.command(&["show-text", text])
    }

    // ========================================================================
    // TRACKS
    // ========================================================================

    /// Decode the `track-list` property. No file loaded means no tracks.
    pub fn track_list(&self) -> Result<Vec<Track>, EngineError> {
        let Some(raw) = self.get_property_string("track-list")? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&raw).map_err(|err| {
            let err = EngineError::MalformedProperty {
                name: "track-list".to_string(),
                reason: err.to_string(),
            };
            log_engine_error(&err, "track_list");
            err
        })
    }

    pub fn select_track(&self, kind: TrackKind, id: i64) -> Result<(), EngineError> {
        self.set_property_string(kind.selection_property(), &id.to_string())
    }

    pub fn disable_track(&self, kind: TrackKind) -> Result<(), EngineError> {
        self.set_property_string(kind.selection_property(), "no")
    }

    /// Reason and error text for the file that ended last.
    pub fn end_file_report(&self) -> Result<EndFileReport, EngineError> {
        let reason = self.get_property_string("end-file-reason")?;
        let error = self.get_property_string("error")?;
        Ok(EndFileReport::new(reason, error))
    }
}
