use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;

use crate::dispatch::EventSink;
use crate::error::EngineError;
use crate::events::{EngineEvent, EngineEventId, LogLevel, LogLine, PropertyFormat, PropertyValue};

use super::{status, EngineBackend, EngineContext, NativeSession, SurfaceHandle};

/// Times the stub library has been "loaded" in this process.
static LIBRARY_LOADS: AtomicUsize = AtomicUsize::new(0);

/// Duration reported for every file the stub loads.
const STUB_MEDIA_DURATION_SECS: f64 = 120.0;

const STUB_TRACK_LIST: &str = r#"[{"id":1,"type":"video","selected":true},{"id":1,"type":"audio","lang":"eng","title":"Stereo","selected":true},{"id":2,"type":"audio","lang":"jpn","selected":false},{"id":1,"type":"sub","lang":"eng","title":"Full","selected":false}]"#;

/// Failure injection for tests.
#[derive(Debug, Clone, Default)]
pub struct StubBehavior {
    pub fail_open: bool,
    pub fail_initialize: bool,
    /// Option names rejected with `OPTION_NOT_FOUND`
    pub rejected_options: Vec<String>,
    /// Window ids rejected with `INVALID_PARAMETER`
    pub rejected_surfaces: Vec<i64>,
}

/// Desktop stub backend used for deterministic testing and CLI tooling.
///
/// Simulates the engine's property store and a handful of commands
/// (`loadfile`, `stop`, `seek`, `show-text`, `set`) without decoding anything.
/// Events are delivered from a dedicated pump thread, the same way a real
/// engine calls in from its own threads.
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    behavior: StubBehavior,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: StubBehavior) -> Self {
        Self { behavior }
    }

    pub fn library_loads() -> usize {
        LIBRARY_LOADS.load(Ordering::SeqCst)
    }
}

impl EngineBackend for StubBackend {
    fn load_library(&self) -> Result<(), EngineError> {
        LIBRARY_LOADS.fetch_add(1, Ordering::SeqCst);
        log::info!("[StubBackend] Native library loaded");
        Ok(())
    }

    fn open(
        &self,
        context: &EngineContext,
        events: EventSink,
    ) -> Result<Box<dyn NativeSession>, EngineError> {
        if self.behavior.fail_open {
            return Err(EngineError::EngineInitError {
                reason: "stub allocation refused".to_string(),
            });
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
        let pump = thread::Builder::new()
            .name("stub-engine-events".to_string())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    events.emit(event);
                }
            })
            .map_err(|err| EngineError::EngineInitError {
                reason: format!("failed to spawn event thread: {}", err),
            })?;

        Ok(Box::new(StubSession::new(
            self.behavior.clone(),
            context.log_level,
            tx,
            pump,
        )))
    }
}

struct StubSession {
    behavior: StubBehavior,
    log_level: LogLevel,
    initialized: bool,
    options: HashMap<String, String>,
    properties: HashMap<String, PropertyValue>,
    observed: Vec<(String, PropertyFormat)>,
    surface: Option<SurfaceHandle>,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
    pump: Option<JoinHandle<()>>,
    pump_id: ThreadId,
}

impl StubSession {
    fn new(
        behavior: StubBehavior,
        log_level: LogLevel,
        events: mpsc::UnboundedSender<EngineEvent>,
        pump: JoinHandle<()>,
    ) -> Self {
        let mut properties = HashMap::new();
        properties.insert("pause".to_string(), PropertyValue::Flag(false));
        properties.insert("volume".to_string(), PropertyValue::Int(100));
        properties.insert("idle-active".to_string(), PropertyValue::Flag(true));
        properties.insert("wid".to_string(), PropertyValue::Int(0));

        Self {
            behavior,
            log_level,
            initialized: false,
            options: HashMap::new(),
            properties,
            observed: Vec::new(),
            surface: None,
            pump_id: pump.thread().id(),
            events: Some(events),
            pump: Some(pump),
        }
    }

    fn send(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn log(&self, prefix: &str, level: LogLevel, text: String) {
        if level <= self.log_level && level != LogLevel::None {
            self.send(EngineEvent::Log(LogLine {
                prefix: prefix.to_string(),
                level: level.raw(),
                text,
            }));
        }
    }

    /// Store a value and notify observers of that property if it changed.
    fn store(&mut self, name: &str, value: PropertyValue) {
        let previous = self.properties.insert(name.to_string(), value.clone());
        if previous.as_ref() == Some(&value) {
            return;
        }
        for (observed, format) in &self.observed {
            if observed == name {
                self.send(EngineEvent::property(name, value.convert(*format)));
            }
        }
    }

    fn remove(&mut self, name: &str) {
        if self.properties.remove(name).is_some() {
            for (observed, _) in &self.observed {
                if observed == name {
                    self.send(EngineEvent::property(name, PropertyValue::None));
                }
            }
        }
    }

    /// Parse a written value into the type the property already holds.
    fn coerce(&self, name: &str, value: PropertyValue) -> Option<PropertyValue> {
        match self.properties.get(name) {
            Some(PropertyValue::Flag(_)) => value.as_flag().map(PropertyValue::Flag),
            Some(PropertyValue::Int(_)) => value.as_int().map(PropertyValue::Int),
            Some(PropertyValue::Double(_)) => value.as_double().map(PropertyValue::Double),
            _ => Some(value),
        }
    }

    fn write_property(&mut self, name: &str, value: PropertyValue) -> i32 {
        if name.is_empty() {
            return status::INVALID_PARAMETER;
        }
        match self.coerce(name, value) {
            Some(coerced) => {
                self.store(name, coerced);
                status::SUCCESS
            }
            None => status::PROPERTY_FORMAT,
        }
    }

    fn load_file(&mut self, url: &str) -> i32 {
        self.send(EngineEvent::lifecycle(EngineEventId::START_FILE));
        self.store("path", PropertyValue::Text(url.to_string()));
        self.store("idle-active", PropertyValue::Flag(false));
        self.store("duration", PropertyValue::Double(STUB_MEDIA_DURATION_SECS));
        self.store("time-pos", PropertyValue::Double(0.0));
        self.store(
            "track-list",
            PropertyValue::Text(STUB_TRACK_LIST.to_string()),
        );
        self.log("cplayer", LogLevel::Info, format!("Playing: {}\n", url));
        self.send(EngineEvent::lifecycle(EngineEventId::FILE_LOADED));
        self.send(EngineEvent::lifecycle(EngineEventId::PLAYBACK_RESTART));
        status::SUCCESS
    }

    fn stop(&mut self) -> i32 {
        let was_playing = self.properties.contains_key("path");
        self.remove("path");
        self.remove("duration");
        self.remove("time-pos");
        self.remove("track-list");
        if was_playing {
            self.properties
                .insert("end-file-reason".to_string(), PropertyValue::Text("stop".to_string()));
            self.send(EngineEvent::lifecycle(EngineEventId::END_FILE));
        }
        self.store("idle-active", PropertyValue::Flag(true));
        self.send(EngineEvent::lifecycle(EngineEventId::IDLE));
        status::SUCCESS
    }

    fn seek(&mut self, target: &str, mode: Option<&str>) -> i32 {
        let Some(PropertyValue::Double(position)) = self.properties.get("time-pos").cloned() else {
            return status::COMMAND;
        };
        let Ok(amount) = target.parse::<f64>() else {
            return status::INVALID_PARAMETER;
        };

        let next = match mode {
            Some("absolute") => amount,
            None | Some("relative") => position + amount,
            Some(_) => return status::INVALID_PARAMETER,
        };
        let duration = self
            .properties
            .get("duration")
            .and_then(PropertyValue::as_double)
            .unwrap_or(STUB_MEDIA_DURATION_SECS);

        self.store("time-pos", PropertyValue::Double(next.clamp(0.0, duration)));
        self.send(EngineEvent::lifecycle(EngineEventId::PLAYBACK_RESTART));
        status::SUCCESS
    }
}

impl NativeSession for StubSession {
    fn initialize(&mut self) -> i32 {
        if self.behavior.fail_initialize {
            return status::NOMEM;
        }
        if self.initialized {
            return status::INVALID_PARAMETER;
        }
        self.initialized = true;
        self.log("stub", LogLevel::V, "engine initialized\n".to_string());
        status::SUCCESS
    }

    fn destroy(mut self: Box<Self>) {
        self.send(EngineEvent::lifecycle(EngineEventId::SHUTDOWN));
        self.events.take();

        if let Some(pump) = self.pump.take() {
            // Destroy may come from an observer running on the pump itself.
            if thread::current().id() != self.pump_id {
                let _ = pump.join();
            }
        }
    }

    fn attach_surface(&mut self, surface: SurfaceHandle) -> i32 {
        if self.behavior.rejected_surfaces.contains(&surface.raw()) {
            return status::INVALID_PARAMETER;
        }
        self.surface = Some(surface);
        self.store("wid", PropertyValue::Int(surface.raw()));
        status::SUCCESS
    }

    fn detach_surface(&mut self) -> i32 {
        self.surface = None;
        self.store("wid", PropertyValue::Int(0));
        status::SUCCESS
    }

    fn command(&mut self, args: &[&str]) -> i32 {
        match args {
            ["loadfile", url, ..] => self.load_file(url),
            ["stop"] => self.stop(),
            ["seek", target] => self.seek(target, None),
            ["seek", target, mode] => self.seek(target, Some(*mode)),
            ["show-text", text, ..] => {
                self.log("osd", LogLevel::Info, format!("{}\n", text));
                status::SUCCESS
            }
            ["set", name, value] => {
                self.write_property(name, PropertyValue::Text(value.to_string()))
            }
            [] => status::INVALID_PARAMETER,
            [name, ..] => {
                self.log(
                    "cplayer",
                    LogLevel::Error,
                    format!("Command {} not found.\n", name),
                );
                status::INVALID_PARAMETER
            }
        }
    }

    fn set_option_string(&mut self, name: &str, value: &str) -> i32 {
        if self.behavior.rejected_options.iter().any(|o| o == name) {
            return status::OPTION_NOT_FOUND;
        }
        self.options.insert(name.to_string(), value.to_string());
        status::SUCCESS
    }

    fn get_property_string(&mut self, name: &str) -> Option<String> {
        if let Some(option) = name.strip_prefix("options/") {
            return self.options.get(option).cloned();
        }
        self.properties
            .get(name)
            .and_then(PropertyValue::to_native_string)
    }

    fn set_property_string(&mut self, name: &str, value: &str) -> i32 {
        self.write_property(name, PropertyValue::Text(value.to_string()))
    }

    fn get_property_int(&mut self, name: &str) -> Option<i64> {
        self.properties.get(name).and_then(PropertyValue::as_int)
    }

    fn set_property_int(&mut self, name: &str, value: i64) -> i32 {
        self.write_property(name, PropertyValue::Int(value))
    }

    fn observe_property(&mut self, name: &str, format: PropertyFormat) -> i32 {
        if name.is_empty() {
            return status::INVALID_PARAMETER;
        }
        self.observed.push((name.to_string(), format));

        // The engine always follows a new observation with the current value.
        let current = self
            .properties
            .get(name)
            .map(|value| value.convert(format))
            .unwrap_or(PropertyValue::None);
        self.send(EngineEvent::property(name, current));
        status::SUCCESS
    }
}
