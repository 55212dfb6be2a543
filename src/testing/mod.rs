//! Test support shared by unit tests, integration tests and the CLI harness.
//!
//! `RecordingObserver` captures every notification it receives in arrival
//! order so tests can assert on exactly what the dispatcher delivered.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::dispatch::EventObserver;
use crate::events::{EngineEvent, EngineEventId, LogLine, PropertyValue};

/// Observer that records every notification as an `EngineEvent`.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Property notifications received for `name`, in order.
    pub fn property_values(&self, name: &str) -> Vec<PropertyValue> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::PropertyChanged { name: n, value } if n == name => {
                    Some(value.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn lifecycle_ids(&self) -> Vec<EngineEventId> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Lifecycle { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn log_lines(&self) -> Vec<LogLine> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Log(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: EngineEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EngineEvent>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl EventObserver for RecordingObserver {
    fn on_property_none(&self, name: &str) {
        self.record(EngineEvent::property(name, PropertyValue::None));
    }

    fn on_property_int(&self, name: &str, value: i64) {
        self.record(EngineEvent::property(name, PropertyValue::Int(value)));
    }

    fn on_property_flag(&self, name: &str, value: bool) {
        self.record(EngineEvent::property(name, PropertyValue::Flag(value)));
    }

    fn on_property_text(&self, name: &str, value: &str) {
        self.record(EngineEvent::property(
            name,
            PropertyValue::Text(value.to_string()),
        ));
    }

    fn on_property_double(&self, name: &str, value: f64) {
        self.record(EngineEvent::property(name, PropertyValue::Double(value)));
    }

    fn on_event(&self, id: EngineEventId) {
        self.record(EngineEvent::Lifecycle { id });
    }

    fn on_log(&self, line: &LogLine) {
        self.record(EngineEvent::Log(line.clone()));
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Events from an engine session arrive on its own thread, so tests wait for
/// them instead of asserting immediately.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}
