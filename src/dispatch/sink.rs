// EventSink: the native-call trampoline into the dispatcher.
//
// The native side reports events through separate typed entry points; each
// entry point here picks the matching PropertyValue variant before handing a
// tagged EngineEvent to the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dispatch::{DispatchSummary, EventDispatcher};
use crate::events::{EngineEvent, LogLine, PropertyValue};
use crate::logging;

/// Handle given to a native session for pushing events.
///
/// Clones share one open/closed flag. The engine handle closes the sink when
/// the session is destroyed; everything emitted afterwards is dropped.
#[derive(Clone)]
pub struct EventSink {
    dispatcher: Arc<EventDispatcher>,
    open: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            dispatcher,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Forward log lines to the logging sink, then fan out to observers.
    pub fn emit(&self, event: EngineEvent) -> DispatchSummary {
        if !self.is_open() {
            return DispatchSummary::default();
        }

        if let EngineEvent::Log(line) = &event {
            logging::forward(line);
        }

        self.dispatcher.dispatch(&event)
    }

    pub fn property_none(&self, name: &str) -> DispatchSummary {
        self.emit(EngineEvent::property(name, PropertyValue::None))
    }

    pub fn property_int(&self, name: &str, value: i64) -> DispatchSummary {
        self.emit(EngineEvent::property(name, PropertyValue::Int(value)))
    }

    pub fn property_flag(&self, name: &str, value: bool) -> DispatchSummary {
        self.emit(EngineEvent::property(name, PropertyValue::Flag(value)))
    }

    pub fn property_text(&self, name: &str, value: &str) -> DispatchSummary {
        self.emit(EngineEvent::property(
            name,
            PropertyValue::Text(value.to_string()),
        ))
    }

    pub fn property_double(&self, name: &str, value: f64) -> DispatchSummary {
        self.emit(EngineEvent::property(name, PropertyValue::Double(value)))
    }

    pub fn lifecycle(&self, code: i32) -> DispatchSummary {
        self.emit(EngineEvent::lifecycle(code))
    }

    pub fn log_message(&self, prefix: &str, level: i32, text: &str) -> DispatchSummary {
        self.emit(EngineEvent::Log(LogLine {
            prefix: prefix.to_string(),
            level,
            text: text.to_string(),
        }))
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("open", &self.is_open())
            .finish()
    }
}
