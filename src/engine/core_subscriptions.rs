use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::dispatch::{EventDispatcher, EventObserver, ObserverId};
use crate::events::{EngineEvent, EngineEventId, LogLine, PropertyValue};

use super::EngineHandle;

/// Observer that forwards every notification into a channel.
struct ChannelObserver {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelObserver {
    fn send(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl EventObserver for ChannelObserver {
    fn on_property_none(&self, name: &str) {
        self.send(EngineEvent::property(name, PropertyValue::None));
    }

    fn on_property_int(&self, name: &str, value: i64) {
        self.send(EngineEvent::property(name, PropertyValue::Int(value)));
    }

    fn on_property_flag(&self, name: &str, value: bool) {
        self.send(EngineEvent::property(name, PropertyValue::Flag(value)));
    }

    fn on_property_text(&self, name: &str, value: &str) {
        self.send(EngineEvent::property(
            name,
            PropertyValue::Text(value.to_string()),
        ));
    }

    fn on_property_double(&self, name: &str, value: f64) {
        self.send(EngineEvent::property(name, PropertyValue::Double(value)));
    }

    fn on_event(&self, id: EngineEventId) {
        self.send(EngineEvent::Lifecycle { id });
    }

    fn on_log(&self, line: &LogLine) {
        self.send(EngineEvent::Log(line.clone()));
    }
}

/// Channel-backed view of the event stream.
///
/// Registered with the dispatcher for as long as it lives; dropping it
/// unregisters.
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    id: ObserverId,
    dispatcher: Arc<EventDispatcher>,
    _observer: Arc<ChannelObserver>,
}

impl EventSubscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    /// Block the current thread for the next event. Must not be called from
    /// inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<EngineEvent> {
        self.rx.blocking_recv()
    }
}

impl Stream for EventSubscription {
    type Item = EngineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.dispatcher.unregister(self.id);
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .finish()
    }
}

impl EngineHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Subscribe to every event this handle's dispatcher delivers.
    pub fn subscribe_events(&self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Arc::new(ChannelObserver { tx });
        let id = self.dispatcher().register(&observer);

        EventSubscription {
            rx,
            id,
            dispatcher: Arc::clone(self.dispatcher()),
            _observer: observer,
        }
    }
}
