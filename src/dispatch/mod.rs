//! EventDispatcher: thread-safe fan-out from the native engine to observers.
//!
//! The native engine calls in from its own threads; application code
//! registers and unregisters observers from any thread. The registered set is
//! the only shared mutable state and sits behind one `Mutex` that is held just
//! long enough to clone a snapshot or swap in a new list. Observer code never
//! runs under that lock, so observers may re-enter the dispatcher freely.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use once_cell::sync::Lazy;

use crate::error::{log_dispatch_error, DispatchError};
use crate::events::{EngineEvent, EngineEventId, LogLine, PropertyValue};

mod sink;

pub use sink::EventSink;

/// Process-wide dispatcher reachable from native trampolines.
static SHARED: Lazy<Arc<EventDispatcher>> = Lazy::new(|| Arc::new(EventDispatcher::new()));

/// Access the process-wide dispatcher.
pub fn shared() -> Arc<EventDispatcher> {
    Arc::clone(&SHARED)
}

/// Capability interface implemented by everything that consumes engine
/// activity.
///
/// Every notification defaults to a no-op so an observer only overrides the
/// kinds it cares about. Notifications arrive on native engine threads.
pub trait EventObserver: Send + Sync {
    /// Property changed and has no value (unavailable or format `none`).
    fn on_property_none(&self, _name: &str) {}

    fn on_property_int(&self, _name: &str, _value: i64) {}

    fn on_property_flag(&self, _name: &str, _value: bool) {}

    fn on_property_text(&self, _name: &str, _value: &str) {}

    fn on_property_double(&self, _name: &str, _value: f64) {}

    /// Lifecycle event carrying the raw native id.
    fn on_event(&self, _id: EngineEventId) {}

    fn on_log(&self, _line: &LogLine) {}
}

/// Identity of one registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone)]
struct Registration {
    id: ObserverId,
    observer: Weak<dyn EventObserver>,
}

/// Outcome of a single dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Observers whose notification returned normally
    pub delivered: usize,
    /// Observers whose notification panicked
    pub failed: usize,
}

/// Registry of observers plus the fan-out logic.
pub struct EventDispatcher {
    registrations: Mutex<Arc<Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add an observer to the active set.
    ///
    /// Only a weak reference is kept: the caller owns the observer and must
    /// unregister it before dropping it. Observers dropped without
    /// unregistering are skipped and pruned.
    pub fn register<O>(&self, observer: &Arc<O>) -> ObserverId
    where
        O: EventObserver + 'static,
    {
        let observer: Arc<dyn EventObserver> = Arc::clone(observer) as Arc<dyn EventObserver>;
        self.register_dyn(&observer)
    }

    /// `register` for observers already erased to `dyn EventObserver`.
    pub fn register_dyn(&self, observer: &Arc<dyn EventObserver>) -> ObserverId {
        let weak = Arc::downgrade(observer);
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut guard = self.lock_registrations();
        let list = Arc::make_mut(&mut guard);
        list.retain(|reg| reg.observer.strong_count() > 0);
        list.push(Registration { id, observer: weak });

        log::debug!("[EventDispatcher] Registered observer {}", id.0);
        id
    }

    /// Remove an observer. Idempotent: returns `false` if it was not present.
    ///
    /// Once this returns, dispatch calls that start afterwards will not reach
    /// the observer. A dispatch that already took its snapshot may still
    /// deliver to it.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut guard = self.lock_registrations();
        if !guard.iter().any(|reg| reg.id == id) {
            return false;
        }

        let list = Arc::make_mut(&mut guard);
        list.retain(|reg| reg.id != id && reg.observer.strong_count() > 0);

        log::debug!("[EventDispatcher] Unregistered observer {}", id.0);
        true
    }

    /// Number of live registered observers.
    pub fn len(&self) -> usize {
        self.lock_registrations()
            .iter()
            .filter(|reg| reg.observer.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every observer registered when the call begins.
    ///
    /// Observers run in registration order for this call. A panicking
    /// observer is contained and logged; the remaining observers still
    /// receive the event.
    pub fn dispatch(&self, event: &EngineEvent) -> DispatchSummary {
        let snapshot = self.snapshot();
        let mut summary = DispatchSummary::default();

        for reg in snapshot.iter() {
            let Some(observer) = reg.observer.upgrade() else {
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                deliver(observer.as_ref(), event);
            }));

            match outcome {
                Ok(()) => summary.delivered += 1,
                Err(payload) => {
                    summary.failed += 1;
                    let err = DispatchError::ObserverPanicked {
                        observer: reg.id.0,
                        event: event.describe(),
                        message: panic_message(payload.as_ref()),
                    };
                    log_dispatch_error(&err, "dispatch");
                }
            }
        }

        summary
    }

    fn snapshot(&self) -> Arc<Vec<Registration>> {
        Arc::clone(&self.lock_registrations())
    }

    /// The lock only guards a list swap, so a poisoned lock still holds a
    /// consistent list and is recovered rather than reported.
    fn lock_registrations(&self) -> MutexGuard<'_, Arc<Vec<Registration>>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.len())
            .finish()
    }
}

fn deliver(observer: &dyn EventObserver, event: &EngineEvent) {
    match event {
        EngineEvent::PropertyChanged { name, value } => match value {
            PropertyValue::None => observer.on_property_none(name),
            PropertyValue::Int(v) => observer.on_property_int(name, *v),
            PropertyValue::Flag(v) => observer.on_property_flag(name, *v),
            PropertyValue::Text(v) => observer.on_property_text(name, v),
            PropertyValue::Double(v) => observer.on_property_double(name, *v),
        },
        EngineEvent::Lifecycle { id } => observer.on_event(*id),
        EngineEvent::Log(line) => observer.on_log(line),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
