//! Integration tests for the engine handle and the event path
//!
//! These run a full session against the desktop stub backend:
//! - session lifecycle driven through the public API
//! - events reaching observers from the engine's own thread
//! - observers calling back into the handle while being notified
//! - error reporting for out-of-order calls

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mpv_bridge::engine::{StubBackend, StubBehavior};
use mpv_bridge::testing::{wait_until, RecordingObserver};
use mpv_bridge::{
    BridgeConfig, EngineContext, EngineError, EngineEventId, EngineHandle, ErrorCode,
    EventDispatcher, EventObserver, PlaybackTracker, PropertyFormat, PropertyValue,
    SessionState, SurfaceHandle,
};

const WAIT: Duration = Duration::from_secs(2);

fn stub_engine() -> EngineHandle {
    EngineHandle::with_backend(
        Arc::new(StubBackend::new()),
        Arc::new(EventDispatcher::new()),
        BridgeConfig::default(),
    )
}

#[test]
fn test_full_session_with_tracker() {
    let engine = stub_engine();
    let tracker = Arc::new(PlaybackTracker::new());
    engine.dispatcher().register(&tracker);

    engine.start().unwrap();
    engine
        .attach_surface(SurfaceHandle::new(0x7f00).unwrap())
        .unwrap();
    engine.load_file("https://example.invalid/movie.mkv").unwrap();

    assert!(wait_until(WAIT, || tracker.snapshot().loaded));
    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.duration, Some(120.0));
    assert_eq!(snapshot.position, Some(0.0));
    assert!(!snapshot.paused);

    engine.seek_absolute(65.0).unwrap();
    engine.set_paused(true).unwrap();
    assert!(wait_until(WAIT, || tracker.snapshot().paused));
    assert!(wait_until(WAIT, || tracker.snapshot().progress_label() == "01:05 / 02:00"));

    engine.stop().unwrap();
    assert!(wait_until(WAIT, || tracker.snapshot().ended));

    engine.destroy().unwrap();
    assert_eq!(engine.state(), SessionState::Destroyed);
    assert_eq!(engine.attached_surface(), None);
}

#[test]
fn test_lifecycle_errors_carry_codes() {
    let engine = stub_engine();

    let err = engine.init().unwrap_err();
    assert_eq!(err.code(), 3001);
    assert!(err.to_string().contains("uninitialized"));

    engine.create(&EngineContext::default()).unwrap();
    let err = engine.create(&EngineContext::default()).unwrap_err();
    assert_eq!(err.code(), 3002);

    engine.init().unwrap();
    engine.destroy().unwrap();
    assert!(matches!(
        engine.show_text("late"),
        Err(EngineError::InvalidState {
            state: SessionState::Destroyed,
            ..
        })
    ));
}

#[test]
fn test_init_failure_is_reported_once_and_cleaned_up() {
    let engine = EngineHandle::with_backend(
        Arc::new(StubBackend::with_behavior(StubBehavior {
            fail_initialize: true,
            ..Default::default()
        })),
        Arc::new(EventDispatcher::new()),
        BridgeConfig::default(),
    );

    let err = engine.start().unwrap_err();
    assert!(matches!(err, EngineError::EngineInitError { .. }));
    assert_eq!(engine.state(), SessionState::Uninitialized);
}

#[test]
fn test_observer_reads_properties_from_callback() {
    struct Reader {
        engine: Arc<EngineHandle>,
        seen: Mutex<Option<Option<i64>>>,
    }

    impl EventObserver for Reader {
        fn on_event(&self, id: EngineEventId) {
            if id == EngineEventId::FileLoaded {
                *self.seen.lock().unwrap() = Some(self.engine.get_property_int("volume").unwrap());
            }
        }
    }

    let engine = Arc::new(stub_engine());
    let reader = Arc::new(Reader {
        engine: Arc::clone(&engine),
        seen: Mutex::new(None),
    });
    engine.dispatcher().register(&reader);

    engine.start().unwrap();
    engine.load_file("https://example.invalid/f.mkv").unwrap();

    assert!(wait_until(WAIT, || reader.seen.lock().unwrap().is_some()));
    assert_eq!(*reader.seen.lock().unwrap(), Some(Some(100)));

    engine.destroy().unwrap();
}

#[test]
fn test_property_changes_arrive_in_order() {
    let engine = stub_engine();
    let recorder = Arc::new(RecordingObserver::new());
    engine.dispatcher().register(&recorder);

    engine.create(&EngineContext::default()).unwrap();
    engine.init().unwrap();
    engine.observe_property("volume", PropertyFormat::Int64).unwrap();
    for volume in 1..=50 {
        engine.set_property_int("volume", volume).unwrap();
    }

    assert!(wait_until(WAIT, || recorder.property_values("volume").len() == 51));
    let values: Vec<i64> = recorder
        .property_values("volume")
        .iter()
        .filter_map(PropertyValue::as_int)
        .collect();
    assert_eq!(values[0], 100);
    assert_eq!(&values[1..], (1..=50).collect::<Vec<_>>().as_slice());

    engine.destroy().unwrap();
}

#[test]
fn test_unregistered_observer_receives_nothing_new() {
    let engine = stub_engine();
    let recorder = Arc::new(RecordingObserver::new());
    let id = engine.dispatcher().register(&recorder);

    engine.start().unwrap();
    assert!(wait_until(WAIT, || !recorder.property_values("pause").is_empty()));

    assert!(engine.dispatcher().unregister(id));
    let seen = recorder.len();
    engine.load_file("https://example.invalid/g.mkv").unwrap();
    engine.show_text("after").unwrap();
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(recorder.len(), seen);
    engine.destroy().unwrap();
}
