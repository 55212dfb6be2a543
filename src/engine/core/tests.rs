use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use futures::StreamExt;

use super::*;
use crate::config::EngineOption;
use crate::dispatch::EventObserver;
use crate::engine::backend::{StubBackend, StubBehavior};
use crate::events::{EngineEvent, EngineEventId, PropertyValue};
use crate::playback::TrackKind;
use crate::testing::{wait_until, RecordingObserver};

const WAIT: Duration = Duration::from_secs(2);

fn stub_handle(behavior: StubBehavior) -> (EngineHandle, Arc<RecordingObserver>) {
    let dispatcher = Arc::new(EventDispatcher::new());
    let recorder = Arc::new(RecordingObserver::new());
    dispatcher.register(&recorder);

    let handle = EngineHandle::with_backend(
        Arc::new(StubBackend::with_behavior(behavior)),
        dispatcher,
        BridgeConfig::default(),
    );
    (handle, recorder)
}

fn initialized_handle() -> (EngineHandle, Arc<RecordingObserver>) {
    let (handle, recorder) = stub_handle(StubBehavior::default());
    handle.create(&EngineContext::default()).unwrap();
    handle.init().unwrap();
    (handle, recorder)
}

fn surface(raw: i64) -> SurfaceHandle {
    SurfaceHandle::new(raw).unwrap()
}

/// Round-trip a marker through the event thread so everything queued before
/// it has been dispatched.
fn flush_events(handle: &EngineHandle, recorder: &RecordingObserver, marker: &str) {
    handle.show_text(marker).unwrap();
    assert!(wait_until(WAIT, || recorder
        .log_lines()
        .iter()
        .any(|line| line.text.trim_end() == marker)));
}

#[test]
fn test_lifecycle_transitions() {
    let (handle, _recorder) = stub_handle(StubBehavior::default());
    assert_eq!(handle.state(), SessionState::Uninitialized);

    handle.create(&EngineContext::default()).unwrap();
    assert_eq!(handle.state(), SessionState::Created);

    handle.init().unwrap();
    assert_eq!(handle.state(), SessionState::Initialized);

    handle.destroy().unwrap();
    assert_eq!(handle.state(), SessionState::Destroyed);
}

#[test]
fn test_init_twice_is_invalid_state() {
    let (handle, _recorder) = initialized_handle();

    let err = handle.init().unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidState {
            operation: "init",
            state: SessionState::Initialized,
        }
    );
}

#[test]
fn test_operations_after_destroy_fail() {
    let (handle, _recorder) = initialized_handle();
    handle.destroy().unwrap();

    let destroyed = |operation| EngineError::InvalidState {
        operation,
        state: SessionState::Destroyed,
    };
    assert_eq!(handle.command(&["stop"]).unwrap_err(), destroyed("command"));
    assert_eq!(handle.destroy().unwrap_err(), destroyed("destroy"));
    assert_eq!(handle.init().unwrap_err(), destroyed("init"));
    assert_eq!(
        handle.get_property_int("volume").unwrap_err(),
        destroyed("get_property_int")
    );
    assert_eq!(
        handle.attach_surface(surface(7)).unwrap_err(),
        destroyed("attach_surface")
    );
}

#[test]
fn test_create_with_live_session_fails() {
    let (handle, _recorder) = stub_handle(StubBehavior::default());
    handle.create(&EngineContext::default()).unwrap();

    let err = handle.create(&EngineContext::default()).unwrap_err();
    assert!(matches!(err, EngineError::EngineInitError { .. }));
    assert_eq!(handle.state(), SessionState::Created);
}

#[test]
fn test_destroyed_handle_cannot_be_recreated() {
    let (handle, _recorder) = initialized_handle();
    handle.destroy().unwrap();

    let err = handle.create(&EngineContext::default()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            operation: "create",
            state: SessionState::Destroyed,
        }
    ));
    assert_eq!(handle.state(), SessionState::Destroyed);
    assert!(matches!(
        handle.init(),
        Err(EngineError::InvalidState { .. })
    ));
}

#[test]
fn test_library_loaded_once_per_process() {
    for _ in 0..3 {
        let (handle, _recorder) = initialized_handle();
        handle.destroy().unwrap();
    }
    assert_eq!(StubBackend::library_loads(), 1);
}

#[test]
fn test_commands_require_initialized_session() {
    let (handle, _recorder) = stub_handle(StubBehavior::default());
    handle.create(&EngineContext::default()).unwrap();

    assert_eq!(
        handle.command(&["stop"]).unwrap_err(),
        EngineError::InvalidState {
            operation: "command",
            state: SessionState::Created,
        }
    );
    // Options are the one thing that may be set before init.
    handle.set_option_string("hwdec", "no").unwrap();
}

#[test]
fn test_rejected_option_reports_native_status() {
    let (handle, _recorder) = stub_handle(StubBehavior {
        rejected_options: vec!["vid".to_string()],
        ..Default::default()
    });
    handle.create(&EngineContext::default()).unwrap();

    let err = handle.set_option_string("vid", "no").unwrap_err();
    assert_eq!(
        err,
        EngineError::NativeCallFailure {
            operation: "set_option_string(vid)".to_string(),
            code: status::OPTION_NOT_FOUND,
        }
    );
    assert_eq!(err.status_code(), -5);

    let applied = handle
        .apply_options(&[
            EngineOption::new("vid", "no"),
            EngineOption::new("cache", "yes"),
        ])
        .unwrap();
    assert_eq!(applied, 1);
}

#[test]
fn test_absent_property_is_none_and_dispatches_nothing() {
    let (handle, recorder) = initialized_handle();

    assert_eq!(handle.get_property_int("no-such-property").unwrap(), None);
    assert_eq!(handle.get_property_string("no-such-property").unwrap(), None);

    flush_events(&handle, &recorder, "sync");
    assert!(recorder
        .events()
        .iter()
        .all(|event| !matches!(event, EngineEvent::PropertyChanged { .. })));
}

#[test]
fn test_observe_delivers_initial_value_through_dispatcher() {
    let (handle, recorder) = initialized_handle();

    handle.observe_property("volume", PropertyFormat::Int64).unwrap();
    assert!(wait_until(WAIT, || !recorder.property_values("volume").is_empty()));
    assert_eq!(recorder.property_values("volume"), vec![PropertyValue::Int(100)]);

    handle.observe_property("duration", PropertyFormat::Double).unwrap();
    assert!(wait_until(WAIT, || recorder.property_values("duration")
        == vec![PropertyValue::None]));
}

#[test]
fn test_set_property_notifies_observers_in_order() {
    let (handle, recorder) = initialized_handle();
    handle.observe_property("pause", PropertyFormat::Flag).unwrap();

    handle.set_paused(true).unwrap();
    handle.set_paused(false).unwrap();

    assert!(wait_until(WAIT, || recorder.property_values("pause").len() == 3));
    assert_eq!(
        recorder.property_values("pause"),
        vec![
            PropertyValue::Flag(false),
            PropertyValue::Flag(true),
            PropertyValue::Flag(false),
        ]
    );
}

#[test]
fn test_set_property_int_and_format_errors() {
    let (handle, _recorder) = initialized_handle();

    handle.set_property_int("volume", 55).unwrap();
    assert_eq!(handle.get_property_int("volume").unwrap(), Some(55));

    let err = handle.set_property_string("volume", "loud").unwrap_err();
    assert!(matches!(
        err,
        EngineError::NativeCallFailure { code: status::PROPERTY_FORMAT, .. }
    ));
}

#[test]
fn test_attach_replaces_existing_surface() {
    let (handle, _recorder) = initialized_handle();

    handle.attach_surface(surface(11)).unwrap();
    handle.attach_surface(surface(22)).unwrap();
    assert_eq!(handle.attached_surface(), Some(surface(22)));
    assert_eq!(handle.get_property_int("wid").unwrap(), Some(22));

    handle.detach_surface().unwrap();
    assert_eq!(handle.attached_surface(), None);
    assert_eq!(handle.get_property_int("wid").unwrap(), Some(0));

    // Nothing attached: no-op.
    handle.detach_surface().unwrap();
}

#[test]
fn test_surface_requires_initialized_session() {
    let (handle, _recorder) = stub_handle(StubBehavior::default());
    handle.create(&EngineContext::default()).unwrap();

    assert!(matches!(
        handle.attach_surface(surface(3)),
        Err(EngineError::InvalidState { .. })
    ));
}

#[test]
fn test_destroy_detaches_surface_and_stops_events() {
    let (handle, recorder) = initialized_handle();
    handle.observe_property("time-pos", PropertyFormat::Double).unwrap();
    handle.attach_surface(surface(5)).unwrap();
    handle.load_file("https://example.invalid/a.mkv").unwrap();

    handle.destroy().unwrap();
    assert_eq!(handle.attached_surface(), None);

    let seen = recorder.len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(recorder.len(), seen);
    assert!(!recorder.lifecycle_ids().contains(&EngineEventId::Shutdown));
}

#[test]
fn test_failed_init_leaves_nothing_reachable() {
    let (handle, _recorder) = stub_handle(StubBehavior {
        fail_initialize: true,
        ..Default::default()
    });
    handle.create(&EngineContext::default()).unwrap();

    let err = handle.init().unwrap_err();
    assert!(matches!(err, EngineError::EngineInitError { .. }));
    assert_eq!(handle.state(), SessionState::Uninitialized);
    assert_eq!(
        handle.command(&["stop"]).unwrap_err(),
        EngineError::InvalidState {
            operation: "command",
            state: SessionState::Uninitialized,
        }
    );
    assert!(matches!(
        handle.set_option_string("hwdec", "no"),
        Err(EngineError::InvalidState { .. })
    ));
}

#[test]
fn test_failed_allocation_keeps_handle_uninitialized() {
    let (handle, _recorder) = stub_handle(StubBehavior {
        fail_open: true,
        ..Default::default()
    });

    let err = handle.create(&EngineContext::default()).unwrap_err();
    assert!(matches!(err, EngineError::EngineInitError { .. }));
    assert_eq!(handle.state(), SessionState::Uninitialized);
}

#[test]
fn test_failed_command_is_not_an_error() {
    let (handle, recorder) = initialized_handle();

    handle.command(&["no-such-command"]).unwrap();
    assert!(wait_until(WAIT, || recorder
        .log_lines()
        .iter()
        .any(|line| line.text.contains("no-such-command"))));
}

#[test]
fn test_destroy_from_observer_callback() {
    struct Destroyer {
        handle: Mutex<Option<Arc<EngineHandle>>>,
    }

    impl EventObserver for Destroyer {
        fn on_event(&self, id: EngineEventId) {
            if id == EngineEventId::FileLoaded {
                if let Some(handle) = self.handle.lock().unwrap().take() {
                    handle.destroy().unwrap();
                }
            }
        }
    }

    let (handle, _recorder) = initialized_handle();
    let handle = Arc::new(handle);
    let destroyer = Arc::new(Destroyer {
        handle: Mutex::new(Some(Arc::clone(&handle))),
    });
    handle.dispatcher().register(&destroyer);

    handle.load_file("https://example.invalid/b.mkv").unwrap();
    assert!(wait_until(WAIT, || handle.state() == SessionState::Destroyed));
}

#[test]
fn test_playback_controls() {
    let (handle, recorder) = initialized_handle();
    handle.load_file("https://example.invalid/c.mkv").unwrap();
    assert!(wait_until(WAIT, || recorder
        .lifecycle_ids()
        .contains(&EngineEventId::FileLoaded)));

    assert!(handle.toggle_pause().unwrap());
    assert!(!handle.toggle_pause().unwrap());

    handle.seek_absolute(30.0).unwrap();
    assert_eq!(
        handle.get_property_string("time-pos").unwrap().as_deref(),
        Some("30.000000")
    );
    handle.seek_step(true).unwrap();
    assert_eq!(
        handle.get_property_string("time-pos").unwrap().as_deref(),
        Some("40.000000")
    );
    handle.seek_relative(500.0).unwrap();
    assert_eq!(
        handle.get_property_string("time-pos").unwrap().as_deref(),
        Some("120.000000")
    );

    handle.stop().unwrap();
    let report = handle.end_file_report().unwrap();
    assert_eq!(report.reason, "stop");
    assert_eq!(report.error, "no error");
    assert!(wait_until(WAIT, || recorder
        .lifecycle_ids()
        .contains(&EngineEventId::Idle)));
}

#[test]
fn test_track_selection() {
    let (handle, _recorder) = initialized_handle();
    assert!(handle.track_list().unwrap().is_empty());

    handle.load_file("https://example.invalid/d.mkv").unwrap();
    let tracks = handle.track_list().unwrap();
    assert_eq!(tracks.len(), 4);
    assert_eq!(
        tracks.iter().filter(|t| t.kind == TrackKind::Audio).count(),
        2
    );

    handle.select_track(TrackKind::Audio, 2).unwrap();
    assert_eq!(handle.get_property_string("aid").unwrap().as_deref(), Some("2"));
    handle.disable_track(TrackKind::Sub).unwrap();
    assert_eq!(handle.get_property_string("sid").unwrap().as_deref(), Some("no"));
}

#[test]
fn test_malformed_track_list() {
    let (handle, _recorder) = initialized_handle();
    handle.set_property_string("track-list", "not json").unwrap();

    assert!(matches!(
        handle.track_list(),
        Err(EngineError::MalformedProperty { .. })
    ));
}

#[test]
fn test_start_applies_config() {
    let (handle, recorder) = stub_handle(StubBehavior::default());
    handle.start().unwrap();

    assert_eq!(handle.state(), SessionState::Initialized);
    assert_eq!(
        handle.get_property_string("options/hwdec").unwrap().as_deref(),
        Some("auto")
    );
    assert!(wait_until(WAIT, || recorder.property_values("pause")
        == vec![PropertyValue::Flag(false)]));

    assert_eq!(handle.config().playback.observed_properties.len(), 3);
}

#[tokio::test]
async fn test_subscription_streams_events() {
    let (handle, _recorder) = initialized_handle();
    let mut events = handle.subscribe_events();
    assert_eq!(handle.dispatcher().len(), 2);

    handle.load_file("https://example.invalid/e.mkv").unwrap();

    let loaded = tokio::time::timeout(WAIT, async {
        while let Some(event) = events.next().await {
            if event
                == (EngineEvent::Lifecycle {
                    id: EngineEventId::FileLoaded,
                })
            {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(loaded);

    drop(events);
    assert_eq!(handle.dispatcher().len(), 1);
}

#[test]
fn test_subscription_blocking_recv() {
    let (handle, recorder) = initialized_handle();
    flush_events(&handle, &recorder, "ready");

    let mut events = handle.subscribe_events();
    assert!(events.try_recv().is_none());

    handle.show_text("hello").unwrap();
    let event = events.blocking_recv().unwrap();
    assert!(matches!(event, EngineEvent::Log(line) if line.text == "hello\n"));
}
