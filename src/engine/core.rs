//! EngineHandle: owner of the native playback session.
//!
//! Sequences the session lifecycle and serializes every native call behind a
//! single mutex. Native events never pass through here; the backend pushes
//! them straight into the `EventSink` handed out at `create` time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::OnceCell;

use crate::config::BridgeConfig;
use crate::dispatch::{self, EventDispatcher, EventSink};
use crate::engine::backend::{
    default_backend, status, EngineBackend, EngineContext, NativeSession, SurfaceHandle,
};
use crate::error::{log_engine_error, EngineError};
use crate::events::PropertyFormat;

#[path = "core_controls.rs"]
mod core_controls;
#[path = "core_subscriptions.rs"]
mod core_subscriptions;

pub use core_subscriptions::EventSubscription;

/// Native library load, shared by every handle in the process.
static LIBRARY: OnceCell<()> = OnceCell::new();

const INITIALIZED: &[SessionState] = &[SessionState::Initialized];
const CONFIGURABLE: &[SessionState] = &[SessionState::Created, SessionState::Initialized];

/// Lifecycle of the native session owned by an `EngineHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Created,
    Initialized,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Created => "created",
            SessionState::Initialized => "initialized",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

struct SessionSlot {
    state: SessionState,
    native: Option<Box<dyn NativeSession>>,
    surface: Option<SurfaceHandle>,
    sink: Option<EventSink>,
}

impl SessionSlot {
    fn native(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut (dyn NativeSession + 'static), EngineError> {
        let state = self.state;
        self.native
            .as_deref_mut()
            .ok_or(EngineError::InvalidState { operation, state })
    }

    /// Detach the live session and close its sink so nothing more is
    /// dispatched. The caller tears the native side down after unlocking.
    fn take_session(&mut self, next: SessionState) -> Teardown {
        if let Some(sink) = &self.sink {
            sink.close();
        }
        self.state = next;
        Teardown {
            native: self.native.take(),
            surface: self.surface.take(),
            sink: self.sink.take(),
        }
    }
}

struct Teardown {
    native: Option<Box<dyn NativeSession>>,
    surface: Option<SurfaceHandle>,
    sink: Option<EventSink>,
}

impl Teardown {
    fn run(self) {
        if let Some(mut native) = self.native {
            if self.surface.is_some() {
                let rc = native.detach_surface();
                if rc != status::SUCCESS {
                    log::warn!("[EngineHandle] Surface detach during teardown returned {}", rc);
                }
            }
            native.destroy();
        }
        drop(self.sink);
    }
}

/// EngineHandle owns at most one native session at a time.
pub struct EngineHandle {
    backend: Arc<dyn EngineBackend>,
    dispatcher: Arc<EventDispatcher>,
    config: BridgeConfig,
    session: Mutex<SessionSlot>,
}

impl EngineHandle {
    /// Create a handle with the platform backend, the process-wide dispatcher
    /// and the platform configuration.
    pub fn new() -> Self {
        Self::with_backend(default_backend(), dispatch::shared(), Self::load_platform_config())
    }

    pub fn with_backend(
        backend: Arc<dyn EngineBackend>,
        dispatcher: Arc<EventDispatcher>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            config,
            session: Mutex::new(SessionSlot {
                state: SessionState::Uninitialized,
                native: None,
                surface: None,
                sink: None,
            }),
        }
    }

    fn load_platform_config() -> BridgeConfig {
        #[cfg(target_os = "android")]
        {
            BridgeConfig::load_android()
        }

        #[cfg(not(target_os = "android"))]
        {
            BridgeConfig::load()
        }
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, SessionSlot>, EngineError> {
        self.session.lock().map_err(|_| EngineError::LockPoisoned {
            component: "EngineHandle session".to_string(),
        })
    }

    /// Lock the session, requiring one of `allowed` states.
    fn session(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<MutexGuard<'_, SessionSlot>, EngineError> {
        let slot = self.lock_session()?;
        if allowed.contains(&slot.state) {
            Ok(slot)
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: slot.state,
            })
        }
    }

    fn check_status(operation: &str, rc: i32) -> Result<(), EngineError> {
        if rc == status::SUCCESS {
            Ok(())
        } else {
            let err = EngineError::NativeCallFailure {
                operation: operation.to_string(),
                code: rc,
            };
            log_engine_error(&err, operation);
            Err(err)
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Allocate a native session.
    ///
    /// Legal only from `Uninitialized`. A destroyed handle stays destroyed;
    /// callers that need another session build another handle. The native
    /// library is loaded the first time any handle gets here.
    pub fn create(&self, context: &EngineContext) -> Result<(), EngineError> {
        let mut slot = self.lock_session()?;
        match slot.state {
            SessionState::Uninitialized => {}
            SessionState::Destroyed => {
                return Err(EngineError::InvalidState {
                    operation: "create",
                    state: SessionState::Destroyed,
                })
            }
            state => {
                return Err(EngineError::EngineInitError {
                    reason: format!("a session is already {}", state),
                })
            }
        }

        LIBRARY
            .get_or_try_init(|| self.backend.load_library())
            .map_err(|err| {
                log_engine_error(&err, "create");
                err
            })?;

        let sink = EventSink::new(Arc::clone(&self.dispatcher));
        let native = self.backend.open(context, sink.clone()).map_err(|err| {
            log_engine_error(&err, "create");
            err
        })?;

        slot.native = Some(native);
        slot.sink = Some(sink);
        slot.surface = None;
        slot.state = SessionState::Created;

        log::info!(
            "[EngineHandle] Session created (log level {})",
            context.log_level.as_request_str()
        );
        Ok(())
    }

    /// Initialize the created session.
    ///
    /// On native failure the session is torn down and the handle goes back to
    /// `Uninitialized`.
    pub fn init(&self) -> Result<(), EngineError> {
        let mut slot = self.session("init", &[SessionState::Created])?;
        let rc = slot.native("init")?.initialize();

        if rc == status::SUCCESS {
            slot.state = SessionState::Initialized;
            log::info!("[EngineHandle] Session initialized");
            return Ok(());
        }

        let teardown = slot.take_session(SessionState::Uninitialized);
        drop(slot);
        teardown.run();

        let err = EngineError::EngineInitError {
            reason: format!("native initialize returned {}", rc),
        };
        log_engine_error(&err, "init");
        Err(err)
    }

    /// Release the session.
    ///
    /// The sink is closed before anything else, so once this returns no more
    /// events reach the dispatcher. Native teardown runs without holding the
    /// session lock because it waits for the engine's event thread, and that
    /// thread may be inside an observer calling back into this handle.
    pub fn destroy(&self) -> Result<(), EngineError> {
        let teardown = {
            let mut slot = self.session("destroy", CONFIGURABLE)?;
            slot.take_session(SessionState::Destroyed)
        };
        teardown.run();

        log::info!("[EngineHandle] Session destroyed");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        match self.session.lock() {
            Ok(slot) => slot.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    // ========================================================================
    // SURFACE
    // ========================================================================

    /// Bind a rendering surface, replacing any surface already attached.
    pub fn attach_surface(&self, surface: SurfaceHandle) -> Result<(), EngineError> {
        let mut slot = self.session("attach_surface", INITIALIZED)?;

        if let Some(previous) = slot.surface.take() {
            let rc = slot.native("attach_surface")?.detach_surface();
            log::debug!(
                "[EngineHandle] Replacing surface {} (detach returned {})",
                previous.raw(),
                rc
            );
        }

        let rc = slot.native("attach_surface")?.attach_surface(surface);
        Self::check_status("attach_surface", rc)?;
        slot.surface = Some(surface);
        Ok(())
    }

    /// Unbind the rendering surface. No-op when nothing is attached.
    pub fn detach_surface(&self) -> Result<(), EngineError> {
        let mut slot = self.session("detach_surface", INITIALIZED)?;
        if slot.surface.is_none() {
            return Ok(());
        }

        let rc = slot.native("detach_surface")?.detach_surface();
        slot.surface = None;
        Self::check_status("detach_surface", rc)
    }

    pub fn attached_surface(&self) -> Option<SurfaceHandle> {
        self.lock_session().ok().and_then(|slot| slot.surface)
    }

    // ========================================================================
    // COMMANDS AND PROPERTIES
    // ========================================================================

    /// Issue a control command. Fire-and-forget: a native failure is logged
    /// and shows up later as property state or log lines.
    pub fn command(&self, args: &[&str]) -> Result<(), EngineError> {
        let mut slot = self.session("command", INITIALIZED)?;
        let rc = slot.native("command")?.command(args);
        if rc != status::SUCCESS {
            log::warn!("[EngineHandle] Command {:?} returned status {}", args, rc);
        }
        Ok(())
    }

    /// Set an engine option. Legal before and after `init`.
    pub fn set_option_string(&self, name: &str, value: &str) -> Result<(), EngineError> {
        let mut slot = self.session("set_option_string", CONFIGURABLE)?;
        let rc = slot.native("set_option_string")?.set_option_string(name, value);
        Self::check_status(&format!("set_option_string({})", name), rc)
    }

    /// Current string value, or `None` if the property does not exist.
    pub fn get_property_string(&self, name: &str) -> Result<Option<String>, EngineError> {
        let mut slot = self.session("get_property_string", INITIALIZED)?;
        Ok(slot.native("get_property_string")?.get_property_string(name))
    }

    pub fn set_property_string(&self, name: &str, value: &str) -> Result<(), EngineError> {
        let mut slot = self.session("set_property_string", INITIALIZED)?;
        let rc = slot
            .native("set_property_string")?
            .set_property_string(name, value);
        Self::check_status(&format!("set_property_string({})", name), rc)
    }

    /// Current integer value, or `None` if the property does not exist.
    pub fn get_property_int(&self, name: &str) -> Result<Option<i64>, EngineError> {
        let mut slot = self.session("get_property_int", INITIALIZED)?;
        Ok(slot.native("get_property_int")?.get_property_int(name))
    }

    pub fn set_property_int(&self, name: &str, value: i64) -> Result<(), EngineError> {
        let mut slot = self.session("set_property_int", INITIALIZED)?;
        let rc = slot.native("set_property_int")?.set_property_int(name, value);
        Self::check_status(&format!("set_property_int({})", name), rc)
    }

    /// Ask the engine to report changes of `name`. The first value arrives
    /// through the dispatcher, never as a return value.
    pub fn observe_property(&self, name: &str, format: PropertyFormat) -> Result<(), EngineError> {
        let mut slot = self.session("observe_property", INITIALIZED)?;
        let rc = slot.native("observe_property")?.observe_property(name, format);
        Self::check_status(&format!("observe_property({})", name), rc)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Session context derived from the configuration.
    pub fn context(&self) -> EngineContext {
        EngineContext {
            log_level: self.config.engine.log_level,
        }
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let slot = match self.session.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.native.is_some() {
            slot.take_session(SessionState::Destroyed).run();
        }
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("state", &self.state())
            .field("surface", &self.attached_surface())
            .finish()
    }
}

#[cfg(test)]
mod tests;
