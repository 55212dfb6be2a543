//! Process-wide engine slot for callers that outlive a single session.
//!
//! A destroyed `EngineHandle` stays destroyed. Platform layers that keep
//! creating sessions for the lifetime of the process (the JNI facade) hold a
//! `SharedEngine`, which swaps in a freshly built handle when the previous one
//! has been destroyed. Handles built by the default factory all report to
//! `dispatch::shared()`, so registered observers carry over.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::backend::SurfaceHandle;
use super::core::{EngineHandle, SessionState};
use crate::error::EngineError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SharedEngine {
    current: Mutex<Option<Arc<EngineHandle>>>,
    factory: fn() -> EngineHandle,
}

impl SharedEngine {
    pub const fn new(factory: fn() -> EngineHandle) -> Self {
        Self {
            current: Mutex::new(None),
            factory,
        }
    }

    /// Handle currently in place, building the first one on demand.
    pub fn current(&self) -> Arc<EngineHandle> {
        let mut current = lock(&self.current);
        Arc::clone(current.get_or_insert_with(|| Arc::new((self.factory)())))
    }

    /// Handle a new session should be created on.
    ///
    /// Returns the current handle unless it has been destroyed, in which case
    /// it is replaced by a new one. Callers still holding the old handle keep
    /// getting `InvalidState` from it.
    pub fn renew(&self) -> Arc<EngineHandle> {
        let mut current = lock(&self.current);
        match current.as_ref() {
            Some(handle) if handle.state() != SessionState::Destroyed => Arc::clone(handle),
            _ => {
                if current.is_some() {
                    log::info!("[SharedEngine] Replacing destroyed engine handle");
                }
                let handle = Arc::new((self.factory)());
                *current = Some(Arc::clone(&handle));
                handle
            }
        }
    }
}

/// Platform object backing the surface the engine renders to.
///
/// Kept in step with `EngineHandle::attached_surface`: the token is held
/// exactly as long as the engine reports a bound surface.
pub struct SurfaceBinding<T> {
    bound: Mutex<Option<T>>,
}

impl<T> SurfaceBinding<T> {
    pub const fn new() -> Self {
        Self {
            bound: Mutex::new(None),
        }
    }

    /// Attach `surface` and keep `token` alive while it is bound.
    ///
    /// A failed attach may already have unbound the previous surface, so the
    /// previous token is released whenever the engine ends up with nothing
    /// attached.
    pub fn attach(
        &self,
        engine: &EngineHandle,
        surface: SurfaceHandle,
        token: T,
    ) -> Result<(), EngineError> {
        let mut bound = lock(&self.bound);
        match engine.attach_surface(surface) {
            Ok(()) => {
                *bound = Some(token);
                Ok(())
            }
            Err(err) => {
                if engine.attached_surface().is_none() {
                    bound.take();
                }
                Err(err)
            }
        }
    }

    pub fn detach(&self, engine: &EngineHandle) -> Result<(), EngineError> {
        let mut bound = lock(&self.bound);
        let result = engine.detach_surface();
        if engine.attached_surface().is_none() {
            bound.take();
        }
        result
    }

    /// Drop the token after the session released the surface on its own.
    pub fn clear(&self) -> Option<T> {
        lock(&self.bound).take()
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.bound).is_some()
    }
}

impl<T> Default for SurfaceBinding<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::dispatch::EventDispatcher;
    use crate::engine::backend::{EngineContext, StubBackend, StubBehavior};

    fn stub_engine() -> EngineHandle {
        EngineHandle::with_backend(
            Arc::new(StubBackend::new()),
            Arc::new(EventDispatcher::new()),
            BridgeConfig::default(),
        )
    }

    fn picky_engine() -> EngineHandle {
        EngineHandle::with_backend(
            Arc::new(StubBackend::with_behavior(StubBehavior {
                rejected_surfaces: vec![0xbad],
                ..Default::default()
            })),
            Arc::new(EventDispatcher::new()),
            BridgeConfig::default(),
        )
    }

    fn surface(raw: i64) -> SurfaceHandle {
        SurfaceHandle::new(raw).unwrap()
    }

    #[test]
    fn test_current_is_stable_until_renewed() {
        let shared = SharedEngine::new(stub_engine);
        let first = shared.current();
        assert!(Arc::ptr_eq(&first, &shared.current()));
        assert!(Arc::ptr_eq(&first, &shared.renew()));
    }

    #[test]
    fn test_renew_replaces_destroyed_handle() {
        let shared = SharedEngine::new(stub_engine);
        let first = shared.renew();
        first.create(&EngineContext::default()).unwrap();
        first.init().unwrap();
        first.destroy().unwrap();

        let second = shared.renew();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.state(), SessionState::Uninitialized);
        second.create(&EngineContext::default()).unwrap();
        second.init().unwrap();
        assert!(Arc::ptr_eq(&second, &shared.current()));

        // The old handle stays terminal.
        assert!(matches!(
            first.create(&EngineContext::default()),
            Err(EngineError::InvalidState { .. })
        ));
        second.destroy().unwrap();
    }

    #[test]
    fn test_failed_replace_releases_previous_token() {
        let engine = picky_engine();
        engine.create(&EngineContext::default()).unwrap();
        engine.init().unwrap();

        let binding = SurfaceBinding::new();
        binding.attach(&engine, surface(0x10), "first").unwrap();
        assert!(binding.is_bound());

        let err = binding.attach(&engine, surface(0xbad), "second").unwrap_err();
        assert!(matches!(err, EngineError::NativeCallFailure { .. }));
        assert_eq!(engine.attached_surface(), None);
        assert!(!binding.is_bound());

        engine.destroy().unwrap();
    }

    #[test]
    fn test_binding_follows_engine() {
        let engine = stub_engine();
        let binding = SurfaceBinding::new();

        // Not initialized yet: nothing gets bound.
        assert!(binding.attach(&engine, surface(0x10), 1).is_err());
        assert!(!binding.is_bound());

        engine.create(&EngineContext::default()).unwrap();
        engine.init().unwrap();
        binding.attach(&engine, surface(0x10), 1).unwrap();
        binding.attach(&engine, surface(0x20), 2).unwrap();
        assert_eq!(engine.attached_surface(), Some(surface(0x20)));

        binding.detach(&engine).unwrap();
        assert!(!binding.is_bound());
        assert_eq!(engine.attached_surface(), None);

        binding.attach(&engine, surface(0x30), 3).unwrap();
        engine.destroy().unwrap();
        assert_eq!(binding.clear(), Some(3));
    }
}
