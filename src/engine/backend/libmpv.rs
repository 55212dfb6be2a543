//! libmpv client API backend.
//!
//! Thin FFI over the handful of client calls the bridge needs. The client API
//! is thread-safe, so the raw handle is shared between the session (driven by
//! `EngineHandle` under its lock) and the event pump thread, which owns the
//! only blocking call: `mpv_wait_event`.

use std::ffi::{c_char, c_double, c_int, c_ulong, c_void, CStr, CString};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::dispatch::EventSink;
use crate::error::EngineError;
use crate::events::{EngineEvent, EngineEventId, PropertyFormat, PropertyValue};

use super::{status, EngineBackend, EngineContext, NativeSession, SurfaceHandle};

#[repr(C)]
struct mpv_handle {
    _private: [u8; 0],
}

#[repr(C)]
struct mpv_event {
    event_id: c_int,
    error: c_int,
    reply_userdata: u64,
    data: *mut c_void,
}

#[repr(C)]
struct mpv_event_property {
    name: *const c_char,
    format: c_int,
    data: *mut c_void,
}

#[repr(C)]
struct mpv_event_log_message {
    prefix: *const c_char,
    level: *const c_char,
    text: *const c_char,
    log_level: c_int,
}

const MPV_FORMAT_STRING: c_int = 1;
const MPV_FORMAT_OSD_STRING: c_int = 2;
const MPV_FORMAT_FLAG: c_int = 3;
const MPV_FORMAT_INT64: c_int = 4;
const MPV_FORMAT_DOUBLE: c_int = 5;

const MPV_EVENT_PROPERTY_CHANGE: c_int = 22;

#[link(name = "mpv")]
extern "C" {
    fn mpv_client_api_version() -> c_ulong;
    fn mpv_create() -> *mut mpv_handle;
    fn mpv_initialize(ctx: *mut mpv_handle) -> c_int;
    fn mpv_terminate_destroy(ctx: *mut mpv_handle);
    fn mpv_request_log_messages(ctx: *mut mpv_handle, min_level: *const c_char) -> c_int;
    fn mpv_command(ctx: *mut mpv_handle, args: *mut *const c_char) -> c_int;
    fn mpv_set_option(
        ctx: *mut mpv_handle,
        name: *const c_char,
        format: c_int,
        data: *mut c_void,
    ) -> c_int;
    fn mpv_set_option_string(
        ctx: *mut mpv_handle,
        name: *const c_char,
        data: *const c_char,
    ) -> c_int;
    fn mpv_get_property(
        ctx: *mut mpv_handle,
        name: *const c_char,
        format: c_int,
        data: *mut c_void,
    ) -> c_int;
    fn mpv_get_property_string(ctx: *mut mpv_handle, name: *const c_char) -> *mut c_char;
    fn mpv_set_property(
        ctx: *mut mpv_handle,
        name: *const c_char,
        format: c_int,
        data: *mut c_void,
    ) -> c_int;
    fn mpv_set_property_string(
        ctx: *mut mpv_handle,
        name: *const c_char,
        data: *const c_char,
    ) -> c_int;
    fn mpv_observe_property(
        ctx: *mut mpv_handle,
        reply_userdata: u64,
        name: *const c_char,
        format: c_int,
    ) -> c_int;
    fn mpv_wait_event(ctx: *mut mpv_handle, timeout: c_double) -> *mut mpv_event;
    fn mpv_wakeup(ctx: *mut mpv_handle);
    fn mpv_free(data: *mut c_void);
}

#[cfg(target_os = "android")]
#[link(name = "avcodec")]
extern "C" {
    fn av_jni_set_java_vm(vm: *mut c_void, log_ctx: *mut c_void) -> c_int;
}

/// Owned client handle; destroyed when the last holder lets go.
struct MpvContext(NonNull<mpv_handle>);

// SAFETY: the libmpv client API may be called from any thread.
unsafe impl Send for MpvContext {}
unsafe impl Sync for MpvContext {}

impl MpvContext {
    fn as_ptr(&self) -> *mut mpv_handle {
        self.0.as_ptr()
    }
}

impl Drop for MpvContext {
    fn drop(&mut self) {
        // SAFETY: the handle came from mpv_create and this is the last owner.
        unsafe { mpv_terminate_destroy(self.as_ptr()) };
    }
}

/// Backend driving the linked libmpv.
#[derive(Debug, Default)]
pub struct LibMpvBackend {
    _unit: (),
}

impl LibMpvBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineBackend for LibMpvBackend {
    fn load_library(&self) -> Result<(), EngineError> {
        // SAFETY: plain version query, no arguments.
        let version = unsafe { mpv_client_api_version() };
        let major = version >> 16;
        if !(1..=2).contains(&major) {
            return Err(EngineError::EngineInitError {
                reason: format!("unsupported libmpv client API {}.{}", major, version & 0xffff),
            });
        }

        #[cfg(target_os = "android")]
        {
            let vm = ndk_context::android_context().vm();
            if vm.is_null() {
                return Err(EngineError::EngineInitError {
                    reason: "Java VM not available for hardware decoding".to_string(),
                });
            }
            // SAFETY: vm is the process JavaVM published by the JNI layer.
            unsafe { av_jni_set_java_vm(vm, std::ptr::null_mut()) };
        }

        tracing::info!(
            "[LibMpvBackend] libmpv client API {}.{} loaded",
            major,
            version & 0xffff
        );
        Ok(())
    }

    fn open(
        &self,
        context: &EngineContext,
        events: EventSink,
    ) -> Result<Box<dyn NativeSession>, EngineError> {
        // SAFETY: mpv_create has no preconditions and returns null on failure.
        let raw = unsafe { mpv_create() };
        let handle = NonNull::new(raw).ok_or_else(|| EngineError::EngineInitError {
            reason: "mpv_create returned null".to_string(),
        })?;
        let ctx = Arc::new(MpvContext(handle));

        let level = CString::new(context.log_level.as_request_str()).map_err(|err| {
            EngineError::EngineInitError {
                reason: err.to_string(),
            }
        })?;
        // SAFETY: ctx is live, level is NUL-terminated.
        let rc = unsafe { mpv_request_log_messages(ctx.as_ptr(), level.as_ptr()) };
        if rc < 0 {
            tracing::warn!("[LibMpvBackend] Log message request rejected: {}", rc);
        }

        Ok(Box::new(MpvSession {
            ctx,
            events,
            stop: Arc::new(AtomicBool::new(false)),
            pump: None,
        }))
    }
}

struct MpvSession {
    ctx: Arc<MpvContext>,
    events: EventSink,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl MpvSession {
    fn spawn_pump(&mut self) -> std::io::Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let sink = self.events.clone();
        let stop = Arc::clone(&self.stop);

        let pump = thread::Builder::new()
            .name("mpv-events".to_string())
            .spawn(move || pump_events(ctx, sink, stop))?;
        self.pump = Some(pump);
        Ok(())
    }

    fn set_int(&mut self, name: &str, value: i64, option: bool) -> i32 {
        let Ok(name) = CString::new(name) else {
            return status::INVALID_PARAMETER;
        };
        let mut value = value;
        let data = &mut value as *mut i64 as *mut c_void;
        // SAFETY: ctx is live; data points to an i64 matching MPV_FORMAT_INT64.
        unsafe {
            if option {
                mpv_set_option(self.ctx.as_ptr(), name.as_ptr(), MPV_FORMAT_INT64, data)
            } else {
                mpv_set_property(self.ctx.as_ptr(), name.as_ptr(), MPV_FORMAT_INT64, data)
            }
        }
    }
}

impl NativeSession for MpvSession {
    fn initialize(&mut self) -> i32 {
        // SAFETY: ctx is live and not yet initialized.
        let rc = unsafe { mpv_initialize(self.ctx.as_ptr()) };
        if rc < 0 {
            return rc;
        }
        if let Err(err) = self.spawn_pump() {
            tracing::error!("[LibMpvBackend] Failed to spawn event thread: {}", err);
            return status::NOMEM;
        }
        status::SUCCESS
    }

    fn destroy(mut self: Box<Self>) {
        self.stop.store(true, Ordering::Release);
        // SAFETY: ctx is live; wakeup is sticky if the pump is not waiting yet.
        unsafe { mpv_wakeup(self.ctx.as_ptr()) };

        if let Some(pump) = self.pump.take() {
            // From the pump itself the thread exits on its own and drops the
            // last context reference on the way out.
            if thread::current().id() != pump.thread().id() {
                let _ = pump.join();
            }
        }
    }

    fn attach_surface(&mut self, surface: SurfaceHandle) -> i32 {
        self.set_int("wid", surface.raw(), true)
    }

    fn detach_surface(&mut self) -> i32 {
        self.set_int("wid", 0, true)
    }

    fn command(&mut self, args: &[&str]) -> i32 {
        let owned: Result<Vec<CString>, _> = args.iter().map(|a| CString::new(*a)).collect();
        let Ok(owned) = owned else {
            return status::INVALID_PARAMETER;
        };
        let mut ptrs: Vec<*const c_char> = owned.iter().map(|a| a.as_ptr()).collect();
        ptrs.push(std::ptr::null());

        // SAFETY: ptrs is a NULL-terminated array of live C strings.
        unsafe { mpv_command(self.ctx.as_ptr(), ptrs.as_mut_ptr()) }
    }

    fn set_option_string(&mut self, name: &str, value: &str) -> i32 {
        let (Ok(name), Ok(value)) = (CString::new(name), CString::new(value)) else {
            return status::INVALID_PARAMETER;
        };
        // SAFETY: ctx is live, both strings are NUL-terminated.
        unsafe { mpv_set_option_string(self.ctx.as_ptr(), name.as_ptr(), value.as_ptr()) }
    }

    fn get_property_string(&mut self, name: &str) -> Option<String> {
        let name = CString::new(name).ok()?;
        // SAFETY: ctx is live; a non-null result is freed with mpv_free below.
        unsafe {
            let raw = mpv_get_property_string(self.ctx.as_ptr(), name.as_ptr());
            if raw.is_null() {
                return None;
            }
            let value = CStr::from_ptr(raw).to_string_lossy().into_owned();
            mpv_free(raw as *mut c_void);
            Some(value)
        }
    }

    fn set_property_string(&mut self, name: &str, value: &str) -> i32 {
        let (Ok(name), Ok(value)) = (CString::new(name), CString::new(value)) else {
            return status::INVALID_PARAMETER;
        };
        // SAFETY: ctx is live, both strings are NUL-terminated.
        unsafe { mpv_set_property_string(self.ctx.as_ptr(), name.as_ptr(), value.as_ptr()) }
    }

    fn get_property_int(&mut self, name: &str) -> Option<i64> {
        let name = CString::new(name).ok()?;
        let mut value: i64 = 0;
        // SAFETY: ctx is live; value matches MPV_FORMAT_INT64.
        let rc = unsafe {
            mpv_get_property(
                self.ctx.as_ptr(),
                name.as_ptr(),
                MPV_FORMAT_INT64,
                &mut value as *mut i64 as *mut c_void,
            )
        };
        (rc >= 0).then_some(value)
    }

    fn set_property_int(&mut self, name: &str, value: i64) -> i32 {
        self.set_int(name, value, false)
    }

    fn observe_property(&mut self, name: &str, format: PropertyFormat) -> i32 {
        let Ok(name) = CString::new(name) else {
            return status::INVALID_PARAMETER;
        };
        // SAFETY: ctx is live, name is NUL-terminated.
        unsafe { mpv_observe_property(self.ctx.as_ptr(), 0, name.as_ptr(), format.raw()) }
    }
}

fn pump_events(ctx: Arc<MpvContext>, sink: EventSink, stop: Arc<AtomicBool>) {
    tracing::debug!("[LibMpvBackend] Event thread started");

    while !stop.load(Ordering::Acquire) {
        // SAFETY: ctx is live for the whole loop; mpv_wait_event never
        // returns null and the event stays valid until the next wait.
        let event = unsafe { &*mpv_wait_event(ctx.as_ptr(), -1.0) };

        match event.event_id {
            EngineEventId::NONE => continue,
            EngineEventId::SHUTDOWN => {
                sink.lifecycle(EngineEventId::SHUTDOWN);
                break;
            }
            EngineEventId::LOG_MESSAGE => unsafe { forward_log(&sink, event.data) },
            MPV_EVENT_PROPERTY_CHANGE => unsafe { forward_property(&sink, event.data) },
            other => {
                sink.lifecycle(other);
            }
        }
    }

    tracing::debug!("[LibMpvBackend] Event thread stopped");
}

unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

unsafe fn forward_log(sink: &EventSink, data: *mut c_void) {
    let Some(msg) = (data as *const mpv_event_log_message).as_ref() else {
        return;
    };
    sink.log_message(&c_string(msg.prefix), msg.log_level, &c_string(msg.text));
}

unsafe fn forward_property(sink: &EventSink, data: *mut c_void) {
    let Some(prop) = (data as *const mpv_event_property).as_ref() else {
        return;
    };
    let name = c_string(prop.name);
    sink.emit(EngineEvent::property(name, decode_property(prop.format, prop.data)));
}

/// Read a property payload in the representation `format` names.
///
/// # Safety
/// `data` is null or points to a value of the type `format` describes.
unsafe fn decode_property(format: c_int, data: *const c_void) -> PropertyValue {
    if data.is_null() {
        return PropertyValue::None;
    }

    match format {
        MPV_FORMAT_STRING | MPV_FORMAT_OSD_STRING => {
            PropertyValue::Text(c_string(*(data as *const *const c_char)))
        }
        MPV_FORMAT_FLAG => PropertyValue::Flag(*(data as *const c_int) != 0),
        MPV_FORMAT_INT64 => PropertyValue::Int(*(data as *const i64)),
        MPV_FORMAT_DOUBLE => PropertyValue::Double(*(data as *const f64)),
        _ => PropertyValue::None,
    }
}
