// JNI bridge for the Kotlin `is.xyz.mpv.MPVLib` facade
//
// Every native method forwards to the process-wide SharedEngine; `create`
// swaps in a new EngineHandle once the previous one has been destroyed.
// Kotlin observers are wrapped in a JniObserver and registered with the
// shared dispatcher every handle reports to, so they survive that swap and
// are called back from the engine's event thread.
//
// Nothing may unwind into the JVM: each entry point runs inside `guard`,
// which catches panics and logs failures. Only session allocation and
// initialization failures are thrown to Kotlin, as RuntimeException; every
// other failure surfaces as a status code, a null or a log line.

use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jni::objects::{GlobalRef, JClass, JObject, JObjectArray, JString, JValue};
use jni::sys::{jint, jobject, jstring};
use jni::{JNIEnv, JavaVM};
use once_cell::sync::{Lazy, OnceCell};

use crate::dispatch::{self, EventObserver, ObserverId};
use crate::engine::{EngineHandle, SharedEngine, SurfaceBinding, SurfaceHandle};
use crate::error::{log_engine_error, EngineError};
use crate::events::{EngineEventId, PropertyFormat};

/// The engine handle reachable from Kotlin.
static ENGINE: SharedEngine = SharedEngine::new(EngineHandle::new);

/// Application context published to native libraries on first create.
static APP_CONTEXT: OnceCell<GlobalRef> = OnceCell::new();

/// Surface currently bound; its global ref doubles as the window id.
static SURFACE: SurfaceBinding<GlobalRef> = SurfaceBinding::new();

static OBSERVERS: Lazy<Mutex<Vec<ObserverEntry>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Generic failure status returned when a call never reached the engine.
const STATUS_FAILED: jint = -1;

struct ObserverEntry {
    id: ObserverId,
    observer: Arc<JniObserver>,
}

#[derive(Debug)]
enum BridgeError {
    Engine(EngineError),
    Jni(jni::errors::Error),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Engine(err) => write!(f, "{}", err),
            BridgeError::Jni(err) => write!(f, "JNI error: {}", err),
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        BridgeError::Engine(err)
    }
}

impl From<jni::errors::Error> for BridgeError {
    fn from(err: jni::errors::Error) -> Self {
        BridgeError::Jni(err)
    }
}

fn guard<'local, T>(
    env: &mut JNIEnv<'local>,
    operation: &str,
    default: T,
    body: impl FnOnce(&mut JNIEnv<'local>) -> Result<T, BridgeError>,
) -> T {
    match panic::catch_unwind(AssertUnwindSafe(|| body(env))) {
        Ok(Ok(value)) => value,
        Ok(Err(BridgeError::Engine(err @ EngineError::EngineInitError { .. }))) => {
            log_engine_error(&err, operation);
            let _ = env.throw_new("java/lang/RuntimeException", err.to_string());
            default
        }
        Ok(Err(err)) => {
            log::error!("[MPVLib] {} failed: {}", operation, err);
            default
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("[MPVLib] {} panicked: {}", operation, message);
            default
        }
    }
}

fn status_of(result: Result<(), EngineError>) -> jint {
    match result {
        Ok(()) => 0,
        Err(err) => err.status_code(),
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Result<String, BridgeError> {
    Ok(env.get_string(value)?.into())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish_android_context(env: &mut JNIEnv, context: &JObject) -> Result<(), BridgeError> {
    APP_CONTEXT.get_or_try_init(|| {
        let vm = env.get_java_vm()?;
        let global = env.new_global_ref(context)?;
        // SAFETY: the VM outlives the process and the global ref is never
        // released, so both pointers stay valid for every later reader.
        unsafe {
            ndk_context::initialize_android_context(
                vm.get_java_vm_pointer() as *mut c_void,
                global.as_obj().as_raw() as *mut c_void,
            );
        }
        Ok::<_, BridgeError>(global)
    })?;
    Ok(())
}

// ============================================================================
// OBSERVERS
// ============================================================================

/// Kotlin `MPVLib.EventObserver` called back through JNI.
struct JniObserver {
    vm: JavaVM,
    target: GlobalRef,
}

impl JniObserver {
    fn notify<F>(&self, method: &str, call: F)
    where
        F: FnOnce(&mut JNIEnv, &JObject) -> jni::errors::Result<()>,
    {
        let mut env = match self.vm.attach_current_thread_as_daemon() {
            Ok(env) => env,
            Err(err) => {
                log::error!("[MPVLib] Cannot attach event thread: {}", err);
                return;
            }
        };

        let target = self.target.as_obj();
        let result = env.with_local_frame(4, |env| call(env, target));
        if let Err(err) = result {
            if env.exception_check().unwrap_or(false) {
                let _ = env.exception_describe();
                let _ = env.exception_clear();
            }
            log::warn!("[MPVLib] Observer {} failed: {}", method, err);
        }
    }

    fn property(&self, name: &str, sig: &str, value: Option<JValue>) {
        self.notify("eventProperty", |env, target| {
            let name = env.new_string(name)?;
            match value {
                Some(value) => {
                    env.call_method(target, "eventProperty", sig, &[JValue::Object(&name), value])?
                }
                None => env.call_method(target, "eventProperty", sig, &[JValue::Object(&name)])?,
            };
            Ok(())
        });
    }
}

impl EventObserver for JniObserver {
    fn on_property_none(&self, name: &str) {
        self.property(name, "(Ljava/lang/String;)V", None);
    }

    fn on_property_int(&self, name: &str, value: i64) {
        self.property(name, "(Ljava/lang/String;J)V", Some(JValue::Long(value)));
    }

    fn on_property_flag(&self, name: &str, value: bool) {
        self.property(name, "(Ljava/lang/String;Z)V", Some(JValue::Bool(value.into())));
    }

    fn on_property_text(&self, name: &str, value: &str) {
        self.notify("eventProperty", |env, target| {
            let name = env.new_string(name)?;
            let value = env.new_string(value)?;
            env.call_method(
                target,
                "eventProperty",
                "(Ljava/lang/String;Ljava/lang/String;)V",
                &[JValue::Object(&name), JValue::Object(&value)],
            )?;
            Ok(())
        });
    }

    fn on_property_double(&self, name: &str, value: f64) {
        self.property(name, "(Ljava/lang/String;D)V", Some(JValue::Double(value)));
    }

    fn on_event(&self, id: EngineEventId) {
        self.notify("event", |env, target| {
            env.call_method(target, "event", "(I)V", &[JValue::Int(id.code())])?;
            Ok(())
        });
    }
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_addObserver<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    observer: JObject<'local>,
) {
    guard(&mut env, "addObserver", (), |env| {
        let observer = Arc::new(JniObserver {
            vm: env.get_java_vm()?,
            target: env.new_global_ref(&observer)?,
        });
        let id = dispatch::shared().register(&observer);
        lock(&OBSERVERS).push(ObserverEntry { id, observer });
        Ok(())
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_removeObserver<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    observer: JObject<'local>,
) {
    guard(&mut env, "removeObserver", (), |env| {
        let mut observers = lock(&OBSERVERS);
        let mut found = None;
        for (index, entry) in observers.iter().enumerate() {
            if env.is_same_object(entry.observer.target.as_obj(), &observer)? {
                found = Some(index);
                break;
            }
        }

        if let Some(index) = found {
            let entry = observers.remove(index);
            dispatch::shared().unregister(entry.id);
        }
        Ok(())
    })
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_create<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    context: JObject<'local>,
) {
    guard(&mut env, "create", (), |env| {
        publish_android_context(env, &context)?;
        let engine = ENGINE.renew();
        engine.create(&engine.context())?;
        Ok(())
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_init<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
) {
    guard(&mut env, "init", (), |_env| Ok(ENGINE.current().init()?))
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_destroy<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
) {
    guard(&mut env, "destroy", (), |_env| {
        let result = ENGINE.current().destroy();
        // The session detached the window during teardown.
        SURFACE.clear();
        Ok(result?)
    })
}

// ============================================================================
// SURFACE
// ============================================================================

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_attachSurface<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    surface: JObject<'local>,
) {
    guard(&mut env, "attachSurface", (), |env| {
        let global = env.new_global_ref(&surface)?;
        let Some(handle) = SurfaceHandle::new(global.as_obj().as_raw() as i64) else {
            log::warn!("[MPVLib] attachSurface called with a null surface");
            return Ok(());
        };

        // Replacing drops the previous binding's global ref.
        SURFACE.attach(&ENGINE.current(), handle, global)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_detachSurface<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
) {
    guard(&mut env, "detachSurface", (), |_env| {
        SURFACE.detach(&ENGINE.current())?;
        Ok(())
    })
}

// ============================================================================
// COMMANDS AND PROPERTIES
// ============================================================================

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_command<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    cmd: JObjectArray<'local>,
) {
    guard(&mut env, "command", (), |env| {
        let len = env.get_array_length(&cmd)?;
        let mut args = Vec::with_capacity(len.max(0) as usize);
        for index in 0..len {
            let element = JString::from(env.get_object_array_element(&cmd, index)?);
            args.push(read_string(env, &element)?);
            env.delete_local_ref(element)?;
        }

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        ENGINE.current().command(&args)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_setOptionString<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    name: JString<'local>,
    value: JString<'local>,
) -> jint {
    guard(&mut env, "setOptionString", STATUS_FAILED, |env| {
        let name = read_string(env, &name)?;
        let value = read_string(env, &value)?;
        Ok(status_of(ENGINE.current().set_option_string(&name, &value)))
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_getPropertyString<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    property: JString<'local>,
) -> jstring {
    guard(&mut env, "getPropertyString", std::ptr::null_mut(), |env| {
        let property = read_string(env, &property)?;
        match ENGINE.current().get_property_string(&property)? {
            Some(value) => Ok(env.new_string(value)?.into_raw()),
            None => Ok(std::ptr::null_mut()),
        }
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_setPropertyString<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    property: JString<'local>,
    value: JString<'local>,
) -> jint {
    guard(&mut env, "setPropertyString", STATUS_FAILED, |env| {
        let property = read_string(env, &property)?;
        let value = read_string(env, &value)?;
        Ok(status_of(ENGINE.current().set_property_string(&property, &value)))
    })
}

/// Returns a boxed `Integer`, or null when the property is absent or does
/// not fit in 32 bits.
#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_getPropertyInt<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    property: JString<'local>,
) -> jobject {
    guard(&mut env, "getPropertyInt", std::ptr::null_mut(), |env| {
        let property = read_string(env, &property)?;
        let Some(value) = ENGINE.current().get_property_int(&property)? else {
            return Ok(std::ptr::null_mut());
        };
        let Ok(value) = jint::try_from(value) else {
            log::warn!("[MPVLib] Property {} value {} exceeds Int range", property, value);
            return Ok(std::ptr::null_mut());
        };

        let boxed = env.new_object("java/lang/Integer", "(I)V", &[JValue::Int(value)])?;
        Ok(boxed.into_raw())
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_setPropertyInt<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    property: JString<'local>,
    value: jint,
) -> jint {
    guard(&mut env, "setPropertyInt", STATUS_FAILED, |env| {
        let property = read_string(env, &property)?;
        Ok(status_of(ENGINE.current().set_property_int(&property, i64::from(value))))
    })
}

#[no_mangle]
pub extern "system" fn Java_is_xyz_mpv_MPVLib_observeProperty<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    property: JString<'local>,
    format: jint,
) {
    guard(&mut env, "observeProperty", (), |env| {
        let property = read_string(env, &property)?;
        ENGINE.current().observe_property(&property, PropertyFormat::from_raw(format))?;
        Ok(())
    })
}
