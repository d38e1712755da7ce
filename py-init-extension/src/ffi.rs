//! C ABI through which a host framework drives the registered addon.
//!
//! The `py-init-addon` shared object exports these as `extern "C"` entry
//! points over the process-wide registry. Each one looks the addon up by
//! [`ADDON_NAME`], forwards the lifecycle call, and maps the outcome to a
//! status code. Fatal conditions inside the addon still panic, which aborts
//! the host process at the `extern "C"` boundary.

use crate::addon::ADDON_NAME;
use pyinit_addon_api::{Addon, AddonEnv, AddonRegistry, AddonResult};
use std::any::Any;
use std::ffi::{c_int, c_void, CStr};
use std::sync::{Mutex, PoisonError};
use tracing::error;

/// [`ADDON_NAME`] as a C string.
pub const ADDON_NAME_C: &CStr = c"py_init_extension_cpp";

pub const STATUS_OK: c_int = 0;
pub const STATUS_NOT_REGISTERED: c_int = 1;
pub const STATUS_FAILED: c_int = 2;

/// Host callback receiving the host's own context pointer.
pub type HostCallback = unsafe extern "C" fn(context: *mut c_void);

/// Completion signals supplied by the host.
///
/// Either callback may be null when the host does not care about that
/// phase.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostEnv {
    pub context: *mut c_void,
    pub on_init_done: Option<HostCallback>,
    pub on_deinit_done: Option<HostCallback>,
}

impl AddonEnv for HostEnv {
    fn on_init_done(&mut self) {
        if let Some(callback) = self.on_init_done {
            // SAFETY: the host pairs each callback with the context it expects.
            unsafe { callback(self.context) }
        }
    }

    fn on_deinit_done(&mut self) {
        if let Some(callback) = self.on_deinit_done {
            // SAFETY: as above.
            unsafe { callback(self.context) }
        }
    }
}

/// Host pointer carried through instance hooks as an opaque context.
#[derive(Debug)]
pub struct HostPointer(pub *mut c_void);

// SAFETY: the addon never dereferences it; ownership stays with the host.
unsafe impl Send for HostPointer {}

fn with_registered(
    registry: &Mutex<AddonRegistry>,
    operation: &str,
    call: impl FnOnce(&mut dyn Addon) -> AddonResult<()>,
) -> c_int {
    let handle = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(ADDON_NAME);
    let Some(handle) = handle else {
        error!("{} called on unregistered addon {}", operation, ADDON_NAME);
        return STATUS_NOT_REGISTERED;
    };

    let mut addon = handle.lock().unwrap_or_else(PoisonError::into_inner);
    match call(&mut *addon) {
        Ok(()) => STATUS_OK,
        Err(e) => {
            error!("{} {} failed: {}", ADDON_NAME, operation, e);
            STATUS_FAILED
        }
    }
}

/// Whether the addon is in `registry`.
pub fn is_registered(registry: &Mutex<AddonRegistry>) -> bool {
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(ADDON_NAME)
}

pub fn init_registered(registry: &Mutex<AddonRegistry>, env: &mut dyn AddonEnv) -> c_int {
    with_registered(registry, "on_init", |addon| addon.on_init(env))
}

pub fn deinit_registered(registry: &Mutex<AddonRegistry>, env: &mut dyn AddonEnv) -> c_int {
    with_registered(registry, "on_deinit", |addon| addon.on_deinit(env))
}

pub fn create_instance_registered(
    registry: &Mutex<AddonRegistry>,
    env: &mut dyn AddonEnv,
    name: &str,
    context: HostPointer,
) -> c_int {
    with_registered(registry, "on_create_instance", |addon| {
        addon.on_create_instance(env, name, Box::new(context));
        Ok(())
    })
}

pub fn destroy_instance_registered(
    registry: &Mutex<AddonRegistry>,
    env: &mut dyn AddonEnv,
    instance: HostPointer,
    context: HostPointer,
) -> c_int {
    with_registered(registry, "on_destroy_instance", |addon| {
        let instance: Box<dyn Any + Send> = Box::new(instance);
        addon.on_destroy_instance(env, instance, Box::new(context));
        Ok(())
    })
}
