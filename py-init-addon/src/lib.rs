//! # py-init-addon
//!
//! The shared object the host framework loads. Its initializer section
//! registers the py_init addon in the process-wide registry and its
//! finalizer section drops it again. The host drives the registered addon
//! through the `py_init_addon_*` entry points below.
//!
//! Every entry point returns one of the `STATUS_*` codes from
//! [`py_init_extension::ffi`].

use py_init_extension::ffi::{self, HostEnv, HostPointer, ADDON_NAME_C};
use pyinit_addon_api::AddonRegistry;
use std::ffi::{c_char, c_int, c_void, CStr};

/// Copy the host's env, treating null as "no callbacks".
///
/// # Safety
///
/// `env` must be null or point to a valid [`HostEnv`].
unsafe fn host_env(env: *const HostEnv) -> HostEnv {
    if env.is_null() {
        HostEnv {
            context: std::ptr::null_mut(),
            on_init_done: None,
            on_deinit_done: None,
        }
    } else {
        *env
    }
}

/// Name the addon is registered under, as a static C string.
#[no_mangle]
pub extern "C" fn py_init_addon_name() -> *const c_char {
    ADDON_NAME_C.as_ptr()
}

/// 1 while the addon is registered, 0 otherwise.
#[no_mangle]
pub extern "C" fn py_init_addon_is_registered() -> c_int {
    ffi::is_registered(AddonRegistry::global()) as c_int
}

/// # Safety
///
/// `env` must be null or point to a valid [`HostEnv`] whose callbacks accept
/// its context.
#[no_mangle]
pub unsafe extern "C" fn py_init_addon_on_init(env: *const HostEnv) -> c_int {
    let mut env = host_env(env);
    ffi::init_registered(AddonRegistry::global(), &mut env)
}

/// # Safety
///
/// Same contract as [`py_init_addon_on_init`].
#[no_mangle]
pub unsafe extern "C" fn py_init_addon_on_deinit(env: *const HostEnv) -> c_int {
    let mut env = host_env(env);
    ffi::deinit_registered(AddonRegistry::global(), &mut env)
}

/// # Safety
///
/// `env` as for [`py_init_addon_on_init`]; `name` must be null or a valid
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn py_init_addon_on_create_instance(
    env: *const HostEnv,
    name: *const c_char,
    context: *mut c_void,
) -> c_int {
    let mut env = host_env(env);
    let name = if name.is_null() {
        Default::default()
    } else {
        CStr::from_ptr(name).to_string_lossy()
    };
    ffi::create_instance_registered(
        AddonRegistry::global(),
        &mut env,
        &name,
        HostPointer(context),
    )
}

/// # Safety
///
/// `env` as for [`py_init_addon_on_init`].
#[no_mangle]
pub unsafe extern "C" fn py_init_addon_on_destroy_instance(
    env: *const HostEnv,
    instance: *mut c_void,
    context: *mut c_void,
) -> c_int {
    let mut env = host_env(env);
    ffi::destroy_instance_registered(
        AddonRegistry::global(),
        &mut env,
        HostPointer(instance),
        HostPointer(context),
    )
}

#[cfg(all(feature = "auto-register", not(test)))]
mod hooks {
    use py_init_extension::shim;
    use std::panic::catch_unwind;

    // Unwinding out of these would abort the process.
    extern "C" fn load_hook() {
        let _ = catch_unwind(shim::on_load);
    }

    extern "C" fn unload_hook() {
        let _ = catch_unwind(shim::on_unload);
    }

    #[used]
    #[cfg_attr(
        any(target_os = "linux", target_os = "android", target_os = "freebsd"),
        link_section = ".init_array"
    )]
    #[cfg_attr(target_vendor = "apple", link_section = "__DATA,__mod_init_func")]
    static LOAD_HOOK: extern "C" fn() = load_hook;

    #[used]
    #[cfg_attr(
        any(target_os = "linux", target_os = "android", target_os = "freebsd"),
        link_section = ".fini_array"
    )]
    #[cfg_attr(target_vendor = "apple", link_section = "__DATA,__mod_term_func")]
    static UNLOAD_HOOK: extern "C" fn() = unload_hook;
}
