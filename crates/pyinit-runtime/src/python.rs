//! CPython binding for [`ManagedRuntime`].
//!
//! The C API is looked up in the process's global symbol namespace instead of
//! being linked. The interpreter becomes visible once the native bindings are
//! preloaded with global scope, or is already there when the host process is
//! itself a Python program. Before that, `Py_IsInitialized` is simply absent,
//! which reads as "not initialized".

use crate::error::{RuntimeError, RuntimeResult};
use crate::paths::SearchPathSet;
use crate::runtime::{ManagedRuntime, ThreadToken};
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::{debug, error};

type PyObject = c_void;

/// The subset of the C API the addon calls.
struct PyApi {
    initialize_ex: unsafe extern "C" fn(c_int),
    finalize_ex: unsafe extern "C" fn() -> c_int,
    import_module: unsafe extern "C" fn(*const c_char) -> *mut PyObject,
    err_print: unsafe extern "C" fn(),
    dec_ref: unsafe extern "C" fn(*mut PyObject),
    sys_get_object: unsafe extern "C" fn(*const c_char) -> *mut PyObject,
    unicode_decode_fs_default: unsafe extern "C" fn(*const c_char) -> *mut PyObject,
    unicode_as_utf8: unsafe extern "C" fn(*mut PyObject) -> *const c_char,
    list_append: unsafe extern "C" fn(*mut PyObject, *mut PyObject) -> c_int,
    sequence_contains: unsafe extern "C" fn(*mut PyObject, *mut PyObject) -> c_int,
    object_repr: unsafe extern "C" fn(*mut PyObject) -> *mut PyObject,
    save_thread: unsafe extern "C" fn() -> *mut c_void,
    restore_thread: unsafe extern "C" fn(*mut c_void),
}

/// Look up `name` (NUL-terminated) in the global namespace.
fn lookup(name: &'static str) -> Option<*mut c_void> {
    debug_assert!(name.ends_with('\0'));
    // SAFETY: name is NUL-terminated; RTLD_DEFAULT searches loaded objects.
    let ptr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr().cast()) };
    (!ptr.is_null()).then_some(ptr)
}

/// Resolve `name` as a function pointer of type `F`.
///
/// # Safety
///
/// `F` must be an `extern "C"` function pointer type matching the symbol's
/// real signature.
unsafe fn resolve<F: Copy>(name: &'static str) -> RuntimeResult<F> {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
    let ptr = lookup(name).ok_or(RuntimeError::MissingSymbol(name.trim_end_matches('\0')))?;
    Ok(std::mem::transmute_copy::<*mut c_void, F>(&ptr))
}

impl PyApi {
    fn load() -> RuntimeResult<Self> {
        // SAFETY: each type below is the documented CPython signature.
        unsafe {
            Ok(Self {
                initialize_ex: resolve("Py_InitializeEx\0")?,
                finalize_ex: resolve("Py_FinalizeEx\0")?,
                import_module: resolve("PyImport_ImportModule\0")?,
                err_print: resolve("PyErr_Print\0")?,
                dec_ref: resolve("Py_DecRef\0")?,
                sys_get_object: resolve("PySys_GetObject\0")?,
                unicode_decode_fs_default: resolve("PyUnicode_DecodeFSDefault\0")?,
                unicode_as_utf8: resolve("PyUnicode_AsUTF8\0")?,
                list_append: resolve("PyList_Append\0")?,
                sequence_contains: resolve("PySequence_Contains\0")?,
                object_repr: resolve("PyObject_Repr\0")?,
                save_thread: resolve("PyEval_SaveThread\0")?,
                restore_thread: resolve("PyEval_RestoreThread\0")?,
            })
        }
    }
}

/// The CPython interpreter, reached through its C API.
#[derive(Default)]
pub struct CPython {
    api: OnceCell<PyApi>,
}

impl CPython {
    pub fn new() -> Self {
        Self::default()
    }

    fn api(&self) -> RuntimeResult<&PyApi> {
        self.api.get_or_try_init(PyApi::load)
    }

    fn sys_path(api: &PyApi) -> Option<*mut PyObject> {
        // SAFETY: GIL held by the caller; returns a borrowed reference.
        let list = unsafe { (api.sys_get_object)(c"path".as_ptr()) };
        (!list.is_null()).then_some(list)
    }

    fn append_one(api: &PyApi, sys_path: *mut PyObject, path: &Path) -> RuntimeResult<()> {
        let search_path_error = |reason: &str| RuntimeError::SearchPath {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| RuntimeError::InvalidString(path.display().to_string()))?;

        // SAFETY: GIL held; every new reference below is released exactly once.
        unsafe {
            let item = (api.unicode_decode_fs_default)(c_path.as_ptr());
            if item.is_null() {
                (api.err_print)();
                return Err(search_path_error("path could not be decoded"));
            }

            let result = match (api.sequence_contains)(sys_path, item) {
                0 => {
                    if (api.list_append)(sys_path, item) < 0 {
                        (api.err_print)();
                        Err(search_path_error("list append failed"))
                    } else {
                        debug!("Appended {:?} to sys.path", path);
                        Ok(())
                    }
                }
                1 => {
                    debug!("{:?} already in sys.path", path);
                    Ok(())
                }
                _ => {
                    (api.err_print)();
                    Err(search_path_error("membership test failed"))
                }
            };

            (api.dec_ref)(item);
            result
        }
    }
}

impl ManagedRuntime for CPython {
    fn is_initialized(&self) -> bool {
        match lookup("Py_IsInitialized\0") {
            Some(ptr) => {
                // SAFETY: Py_IsInitialized takes no arguments, returns int and
                // may be called at any time, with or without the GIL.
                let is_initialized: unsafe extern "C" fn() -> c_int =
                    unsafe { std::mem::transmute(ptr) };
                unsafe { is_initialized() != 0 }
            }
            None => false,
        }
    }

    fn initialize(&self) -> RuntimeResult<()> {
        let api = self.api()?;
        // SAFETY: called once, before any other API use, from the thread that
        // will hold the GIL afterwards.
        unsafe { (api.initialize_ex)(1) };
        Ok(())
    }

    fn finalize(&self) -> i32 {
        match self.api() {
            // SAFETY: GIL held by the thread that reacquired it.
            Ok(api) => unsafe { (api.finalize_ex)() },
            Err(e) => {
                error!("Cannot finalize: {}", e);
                -1
            }
        }
    }

    fn import_module(&self, name: &str) -> RuntimeResult<()> {
        let api = self.api()?;
        let c_name = CString::new(name).map_err(|_| RuntimeError::InvalidString(name.to_string()))?;

        // SAFETY: GIL held; the returned module reference is released.
        unsafe {
            let module = (api.import_module)(c_name.as_ptr());
            if module.is_null() {
                (api.err_print)();
                return Err(RuntimeError::Import {
                    module: name.to_string(),
                    reason: "exception raised during import, traceback printed to stderr"
                        .to_string(),
                });
            }
            (api.dec_ref)(module);
        }

        Ok(())
    }

    fn append_search_paths(&self, paths: &SearchPathSet) -> RuntimeResult<()> {
        let api = self.api()?;
        let sys_path = Self::sys_path(api).ok_or_else(|| RuntimeError::SearchPath {
            path: Default::default(),
            reason: "sys.path is not available".to_string(),
        })?;

        for path in paths.iter() {
            Self::append_one(api, sys_path, path)?;
        }

        Ok(())
    }

    fn release_lock(&self) -> RuntimeResult<ThreadToken> {
        let api = self.api()?;
        // SAFETY: the calling thread holds the GIL.
        let state = unsafe { (api.save_thread)() };
        ThreadToken::from_raw(state)
            .ok_or_else(|| RuntimeError::Lock("no thread state to save".to_string()))
    }

    fn reacquire_lock(&self, token: ThreadToken) {
        match self.api() {
            // SAFETY: the token came from PyEval_SaveThread and is used once.
            Ok(api) => unsafe { (api.restore_thread)(token.into_raw()) },
            Err(e) => error!("Cannot restore thread state {:#x}: {}", token.addr(), e),
        }
    }

    fn search_paths(&self) -> Option<String> {
        let api = self.api().ok()?;
        let sys_path = Self::sys_path(api)?;

        // SAFETY: GIL held; the repr object owns the UTF-8 buffer, which is
        // copied before the repr is released.
        unsafe {
            let repr = (api.object_repr)(sys_path);
            if repr.is_null() {
                (api.err_print)();
                return None;
            }

            let utf8 = (api.unicode_as_utf8)(repr);
            let rendered = (!utf8.is_null())
                .then(|| CStr::from_ptr(utf8).to_string_lossy().into_owned());
            (api.dec_ref)(repr);
            rendered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_without_interpreter() {
        // Test binaries do not link libpython.
        assert!(!CPython::new().is_initialized());
    }

    #[test]
    fn test_missing_api_is_reported() {
        let python = CPython::new();
        match python.initialize() {
            Err(RuntimeError::MissingSymbol(name)) => assert!(!name.ends_with('\0')),
            other => panic!("unexpected result: {:?}", other.err()),
        }
        assert!(python.search_paths().is_none());
        assert_eq!(python.finalize(), -1);
    }
}
