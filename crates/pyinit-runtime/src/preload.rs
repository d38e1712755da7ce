//! Preloading of the runtime's native bindings.
//!
//! Extension modules imported later resolve their symbols against whatever is
//! already globally visible in the process. A locally scoped load of the
//! binding library would hide those symbols, so it has to go in with
//! [`SymbolScope::Global`] before anything is imported.

use crate::error::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use std::ffi::{CStr, CString};
use tracing::{debug, info};

/// Symbol visibility for a preloaded library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolScope {
    /// Symbols join the global namespace (`RTLD_GLOBAL`).
    #[default]
    Global,
    /// Symbols stay private to the library (`RTLD_LOCAL`).
    Local,
}

impl SymbolScope {
    fn dlopen_flags(self) -> libc::c_int {
        match self {
            SymbolScope::Global => libc::RTLD_NOW | libc::RTLD_GLOBAL,
            SymbolScope::Local => libc::RTLD_NOW | libc::RTLD_LOCAL,
        }
    }
}

/// Loads a shared library ahead of the runtime.
pub trait NativePreloader: Send {
    fn preload(&self, library: &str, scope: SymbolScope) -> RuntimeResult<()>;
}

/// [`NativePreloader`] backed by `dlopen`.
///
/// The handle is never closed: the library must stay mapped for as long as
/// the runtime can call into it, which is the rest of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlopenPreloader;

impl NativePreloader for DlopenPreloader {
    fn preload(&self, library: &str, scope: SymbolScope) -> RuntimeResult<()> {
        let c_library =
            CString::new(library).map_err(|_| RuntimeError::InvalidString(library.to_string()))?;

        debug!("dlopen({}, {:?})", library, scope);

        // SAFETY: c_library is a valid NUL-terminated string. Running the
        // library's initializers is the point of the call.
        let handle = unsafe { libc::dlopen(c_library.as_ptr(), scope.dlopen_flags()) };
        if handle.is_null() {
            return Err(RuntimeError::Preload {
                library: library.to_string(),
                reason: last_dl_error(),
            });
        }

        info!("Preloaded {} ({:?} symbols)", library, scope);
        Ok(())
    }
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns null or a NUL-terminated string that stays valid
    // until the next dl* call on this thread; it is copied out immediately.
    unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            "unknown dynamic loader error".to_string()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preload_missing_library() {
        let err = DlopenPreloader
            .preload("libpyinit-does-not-exist.so", SymbolScope::Global)
            .unwrap_err();

        match err {
            RuntimeError::Preload { library, reason } => {
                assert_eq!(library, "libpyinit-does-not-exist.so");
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_preload_rejects_interior_nul() {
        let err = DlopenPreloader
            .preload("lib\0python.so", SymbolScope::Local)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidString(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_preload_libc_globally() {
        DlopenPreloader
            .preload("libc.so.6", SymbolScope::Global)
            .unwrap();
    }
}
