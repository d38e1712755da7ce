//! The managed runtime boundary.
//!
//! The addon never talks to the interpreter directly. Everything it needs is
//! expressed by [`ManagedRuntime`], which keeps the lifecycle logic testable
//! with a recording double and lets [`crate::CPython`] stay a thin binding.

use crate::error::RuntimeResult;
use crate::paths::SearchPathSet;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Saved execution context of the thread that released the global lock.
///
/// Produced by [`ManagedRuntime::release_lock`] and consumed by
/// [`ManagedRuntime::reacquire_lock`]. It cannot be cloned or copied, so a
/// token can be handed back to the runtime at most once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a thread token leaves the global lock released forever"]
pub struct ThreadToken(NonNull<c_void>);

// The token is an opaque pointer owned by the runtime. Restoring it from a
// thread other than the one that saved it is allowed by the runtime.
unsafe impl Send for ThreadToken {}

impl ThreadToken {
    /// Wrap a raw thread-state pointer. Returns `None` for null.
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Give the raw pointer back, consuming the token.
    pub fn into_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Address of the saved state, for identity checks and logging.
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Operations the bootstrap addon needs from the managed runtime.
///
/// All calls except [`is_initialized`](Self::is_initialized) assume the
/// calling thread holds the global lock, which is the case between
/// `initialize` and `release_lock`, and again after `reacquire_lock`.
pub trait ManagedRuntime: Send {
    /// Whether the runtime is already up in this process.
    ///
    /// Must be safe to call without holding any lock.
    fn is_initialized(&self) -> bool;

    /// Bring the runtime up. The calling thread ends up holding the lock.
    fn initialize(&self) -> RuntimeResult<()>;

    /// Tear the runtime down. Negative status means failure.
    fn finalize(&self) -> i32;

    /// Import a module by its fully qualified name.
    fn import_module(&self, name: &str) -> RuntimeResult<()>;

    /// Append directories to the module resolver's search path.
    fn append_search_paths(&self, paths: &SearchPathSet) -> RuntimeResult<()>;

    /// Release the global lock, returning the saved thread state.
    fn release_lock(&self) -> RuntimeResult<ThreadToken>;

    /// Reacquire the global lock with a previously saved thread state.
    fn reacquire_lock(&self, token: ThreadToken);

    /// Current resolver search path, rendered for diagnostics.
    fn search_paths(&self) -> Option<String>;
}
