//! # py-init-extension
//!
//! Addon that brings up the embedded Python runtime for apps whose main
//! program is not written in Python.
//!
//! Timeline in a native app:
//!
//! 1. The app links the host framework, which loads the `py-init-addon`
//!    shared object built on this crate.
//! 2. Its load hook registers the addon as [`ADDON_NAME`]. The host reaches
//!    it through the exported entry points in [`ffi`].
//! 3. The host calls `on_init`: the Python bindings are preloaded, the
//!    interpreter started, `sys.path` completed, and every Python extension
//!    under the app's extensions directory imported (which registers it with
//!    the host framework).
//! 4. The GIL is released so any thread can run Python code.
//! 5. At shutdown `on_deinit` takes the GIL back and finalizes the
//!    interpreter.
//!
//! In a Python app (or a `spawn`ed Python worker) the interpreter already
//! runs when the addon is loaded, and the addon stays inert.
//!
//! ## Configuration
//!
//! An optional `py_init.toml` next to the shared object overrides the
//! defaults. See [`config::BootstrapConfig`].

pub mod addon;
pub mod config;
pub mod ffi;
pub mod logging;
pub mod shim;

pub use addon::{AddonPhase, ModuleLocation, PyInitAddon, ADDON_NAME};
pub use config::BootstrapConfig;
