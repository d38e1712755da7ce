//! # pyinit-runtime
//!
//! The managed runtime side of the py-init addon.
//!
//! This crate provides:
//! - The [`ManagedRuntime`] boundary and its CPython implementation
//! - Self location and path resolution for the application layout
//! - Global-visibility preloading of the runtime's native bindings
//! - Extension discovery and import
//!
//! ## Application Layout
//!
//! The addon lives at `<app_root>/addon/extension/<addon>/lib/`. From there:
//!
//! - `../..` is the extensions directory, each entry of which is imported as
//!   `addon.extension.<entry>`
//! - `../../../..` is the application root, whose `lib/`, `interface/` and
//!   the root itself are appended to the runtime's module search path

pub mod discovery;
pub mod error;
pub mod paths;
pub mod preload;
pub mod python;
pub mod runtime;

pub use discovery::{
    load_extension_modules, module_name, DirectoryLister, EntryNames, ExtensionEntry, FsLister,
};
pub use error::{RuntimeError, RuntimeResult};
pub use paths::{module_path_of, own_module_dir, resolve_relative, SearchPathSet};
pub use preload::{DlopenPreloader, NativePreloader, SymbolScope};
pub use python::CPython;
pub use runtime::{ManagedRuntime, ThreadToken};
