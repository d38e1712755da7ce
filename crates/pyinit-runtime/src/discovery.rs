//! Extension discovery and import.
//!
//! Every entry of the extensions directory (other than `.` and `..`) is
//! imported as `<package>.<entry>`, which runs the extension's registration
//! code inside the managed runtime.
//!
//! Entries are imported in whatever order the directory listing yields them.
//! That order differs between platforms and file systems, so extensions must
//! not rely on being imported before or after one another.

use crate::error::RuntimeResult;
use crate::runtime::ManagedRuntime;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Lazy, single-pass sequence of entry names.
pub type EntryNames = Box<dyn Iterator<Item = io::Result<OsString>>>;

/// Source of directory listings.
pub trait DirectoryLister: Send {
    /// Open `dir` and return its entry names.
    fn open(&self, dir: &Path) -> io::Result<EntryNames>;
}

/// [`DirectoryLister`] over the real file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLister;

impl DirectoryLister for FsLister {
    fn open(&self, dir: &Path) -> io::Result<EntryNames> {
        let entries = std::fs::read_dir(dir)?;
        Ok(Box::new(entries.map(|entry| entry.map(|e| e.file_name()))))
    }
}

/// One entry seen while scanning the extensions directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionEntry {
    pub name: String,
    pub is_reflexive: bool,
}

impl ExtensionEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_reflexive = name == "." || name == "..";
        Self { name, is_reflexive }
    }

    /// Fully qualified module name under `package`.
    pub fn module_name(&self, package: &str) -> String {
        module_name(package, &self.name)
    }
}

/// `<package>.<entry>`
pub fn module_name(package: &str, entry: &str) -> String {
    format!("{}.{}", package, entry)
}

/// Import every extension module found in `extensions_dir`.
///
/// A missing or unreadable directory means there are no extensions and is not
/// an error. A failed import is, and stops the scan: a partially imported
/// extension set is not a usable state.
///
/// Returns the number of modules imported.
pub fn load_extension_modules(
    runtime: &dyn ManagedRuntime,
    lister: &dyn DirectoryLister,
    extensions_dir: Option<&Path>,
    package: &str,
) -> RuntimeResult<usize> {
    let dir = match extensions_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => {
            warn!("No extensions directory, skipping extension modules");
            return Ok(0);
        }
    };

    let entries = match lister.open(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to open extensions directory {:?}: {}", dir, e);
            return Ok(0);
        }
    };

    let mut imported = 0;
    for entry in entries {
        let name = match entry {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to read entry under {:?}: {}", dir, e);
                continue;
            }
        };

        let name = match name.into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("Skipping non UTF-8 entry {:?} under {:?}", raw, dir);
                continue;
            }
        };

        let entry = ExtensionEntry::new(name);
        if entry.is_reflexive {
            continue;
        }

        let module = entry.module_name(package);
        debug!("Importing extension module {}", module);
        runtime.import_module(&module)?;
        imported += 1;
    }

    info!("Imported {} extension modules from {:?}", imported, dir);
    Ok(imported)
}
