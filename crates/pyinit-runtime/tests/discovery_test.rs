//! Integration tests for extension discovery.
//!
//! These tests cover:
//! - Importing every non-reflexive entry under the package prefix
//! - Missing, empty and unreadable directories
//! - Unreadable entries in the middle of a listing
//! - Import failures stopping the scan

use pyinit_runtime::{
    load_extension_modules, module_name, DirectoryLister, EntryNames, FsLister, ManagedRuntime,
    RuntimeError, RuntimeResult, SearchPathSet, ThreadToken,
};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

/// Runtime double that only records imports.
#[derive(Default)]
struct ImportRecorder {
    imports: Mutex<Vec<String>>,
    failing: Option<String>,
}

impl ImportRecorder {
    fn failing_on(module: &str) -> Self {
        Self {
            failing: Some(module.to_string()),
            ..Self::default()
        }
    }

    fn imports(&self) -> Vec<String> {
        self.imports.lock().unwrap().clone()
    }
}

impl ManagedRuntime for ImportRecorder {
    fn is_initialized(&self) -> bool {
        true
    }

    fn initialize(&self) -> RuntimeResult<()> {
        Ok(())
    }

    fn finalize(&self) -> i32 {
        0
    }

    fn import_module(&self, name: &str) -> RuntimeResult<()> {
        self.imports.lock().unwrap().push(name.to_string());
        if self.failing.as_deref() == Some(name) {
            return Err(RuntimeError::Import {
                module: name.to_string(),
                reason: "ModuleNotFoundError".to_string(),
            });
        }
        Ok(())
    }

    fn append_search_paths(&self, _paths: &SearchPathSet) -> RuntimeResult<()> {
        Ok(())
    }

    fn release_lock(&self) -> RuntimeResult<ThreadToken> {
        Err(RuntimeError::Lock("not supported".to_string()))
    }

    fn reacquire_lock(&self, _token: ThreadToken) {}

    fn search_paths(&self) -> Option<String> {
        None
    }
}

/// Lister yielding a scripted sequence of results.
struct ScriptedLister(Vec<Result<OsString, io::ErrorKind>>);

impl DirectoryLister for ScriptedLister {
    fn open(&self, _dir: &Path) -> io::Result<EntryNames> {
        let entries: Vec<io::Result<OsString>> = self
            .0
            .iter()
            .map(|e| e.clone().map_err(io::Error::from))
            .collect();
        Ok(Box::new(entries.into_iter()))
    }
}

#[test]
fn test_imports_every_directory_entry() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir(temp_dir.path().join("alpha")).unwrap();
    std::fs::create_dir(temp_dir.path().join("beta")).unwrap();
    let runtime = ImportRecorder::default();

    let imported =
        load_extension_modules(&runtime, &FsLister, Some(temp_dir.path()), "addon.extension")
            .unwrap();

    assert_eq!(imported, 2);
    let imports: BTreeSet<_> = runtime.imports().into_iter().collect();
    assert_eq!(
        imports,
        BTreeSet::from([
            module_name("addon.extension", "alpha"),
            module_name("addon.extension", "beta"),
        ])
    );
}

#[test]
fn test_missing_directory_means_no_extensions() {
    let temp_dir = TempDir::new().unwrap();
    let runtime = ImportRecorder::default();

    let imported = load_extension_modules(
        &runtime,
        &FsLister,
        Some(temp_dir.path().join("missing").as_path()),
        "addon.extension",
    )
    .unwrap();

    assert_eq!(imported, 0);
    assert!(runtime.imports().is_empty());
}

#[test]
fn test_absent_or_empty_path() {
    let runtime = ImportRecorder::default();

    assert_eq!(
        load_extension_modules(&runtime, &FsLister, None, "addon.extension").unwrap(),
        0
    );
    assert_eq!(
        load_extension_modules(&runtime, &FsLister, Some(Path::new("")), "addon.extension")
            .unwrap(),
        0
    );
    assert!(runtime.imports().is_empty());
}

#[test]
fn test_unreadable_entries_are_skipped() {
    let lister = ScriptedLister(vec![
        Ok(OsString::from(".")),
        Err(io::ErrorKind::PermissionDenied),
        Ok(OsString::from_vec(vec![b'b', 0xff, b'd'])),
        Ok(OsString::from("..")),
        Ok(OsString::from("gamma")),
    ]);
    let runtime = ImportRecorder::default();

    let imported =
        load_extension_modules(&runtime, &lister, Some(Path::new("/app/ext")), "pkg").unwrap();

    assert_eq!(imported, 1);
    assert_eq!(runtime.imports(), vec!["pkg.gamma".to_string()]);
}

#[test]
fn test_failed_import_stops_the_scan() {
    let lister = ScriptedLister(vec![
        Ok(OsString::from("alpha")),
        Ok(OsString::from("beta")),
        Ok(OsString::from("gamma")),
    ]);
    let runtime = ImportRecorder::failing_on("pkg.beta");

    let err =
        load_extension_modules(&runtime, &lister, Some(Path::new("/app/ext")), "pkg").unwrap_err();

    assert!(matches!(err, RuntimeError::Import { ref module, .. } if module == "pkg.beta"));
    assert_eq!(runtime.imports(), vec!["pkg.alpha", "pkg.beta"]);
}
