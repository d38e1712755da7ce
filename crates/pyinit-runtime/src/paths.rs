//! Self location and path resolution.
//!
//! The addon does not know its install location at compile time. It asks the
//! dynamic loader which object contains one of its own functions and derives
//! every other directory from there.

use crate::error::{RuntimeError, RuntimeResult};
use std::ffi::{c_void, CStr, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered set of directories for the runtime's module resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPathSet {
    paths: Vec<PathBuf>,
}

impl SearchPathSet {
    /// Build from an explicit, already ordered list.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// `root/<subdir>` for every subdirectory, followed by `root` itself.
    pub fn for_app_root<S: AsRef<str>>(root: &Path, subdirs: &[S]) -> Self {
        let mut paths: Vec<PathBuf> = subdirs.iter().map(|s| root.join(s.as_ref())).collect();
        paths.push(root.to_path_buf());
        Self { paths }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Path of the loaded object that contains `addr`.
///
/// Addresses outside every mapped object make the lookup fail.
pub fn module_path_of(addr: *const c_void) -> RuntimeResult<PathBuf> {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };

    // SAFETY: dladdr only reads `addr` as a key and fills `info`.
    let found = unsafe { libc::dladdr(addr, &mut info) };
    if found == 0 || info.dli_fname.is_null() {
        return Err(RuntimeError::SelfLocation(format!(
            "dladdr found no object for address {:p}",
            addr
        )));
    }

    // SAFETY: dli_fname is a NUL-terminated string owned by the loader.
    let name = unsafe { CStr::from_ptr(info.dli_fname) };
    if name.to_bytes().is_empty() {
        return Err(RuntimeError::SelfLocation(
            "loader returned an empty object path".to_string(),
        ));
    }

    Ok(PathBuf::from(OsStr::from_bytes(name.to_bytes())))
}

/// Directory containing the object this crate is linked into.
pub fn own_module_dir() -> RuntimeResult<PathBuf> {
    let module = module_path_of(own_module_dir as *const c_void)?;
    let module = std::fs::canonicalize(&module).unwrap_or(module);
    debug!("Own module: {:?}", module);

    module
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| RuntimeError::SelfLocation(format!("{:?} has no parent directory", module)))
}

/// Normalize `base/relative` into an absolute, symlink-free path.
///
/// Fails with [`RuntimeError::PathResolution`] when the target does not exist.
pub fn resolve_relative(base: &Path, relative: &str) -> RuntimeResult<PathBuf> {
    let joined = base.join(relative);
    std::fs::canonicalize(&joined).map_err(|source| RuntimeError::PathResolution {
        path: joined,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn addon_layout(root: &Path) -> PathBuf {
        let module_dir = root.join("addon/extension/py_init/lib");
        std::fs::create_dir_all(&module_dir).unwrap();
        module_dir
    }

    #[test]
    fn test_resolve_extensions_and_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        let module_dir = addon_layout(&root);

        let extensions = resolve_relative(&module_dir, "../..").unwrap();
        let app_root = resolve_relative(&module_dir, "../../../..").unwrap();

        assert_eq!(extensions, root.join("addon/extension"));
        assert_eq!(app_root, root);
    }

    #[test]
    fn test_resolve_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let module_dir = addon_layout(temp_dir.path());

        let err = resolve_relative(&module_dir, "../../missing").unwrap_err();
        match err {
            RuntimeError::PathResolution { path, .. } => {
                assert!(path.ends_with("missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_search_path_order() {
        let set = SearchPathSet::for_app_root(Path::new("/app"), &["lib", "interface"]);
        let paths: Vec<_> = set.iter().collect();

        assert_eq!(
            paths,
            vec![
                Path::new("/app/lib"),
                Path::new("/app/interface"),
                Path::new("/app"),
            ]
        );
    }

    #[test]
    fn test_own_module_dir_exists() {
        let dir = own_module_dir().unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_module_path_of_unmapped_address() {
        assert!(module_path_of(std::ptr::null()).is_err());
    }
}
