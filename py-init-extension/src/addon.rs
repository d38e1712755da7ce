//! The py_init addon.
//!
//! Apps whose entry point is not Python get their Python runtime from this
//! addon: `on_init` starts the interpreter, completes its module search path,
//! imports every Python extension of the app, and then releases the GIL so
//! that other threads can run Python code. `on_deinit` undoes it.
//!
//! When the process already runs Python (a Python main program, or a worker
//! spawned by `multiprocessing` in `spawn` mode), the interpreter is up before
//! this addon is loaded, typically while the main thread is in the middle of
//! an import that dragged the host framework in. Importing the extensions
//! again from here would be a circular import, and releasing the GIL would
//! take it away from the Python main thread. So the first thing `on_init`
//! does is ask whether the runtime is already initialized, and if it is, the
//! addon does nothing else for the rest of its life.
//!
//! The check needs no lock of its own: without Python main the runtime is not
//! running yet, and with Python main `on_init` runs on the Python main thread
//! with the GIL held.

use crate::config::BootstrapConfig;
use pyinit_addon_api::{Addon, AddonEnv, AddonError, AddonResult, InstanceContext};
use pyinit_runtime::{
    load_extension_modules, own_module_dir, resolve_relative, CPython, DirectoryLister,
    DlopenPreloader, FsLister, ManagedRuntime, NativePreloader, SearchPathSet, ThreadToken,
};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Name the addon registers under.
pub const ADDON_NAME: &str = "py_init_extension_cpp";

/// Where the addon is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonPhase {
    Unstarted,
    CheckingOwnership,
    /// Someone else initialized the runtime; the addon stays out of the way.
    AlreadyRunning,
    Initializing,
    /// Runtime up, extensions imported, GIL released.
    RunningSuspended,
    Resuming,
    Finalized,
}

impl fmt::Display for AddonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddonPhase::Unstarted => "unstarted",
            AddonPhase::CheckingOwnership => "checking ownership",
            AddonPhase::AlreadyRunning => "already running",
            AddonPhase::Initializing => "initializing",
            AddonPhase::RunningSuspended => "running (suspended)",
            AddonPhase::Resuming => "resuming",
            AddonPhase::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// How the addon finds its own directory.
#[derive(Debug, Clone)]
pub enum ModuleLocation {
    /// Ask the dynamic loader which object contains this code.
    SelfLocated,
    /// Use a known directory.
    Fixed(PathBuf),
}

impl ModuleLocation {
    fn resolve(&self) -> PathBuf {
        match self {
            ModuleLocation::Fixed(dir) => dir.clone(),
            ModuleLocation::SelfLocated => match own_module_dir() {
                Ok(dir) => dir,
                Err(e) => fatal("Failed to get module path", e),
            },
        }
    }
}

/// Bootstraps the embedded Python runtime for the host app.
pub struct PyInitAddon {
    config: BootstrapConfig,
    location: ModuleLocation,
    runtime: Box<dyn ManagedRuntime>,
    preloader: Box<dyn NativePreloader>,
    lister: Box<dyn DirectoryLister>,

    phase: AddonPhase,

    /// Whether this addon called initialize, and so owes the finalize.
    /// `None` until `on_init` has checked.
    owns_initialization: Option<bool>,

    /// Thread state saved when the GIL was released at the end of `on_init`.
    saved_thread: Option<ThreadToken>,
}

impl PyInitAddon {
    /// Create the addon with the CPython runtime and real file system.
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            location: ModuleLocation::SelfLocated,
            runtime: Box::new(CPython::new()),
            preloader: Box::new(DlopenPreloader),
            lister: Box::new(FsLister),
            phase: AddonPhase::Unstarted,
            owns_initialization: None,
            saved_thread: None,
        }
    }

    /// Use a different managed runtime.
    pub fn with_runtime(mut self, runtime: impl ManagedRuntime + 'static) -> Self {
        self.runtime = Box::new(runtime);
        self
    }

    /// Use a different native library preloader.
    pub fn with_preloader(mut self, preloader: impl NativePreloader + 'static) -> Self {
        self.preloader = Box::new(preloader);
        self
    }

    /// Use a different directory lister.
    pub fn with_lister(mut self, lister: impl DirectoryLister + 'static) -> Self {
        self.lister = Box::new(lister);
        self
    }

    /// Treat `dir` as the addon's own directory instead of asking the loader.
    pub fn with_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.location = ModuleLocation::Fixed(dir.into());
        self
    }

    pub fn phase(&self) -> AddonPhase {
        self.phase
    }

    /// Whether this addon initialized the runtime; `None` before `on_init`.
    pub fn owns_initialization(&self) -> Option<bool> {
        self.owns_initialization
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    fn preload_native_library(&self) {
        let runtime = &self.config.runtime;
        if let Err(e) = self
            .preloader
            .preload(&runtime.native_library, runtime.symbol_scope)
        {
            fatal("Failed to preload the Python bindings", e);
        }
    }

    /// Make `<app_root>/lib`, `<app_root>/interface` and `<app_root>`
    /// importable.
    fn complete_search_paths(&self, module_dir: &Path) -> AddonResult<()> {
        let layout = &self.config.layout;
        let app_root = match resolve_relative(module_dir, &layout.app_root) {
            Ok(root) => root,
            Err(e) => {
                warn!("Failed to get real path of app root: {}", e);
                return Ok(());
            }
        };

        let paths = SearchPathSet::for_app_root(&app_root, &layout.search_subdirs);
        debug!("Appending {} search paths under {:?}", paths.len(), app_root);
        self.runtime.append_search_paths(&paths)?;
        Ok(())
    }

    fn extensions_dir(&self, module_dir: &Path) -> Option<PathBuf> {
        match resolve_relative(module_dir, &self.config.layout.extensions_dir) {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!("Failed to get real path of addon extensions: {}", e);
                None
            }
        }
    }

    fn invalid_phase(&self, operation: &'static str) -> AddonError {
        AddonError::InvalidPhase {
            addon: ADDON_NAME.to_string(),
            operation,
            phase: self.phase.to_string(),
        }
    }
}

impl Addon for PyInitAddon {
    fn on_init(&mut self, env: &mut dyn AddonEnv) -> AddonResult<()> {
        info!("{} on_init", ADDON_NAME);

        if self.phase != AddonPhase::Unstarted {
            return Err(self.invalid_phase("init"));
        }

        self.phase = AddonPhase::CheckingOwnership;
        if self.runtime.is_initialized() {
            info!("Python runtime has been initialized");
            self.owns_initialization = Some(false);
            self.phase = AddonPhase::AlreadyRunning;
            env.on_init_done();
            return Ok(());
        }

        self.owns_initialization = Some(true);
        self.phase = AddonPhase::Initializing;

        // Python extension modules need symbols from the bindings library,
        // which only resolve if it was loaded globally beforehand.
        self.preload_native_library();

        if let Err(e) = self.runtime.initialize() {
            fatal("Failed to initialize the Python runtime", e);
        }

        // The search path has to be complete before the first import.
        let module_dir = self.location.resolve();
        self.complete_search_paths(&module_dir)?;

        if let Some(sys_path) = self.runtime.search_paths() {
            info!("Python initialized, sys.path: {}", sys_path);
        }

        let extensions_dir = self.extensions_dir(&module_dir);
        if let Some(dir) = extensions_dir.as_deref() {
            load_extension_modules(
                self.runtime.as_ref(),
                self.lister.as_ref(),
                Some(dir),
                &self.config.runtime.extension_package,
            )?;
        }

        match self.runtime.release_lock() {
            Ok(token) => {
                debug!("Released the GIL, thread state {:#x}", token.addr());
                self.saved_thread = Some(token);
            }
            Err(e) => fatal("Failed to release the GIL", e),
        }

        self.phase = AddonPhase::RunningSuspended;
        env.on_init_done();
        Ok(())
    }

    fn on_deinit(&mut self, env: &mut dyn AddonEnv) -> AddonResult<()> {
        info!("{} on_deinit", ADDON_NAME);

        if self.phase == AddonPhase::Finalized {
            warn!("{} is already finalized", ADDON_NAME);
            env.on_deinit_done();
            return Ok(());
        }

        self.phase = AddonPhase::Resuming;

        if let Some(token) = self.saved_thread.take() {
            debug!("Restoring thread state {:#x}", token.addr());
            self.runtime.reacquire_lock(token);
        }

        if self.owns_initialization == Some(true) {
            let rc = self.runtime.finalize();
            if rc < 0 {
                error!("Failed to finalize python runtime, rc: {}", rc);
                panic!("Failed to finalize python runtime, rc: {}", rc);
            }
            info!("Python runtime finalized");
        }

        self.phase = AddonPhase::Finalized;
        env.on_deinit_done();
        Ok(())
    }

    fn on_create_instance(&mut self, _env: &mut dyn AddonEnv, name: &str, _context: InstanceContext) {
        error!("{} asked to create instance {}", ADDON_NAME, name);
        panic!("{} does not create instances", ADDON_NAME);
    }

    fn on_destroy_instance(
        &mut self,
        _env: &mut dyn AddonEnv,
        _instance: Box<dyn Any + Send>,
        _context: InstanceContext,
    ) {
        error!("{} asked to destroy an instance", ADDON_NAME);
        panic!("{} does not create instances", ADDON_NAME);
    }
}

/// Log and abort on a condition the addon cannot continue from.
fn fatal(what: &str, err: impl fmt::Display) -> ! {
    error!("{}: {}", what, err);
    panic!("{}: {}", what, err);
}
