//! Registration with the host framework.
//!
//! Loading the shared object constructs one [`PyInitAddon`] and registers it
//! under [`ADDON_NAME`]; unloading unregisters and drops it. The
//! `py-init-addon` shared object calls [`on_load`] and [`on_unload`] from its
//! initializer and finalizer sections. Other hosts call them themselves.

use crate::addon::{PyInitAddon, ADDON_NAME};
use crate::config::{BootstrapConfig, LoggingConfig};
use crate::logging::init_logging;
use anyhow::Context;
use pyinit_addon_api::{AddonHandle, AddonRegistry};
use pyinit_runtime::{own_module_dir, RuntimeResult};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

/// Register `addon` under [`ADDON_NAME`].
///
/// A second registration is a host framework bug. It is logged and the new
/// addon is dropped.
pub fn register_into(registry: &mut AddonRegistry, addon: PyInitAddon) -> Option<AddonHandle> {
    let handle: AddonHandle = Arc::new(Mutex::new(addon));
    match registry.register(ADDON_NAME, Arc::clone(&handle)) {
        Ok(()) => Some(handle),
        Err(e) => {
            error!("Failed to register {}: {}", ADDON_NAME, e);
            None
        }
    }
}

/// Unregister the addon, handing it back for dropping.
pub fn unregister_from(registry: &mut AddonRegistry) -> Option<AddonHandle> {
    match registry.unregister(ADDON_NAME) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to unregister {}: {}", ADDON_NAME, e);
            None
        }
    }
}

/// Build the addon from the configuration in `module_dir`.
///
/// Logging is installed from the chosen configuration before any problem
/// with that configuration is reported.
pub fn build_addon_from(
    module_dir: RuntimeResult<PathBuf>,
    install_logging: impl FnOnce(&LoggingConfig) -> bool,
) -> PyInitAddon {
    let loaded = module_dir
        .context("Cannot locate the addon directory")
        .and_then(|dir| BootstrapConfig::find_in(&dir));
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => BootstrapConfig::default(),
    };

    install_logging(&config.logging);
    if let Err(e) = loaded {
        warn!("Using default configuration: {:#}", e);
    }

    PyInitAddon::new(config)
}

/// Build the addon from the configuration next to the shared object.
pub fn build_addon() -> PyInitAddon {
    build_addon_from(own_module_dir(), init_logging)
}

/// Shared object load: register the addon with the global registry.
pub fn on_load() {
    let addon = build_addon();
    let mut registry = AddonRegistry::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    register_into(&mut registry, addon);
}

/// Shared object unload: unregister and drop the addon.
///
/// Runs from the finalizer section inside `exit()`, so it emits no events.
pub fn on_unload() {
    let handle = AddonRegistry::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take(ADDON_NAME);
    drop(handle);
}
