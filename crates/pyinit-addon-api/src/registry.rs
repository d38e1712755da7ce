//! Addon registry.
//!
//! Addons register under a unique name when their shared object is loaded and
//! unregister when it is unloaded. The host looks them up by name to drive
//! their lifecycle.

use crate::addon::Addon;
use crate::error::{AddonError, AddonResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Shared handle to a registered addon.
pub type AddonHandle = Arc<Mutex<dyn Addon>>;

static GLOBAL: Lazy<Mutex<AddonRegistry>> = Lazy::new(|| Mutex::new(AddonRegistry::new()));

/// Registry of loaded addons by name.
pub struct AddonRegistry {
    addons: HashMap<String, AddonHandle>,
}

impl AddonRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            addons: HashMap::new(),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Mutex<AddonRegistry> {
        &GLOBAL
    }

    /// Register an addon under `name`.
    pub fn register(&mut self, name: &str, addon: AddonHandle) -> AddonResult<()> {
        if self.addons.contains_key(name) {
            return Err(AddonError::AlreadyRegistered(name.to_string()));
        }

        self.addons.insert(name.to_string(), addon);
        info!("Registered addon: {}", name);
        Ok(())
    }

    /// Unregister the addon under `name`, handing it back.
    pub fn unregister(&mut self, name: &str) -> AddonResult<AddonHandle> {
        let addon = self
            .addons
            .remove(name)
            .ok_or_else(|| AddonError::NotFound(name.to_string()))?;

        info!("Unregistered addon: {}", name);
        Ok(addon)
    }

    /// Remove the addon under `name` without emitting any events.
    ///
    /// For shared object finalizers: those run inside `exit()`, after thread
    /// locals are destroyed, where a subscriber can no longer be reached.
    pub fn take(&mut self, name: &str) -> Option<AddonHandle> {
        self.addons.remove(name)
    }

    /// Get an addon by name.
    pub fn get(&self, name: &str) -> Option<AddonHandle> {
        self.addons.get(name).cloned()
    }

    /// Check if an addon is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.addons.contains_key(name)
    }

    /// Names of all registered addons.
    pub fn names(&self) -> Vec<String> {
        self.addons.keys().cloned().collect()
    }

    /// Number of registered addons.
    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }
}

impl Default for AddonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::{AddonEnv, InstanceContext};
    use std::any::Any;

    struct NoopAddon;

    impl Addon for NoopAddon {
        fn on_init(&mut self, env: &mut dyn AddonEnv) -> AddonResult<()> {
            env.on_init_done();
            Ok(())
        }

        fn on_deinit(&mut self, env: &mut dyn AddonEnv) -> AddonResult<()> {
            env.on_deinit_done();
            Ok(())
        }

        fn on_create_instance(&mut self, _: &mut dyn AddonEnv, _: &str, _: InstanceContext) {}

        fn on_destroy_instance(
            &mut self,
            _: &mut dyn AddonEnv,
            _: Box<dyn Any + Send>,
            _: InstanceContext,
        ) {
        }
    }

    fn noop() -> AddonHandle {
        Arc::new(Mutex::new(NoopAddon))
    }

    #[test]
    fn test_registry_register() {
        let mut registry = AddonRegistry::new();
        registry.register("noop", noop()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("noop"));
        assert!(registry.get("noop").is_some());
        assert_eq!(registry.names(), vec!["noop".to_string()]);
    }

    #[test]
    fn test_registry_rejects_duplicate() {
        let mut registry = AddonRegistry::new();
        registry.register("noop", noop()).unwrap();

        let err = registry.register("noop", noop()).unwrap_err();
        assert!(matches!(err, AddonError::AlreadyRegistered(name) if name == "noop"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_unregister() {
        let mut registry = AddonRegistry::new();
        let handle = noop();
        registry.register("noop", Arc::clone(&handle)).unwrap();

        let removed = registry.unregister("noop").unwrap();
        assert!(Arc::ptr_eq(&removed, &handle));
        assert!(registry.is_empty());

        assert!(matches!(
            registry.unregister("noop"),
            Err(AddonError::NotFound(_))
        ));
    }

    #[test]
    fn test_registry_take() {
        let mut registry = AddonRegistry::new();
        let handle = noop();
        registry.register("noop", Arc::clone(&handle)).unwrap();

        let taken = registry.take("noop").unwrap();
        assert!(Arc::ptr_eq(&taken, &handle));
        assert!(!registry.contains("noop"));
        assert!(registry.take("noop").is_none());
    }
}
