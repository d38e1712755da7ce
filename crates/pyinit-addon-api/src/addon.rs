//! Addon lifecycle as seen by the host framework.
//!
//! The host calls [`Addon::on_init`] once after registration and
//! [`Addon::on_deinit`] once before unregistration. Each call receives an
//! [`AddonEnv`] and must report completion through it exactly once, and only
//! when the phase is fully done.

use crate::error::AddonResult;
use std::any::Any;

/// Opaque, host-owned context threaded through instance creation.
pub type InstanceContext = Box<dyn Any + Send>;

/// Completion signals back to the host framework.
pub trait AddonEnv {
    /// The addon finished initializing.
    fn on_init_done(&mut self);

    /// The addon finished tearing down.
    fn on_deinit_done(&mut self);
}

/// An addon loaded by the host framework.
pub trait Addon: Send {
    /// Initialize the addon.
    ///
    /// Returning `Err` aborts initialization; `on_init_done` is not signaled.
    fn on_init(&mut self, env: &mut dyn AddonEnv) -> AddonResult<()>;

    /// Tear the addon down.
    fn on_deinit(&mut self, env: &mut dyn AddonEnv) -> AddonResult<()>;

    /// Create an instance of whatever this addon provides.
    fn on_create_instance(&mut self, env: &mut dyn AddonEnv, name: &str, context: InstanceContext);

    /// Destroy an instance created by [`on_create_instance`](Self::on_create_instance).
    fn on_destroy_instance(
        &mut self,
        env: &mut dyn AddonEnv,
        instance: Box<dyn Any + Send>,
        context: InstanceContext,
    );
}
