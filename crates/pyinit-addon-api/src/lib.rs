//! # pyinit-addon-api
//!
//! The host plugin framework's view of an addon.
//!
//! This crate provides:
//!
//! - The [`Addon`] lifecycle trait the host drives
//! - The [`AddonEnv`] completion handle passed to every lifecycle call
//! - The [`AddonRegistry`] addons register themselves into when their shared
//!   object is loaded

pub mod addon;
pub mod error;
pub mod registry;

pub use addon::{Addon, AddonEnv, InstanceContext};
pub use error::{AddonError, AddonResult};
pub use registry::{AddonHandle, AddonRegistry};
