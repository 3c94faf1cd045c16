//! Providers shipped with the core
//!
//! Vendor adapters live in their own crates; only the in-memory provider is
//! built in.

pub mod memory;

pub use memory::{MemoryFactory, MemoryProvider};

use crate::registry::ProviderRegistry;

/// Register the built-in providers
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_provider("memory", Box::new(MemoryFactory));
}
