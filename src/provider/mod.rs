//! Built-in providers

pub mod file;

use declarative::{ResourceRegistry, ResourceResolver};
use std::sync::Arc;

/// Resolver knowing every built-in kind
pub fn resolver() -> declarative::Result<ResourceResolver> {
    let resolver = ResourceResolver::new(Arc::new(ResourceRegistry::new()));
    for descriptor in file::descriptors() {
        resolver.register::<file::FileResource>(descriptor)?;
    }
    Ok(resolver)
}
