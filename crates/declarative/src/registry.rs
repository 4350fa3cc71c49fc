//! Catalog of registered resource kinds
//!
//! The registry is built once by the application root, shared by `Arc`, and
//! read concurrently afterwards. Registrations take the write lock, so the
//! conflict check and the insert happen atomically.

use crate::error::{Error, Result};
use crate::resource::{ResourceDescriptor, ResourceType, opt_eq_ignore_case};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    by_type: HashMap<ResourceType, Arc<ResourceDescriptor>>,
    descriptors: Vec<Arc<ResourceDescriptor>>,
}

/// Registry mapping resource types to their descriptors
#[derive(Default)]
pub struct ResourceRegistry {
    inner: RwLock<Inner>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a descriptor
    ///
    /// Fails with [`Error::ConflictingResourceDefinition`] when the type is
    /// already registered; the existing registration is kept.
    pub fn register(&self, descriptor: ResourceDescriptor) -> Result<Arc<ResourceDescriptor>> {
        let mut inner = self.write();

        if let Some(existing) = inner.by_type.get(descriptor.resource_type()) {
            return Err(Error::ConflictingResourceDefinition {
                resource_type: descriptor.resource_type().clone(),
                existing: existing.binding().to_string(),
                conflicting: descriptor.binding().to_string(),
            });
        }

        let descriptor = Arc::new(descriptor);
        inner
            .by_type
            .insert(descriptor.resource_type().clone(), Arc::clone(&descriptor));
        inner.descriptors.push(Arc::clone(&descriptor));

        log::debug!(
            "Registered resource {} -> {}",
            descriptor.resource_type(),
            descriptor.binding()
        );
        Ok(descriptor)
    }

    /// Get the descriptor for a type, or [`Error::ResourceNotFound`]
    pub fn get_descriptor_by_type(&self, resource_type: &ResourceType) -> Result<Arc<ResourceDescriptor>> {
        self.find_descriptor_by_type(resource_type)
            .ok_or_else(|| Error::ResourceNotFound(resource_type.clone()))
    }

    /// Exact-key lookup
    pub fn find_descriptor_by_type(&self, resource_type: &ResourceType) -> Option<Arc<ResourceDescriptor>> {
        self.read().by_type.get(resource_type).cloned()
    }

    /// Lookup by individual fields
    ///
    /// Case-sensitive lookups use the exact key; otherwise every descriptor is
    /// scanned with a case-insensitive comparison.
    pub fn find_descriptor(
        &self,
        kind: &str,
        group: Option<&str>,
        api_version: Option<&str>,
        case_sensitive: bool,
    ) -> Option<Arc<ResourceDescriptor>> {
        let key = ResourceType {
            group: group.map(str::to_string),
            api_version: api_version.map(str::to_string),
            kind: kind.to_string(),
        };

        if case_sensitive {
            return self.find_descriptor_by_type(&key);
        }

        self.read()
            .descriptors
            .iter()
            .find(|d| d.resource_type().matches_ignore_case(&key))
            .cloned()
    }

    /// All descriptors in registration order
    pub fn all_descriptors(&self) -> Vec<Arc<ResourceDescriptor>> {
        self.read().descriptors.clone()
    }

    fn scan<F>(&self, predicate: F) -> Vec<Arc<ResourceDescriptor>>
    where
        F: Fn(&ResourceDescriptor) -> bool,
    {
        self.read()
            .descriptors
            .iter()
            .filter(|d| predicate(d))
            .cloned()
            .collect()
    }

    pub fn descriptors_by_group(&self, group: &str) -> Vec<Arc<ResourceDescriptor>> {
        self.scan(|d| opt_eq_ignore_case(d.group(), Some(group)))
    }

    pub fn descriptors_by_group_and_kind(&self, group: &str, kind: &str) -> Vec<Arc<ResourceDescriptor>> {
        self.scan(|d| opt_eq_ignore_case(d.group(), Some(group)) && d.kind().eq_ignore_ascii_case(kind))
    }

    pub fn descriptors_by_group_and_version(
        &self,
        group: &str,
        api_version: &str,
    ) -> Vec<Arc<ResourceDescriptor>> {
        self.scan(|d| {
            opt_eq_ignore_case(d.group(), Some(group))
                && opt_eq_ignore_case(d.api_version(), Some(api_version))
        })
    }

    /// Descriptors designated by a kind, singular, plural or short name
    pub fn descriptors_by_name(&self, name: &str) -> Vec<Arc<ResourceDescriptor>> {
        self.scan(|d| d.is_named(name))
    }

    pub fn len(&self) -> usize {
        self.read().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
