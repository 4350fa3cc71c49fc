//! Resolution of loosely-typed documents to concrete resource types
//!
//! A [`ResourceResolver`] keeps a kind-registration map from [`ResourceType`] to
//! a binding that deserializes the document body into a concrete
//! [`Resource`]. Documents that miss the map are handed to a chain of
//! [`ResourceTypeResolver`]s; documents nobody resolves become a
//! [`GenericResource`].

use crate::error::{Error, Result};
use crate::registry::ResourceRegistry;
use crate::resource::{GenericResource, Resource, ResourceDescriptor, ResourceList, ResourceType};
use crate::version::ApiVersion;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A parsed, loosely-typed resource document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub group: Option<String>,
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub body: Value,
}

impl Document {
    /// Build a document from a parsed body
    ///
    /// `apiVersion: group/version` is split into group and version; an explicit
    /// `group` field is used when `apiVersion` carries no group.
    pub fn from_value(body: Value) -> Self {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let (mut group, api_version) = match field("apiVersion") {
            Some(raw) => match raw.split_once('/') {
                Some((group, version)) => (non_empty(group), non_empty(version)),
                None => (None, Some(raw)),
            },
            None => (None, None),
        };
        if group.is_none() {
            group = field("group");
        }

        Self {
            group,
            api_version,
            kind: field("kind"),
            body,
        }
    }

    /// Key used for the exact-match lookup, when the document has a kind
    pub fn resource_type(&self) -> Option<ResourceType> {
        self.kind.as_ref().map(|kind| ResourceType {
            group: self.group.clone(),
            api_version: self.api_version.clone(),
            kind: kind.clone(),
        })
    }

    /// Rewrite the document's version fields to the canonical ones of `resolved`
    fn normalize(&mut self, resolved: &ResourceType) {
        self.group.clone_from(&resolved.group);
        self.api_version.clone_from(&resolved.api_version);
        self.kind = Some(resolved.kind.clone());

        if let (Value::Object(map), Some(qualified)) =
            (&mut self.body, resolved.qualified_api_version())
        {
            map.insert("apiVersion".to_string(), Value::String(qualified));
            map.insert("kind".to_string(), Value::String(resolved.kind.clone()));
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Element of the fallback chain consulted on exact-match misses
pub trait ResourceTypeResolver: Send + Sync {
    /// Return the canonical type the document should resolve to, if any
    fn resolve(&self, document: &Document) -> Result<Option<ResourceType>>;
}

/// Resolves `(group, kind)` to the newest registered API version
pub struct LatestVersionResolver {
    registry: Arc<ResourceRegistry>,
}

impl LatestVersionResolver {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }
}

impl ResourceTypeResolver for LatestVersionResolver {
    fn resolve(&self, document: &Document) -> Result<Option<ResourceType>> {
        let (Some(group), Some(kind)) = (document.group.as_deref(), document.kind.as_deref()) else {
            return Ok(None);
        };

        let mut candidates = Vec::new();
        for descriptor in self.registry.descriptors_by_group_and_kind(group, kind) {
            if let Some(version) = descriptor.api_version() {
                candidates.push((ApiVersion::parse(version)?, descriptor));
            }
        }

        let latest = candidates
            .into_iter()
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, descriptor)| descriptor.resource_type().clone());

        if let Some(resolved) = &latest {
            log::debug!(
                "Resolved {}/{} to latest version {}",
                group,
                kind,
                resolved.api_version.as_deref().unwrap_or_default()
            );
        }
        Ok(latest)
    }
}

type BindFn = dyn Fn(Value) -> serde_json::Result<Box<dyn Resource>> + Send + Sync;

#[derive(Clone)]
struct KindBinding {
    name: &'static str,
    bind: Arc<BindFn>,
}

/// Maps documents to concrete resources
///
/// Kind registrations are last-write-wins, unlike the conflict-checked
/// [`ResourceRegistry`]: re-registering a kind replaces its binding.
pub struct ResourceResolver {
    registry: Arc<ResourceRegistry>,
    kinds: RwLock<HashMap<ResourceType, KindBinding>>,
    resolvers: Vec<Box<dyn ResourceTypeResolver>>,
}

impl ResourceResolver {
    /// Create a resolver with the latest-version fallback
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        let fallback = LatestVersionResolver::new(Arc::clone(&registry));
        Self::without_fallback(registry).with_resolver(fallback)
    }

    /// Create a resolver with an empty fallback chain
    pub fn without_fallback(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            kinds: RwLock::new(HashMap::new()),
            resolvers: Vec::new(),
        }
    }

    /// Append a resolver to the fallback chain
    pub fn with_resolver(mut self, resolver: impl ResourceTypeResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Register a descriptor in the registry and bind its type to `R`
    pub fn register<R>(&self, descriptor: ResourceDescriptor) -> Result<Arc<ResourceDescriptor>>
    where
        R: Resource + DeserializeOwned,
    {
        let descriptor = self.registry.register(descriptor)?;
        self.register_kind::<R>(descriptor.resource_type().clone());
        Ok(descriptor)
    }

    /// Bind a resource type to `R`, replacing any previous binding
    ///
    /// Returns the name of the replaced binding.
    pub fn register_kind<R>(&self, resource_type: ResourceType) -> Option<&'static str>
    where
        R: Resource + DeserializeOwned,
    {
        let binding = KindBinding {
            name: std::any::type_name::<R>(),
            bind: Arc::new(|body: Value| -> serde_json::Result<Box<dyn Resource>> {
                let resource: R = serde_json::from_value(body)?;
                Ok(Box::new(resource))
            }),
        };

        let mut kinds = match self.kinds.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let replaced = kinds.insert(resource_type.clone(), binding).map(|b| b.name);
        if let Some(previous) = replaced {
            log::warn!(
                "Kind {} rebound from {} to {}",
                resource_type,
                previous,
                std::any::type_name::<R>()
            );
        }
        replaced
    }

    fn binding(&self, resource_type: &ResourceType) -> Option<KindBinding> {
        let kinds = match self.kinds.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        kinds.get(resource_type).cloned()
    }

    /// Resolve a document to a resource
    ///
    /// Resolution misses are not errors: they yield a [`GenericResource`].
    pub fn resolve(&self, mut document: Document) -> Result<Box<dyn Resource>> {
        let Some(key) = document.resource_type() else {
            log::debug!("Document without kind, keeping it untyped");
            return Ok(Box::new(GenericResource::new(None, document.body)));
        };

        if let Some(binding) = self.binding(&key) {
            return bind(&binding, key, document.body);
        }

        if document.group.is_some() {
            for resolver in &self.resolvers {
                let Some(resolved) = resolver.resolve(&document)? else {
                    continue;
                };
                if let Some(binding) = self.binding(&resolved) {
                    document.normalize(&resolved);
                    return bind(&binding, resolved, document.body);
                }
            }
        }

        log::debug!("No binding for {key}, keeping it untyped");
        Ok(Box::new(GenericResource::new(Some(key), document.body)))
    }

    /// Resolve every document, stopping at the first error
    pub fn resolve_all<I>(&self, documents: I) -> Result<ResourceList<Box<dyn Resource>>>
    where
        I: IntoIterator<Item = Document>,
    {
        documents
            .into_iter()
            .map(|d| self.resolve(d))
            .collect::<Result<Vec<_>>>()
            .map(ResourceList::new)
    }
}

fn bind(binding: &KindBinding, resource_type: ResourceType, body: Value) -> Result<Box<dyn Resource>> {
    (binding.bind)(body).map_err(|source| Error::InvalidResource {
        resource_type,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ObjectMeta;
    use serde::Deserialize;
    use serde_json::json;
    use std::any::Any;

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Topic {
        api_version: String,
        metadata: ObjectMeta,
        #[serde(default)]
        partitions: u32,
    }

    impl Resource for Topic {
        fn resource_type(&self) -> ResourceType {
            let (group, version) = self.api_version.split_once('/').unwrap_or(("", self.api_version.as_str()));
            ResourceType::of(group, version, "Topic")
        }

        fn metadata(&self) -> &ObjectMeta {
            &self.metadata
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    struct OtherTopic {
        metadata: ObjectMeta,
    }

    impl Resource for OtherTopic {
        fn resource_type(&self) -> ResourceType {
            ResourceType::kind("Topic")
        }

        fn metadata(&self) -> &ObjectMeta {
            &self.metadata
        }
    }

    fn resolver_with_versions(versions: &[&str]) -> ResourceResolver {
        let resolver = ResourceResolver::new(Arc::new(ResourceRegistry::new()));
        for version in versions {
            resolver
                .register::<Topic>(ResourceDescriptor::for_type::<Topic>(ResourceType::of(
                    "x", *version, "Topic",
                )))
                .unwrap();
        }
        resolver
    }

    fn as_topic(resource: &dyn Resource) -> &Topic {
        let any: &dyn Any = resource;
        any.downcast_ref::<Topic>().expect("resolved to Topic")
    }

    #[test]
    fn test_document_from_value_splits_api_version() {
        let doc = Document::from_value(json!({"apiVersion": "x/v1", "kind": "Topic"}));
        assert_eq!(doc.group.as_deref(), Some("x"));
        assert_eq!(doc.api_version.as_deref(), Some("v1"));
        assert_eq!(doc.kind.as_deref(), Some("Topic"));

        let doc = Document::from_value(json!({"group": "x", "kind": "Topic"}));
        assert_eq!(doc.group.as_deref(), Some("x"));
        assert_eq!(doc.api_version, None);
    }

    #[test]
    fn test_exact_match() {
        let resolver = resolver_with_versions(&["v1beta1", "v1"]);
        let doc = Document::from_value(json!({
            "apiVersion": "x/v1beta1",
            "kind": "Topic",
            "metadata": {"name": "orders"},
            "partitions": 3
        }));

        let resource = resolver.resolve(doc).unwrap();
        let topic = as_topic(resource.as_ref());
        assert_eq!(topic.api_version, "x/v1beta1");
        assert_eq!(topic.partitions, 3);
    }

    #[test]
    fn test_missing_version_resolves_to_latest_and_is_normalized() {
        let resolver = resolver_with_versions(&["v1beta1", "v1"]);
        let doc = Document::from_value(json!({
            "group": "x",
            "kind": "Topic",
            "metadata": {"name": "orders"}
        }));

        let resource = resolver.resolve(doc).unwrap();
        let topic = as_topic(resource.as_ref());
        assert_eq!(topic.api_version, "x/v1");
        assert_eq!(resource.resource_type(), ResourceType::of("x", "v1", "Topic"));
    }

    #[test]
    fn test_unknown_version_resolves_to_latest() {
        let resolver = resolver_with_versions(&["v1alpha1", "v1beta2"]);
        let doc = Document::from_value(json!({
            "apiVersion": "x/v9",
            "kind": "Topic",
            "metadata": {"name": "orders"}
        }));

        let topic_version = as_topic(resolver.resolve(doc).unwrap().as_ref()).api_version.clone();
        assert_eq!(topic_version, "x/v1beta2");
    }

    #[test]
    fn test_unresolved_documents_become_generic() {
        let resolver = resolver_with_versions(&["v1"]);

        let unknown_kind = Document::from_value(json!({"apiVersion": "x/v1", "kind": "Acl"}));
        let no_group = Document::from_value(json!({"apiVersion": "v1", "kind": "Topic"}));
        let no_kind = Document::from_value(json!({"metadata": {"name": "n"}}));

        let list = resolver.resolve_all([unknown_kind, no_group, no_kind]).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.generic().len(), 3);
        assert_eq!(list.generic()[2].name(), "n");
    }

    #[test]
    fn test_malformed_registered_version_propagates() {
        let resolver = resolver_with_versions(&["v1", "latest"]);
        let doc = Document::from_value(json!({"group": "x", "kind": "Topic"}));
        assert!(matches!(
            resolver.resolve(doc),
            Err(Error::InvalidApiVersion(v)) if v == "latest"
        ));
    }

    #[test]
    fn test_body_mismatch_is_an_error() {
        let resolver = resolver_with_versions(&["v1"]);
        let doc = Document::from_value(json!({"apiVersion": "x/v1", "kind": "Topic"}));
        assert!(matches!(resolver.resolve(doc), Err(Error::InvalidResource { .. })));
    }

    #[test]
    fn test_kind_registration_is_last_write_wins() {
        let resolver = resolver_with_versions(&["v1"]);
        let ty = ResourceType::of("x", "v1", "Topic");

        let replaced = resolver.register_kind::<OtherTopic>(ty);
        assert_eq!(replaced, Some(std::any::type_name::<Topic>()));

        let doc = Document::from_value(json!({
            "apiVersion": "x/v1",
            "kind": "Topic",
            "metadata": {"name": "orders"}
        }));
        let resource = resolver.resolve(doc).unwrap();
        let any: &dyn Any = &*resource;
        assert!(any.is::<OtherTopic>());
    }

    #[test]
    fn test_without_fallback_keeps_unknown_versions_generic() {
        let registry = Arc::new(ResourceRegistry::new());
        let resolver = ResourceResolver::without_fallback(Arc::clone(&registry));
        resolver
            .register::<Topic>(ResourceDescriptor::for_type::<Topic>(ResourceType::of("x", "v1", "Topic")))
            .unwrap();

        let doc = Document::from_value(json!({"group": "x", "kind": "Topic"}));
        let list = resolver.resolve_all([doc]).unwrap();
        assert_eq!(list.generic().len(), 1);
    }
}
