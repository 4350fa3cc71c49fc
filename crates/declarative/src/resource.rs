//! Resource identity, descriptors and the resource trait
//!
//! A [`ResourceType`] identifies a kind of resource by group, API version and
//! kind. A [`ResourceDescriptor`] carries the metadata a registry keeps about a
//! registered kind. Concrete resources implement [`Resource`].

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Annotation marking a desired resource for deletion
pub const DELETE_ANNOTATION: &str = "converge.dev/delete";

/// Identity of a resource kind
///
/// Absent fields are `None`, never the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    pub group: Option<String>,
    pub api_version: Option<String>,
    pub kind: String,
}

impl ResourceType {
    /// Create a fully qualified resource type
    pub fn of(group: impl Into<String>, api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: Some(group.into()),
            api_version: Some(api_version.into()),
            kind: kind.into(),
        }
    }

    /// Create a resource type with only a kind
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            group: None,
            api_version: None,
            kind: kind.into(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Compare with another type ignoring ASCII case on every field
    pub fn matches_ignore_case(&self, other: &Self) -> bool {
        self.kind.eq_ignore_ascii_case(&other.kind)
            && opt_eq_ignore_case(self.group.as_deref(), other.group.as_deref())
            && opt_eq_ignore_case(self.api_version.as_deref(), other.api_version.as_deref())
    }

    /// `group/version` as written in a document's `apiVersion` field
    pub fn qualified_api_version(&self) -> Option<String> {
        match (&self.group, &self.api_version) {
            (Some(group), Some(version)) => Some(format!("{group}/{version}")),
            (None, Some(version)) => Some(version.clone()),
            _ => None,
        }
    }
}

pub(crate) fn opt_eq_ignore_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = self.group.as_deref().unwrap_or("<none>");
        let version = self.api_version.as_deref().unwrap_or("<none>");
        write!(f, "{group}/{version}/{}", self.kind)
    }
}

/// Operations a resource kind supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    List,
    Get,
    Create,
    Update,
    Delete,
    Apply,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Apply => "apply",
        };
        f.write_str(name)
    }
}

/// Metadata about a registered resource kind
///
/// Two descriptors are equal when their resource types are equal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    resource_type: ResourceType,
    description: String,
    binding: String,
    singular_name: Option<String>,
    plural_name: Option<String>,
    short_names: BTreeSet<String>,
    supported_verbs: BTreeSet<Verb>,
    transient: bool,
}

impl ResourceDescriptor {
    /// Create a descriptor bound to an explicit binding identifier
    pub fn new(resource_type: ResourceType, binding: impl Into<String>) -> Self {
        Self {
            resource_type,
            description: String::new(),
            binding: binding.into(),
            singular_name: None,
            plural_name: None,
            short_names: BTreeSet::new(),
            supported_verbs: BTreeSet::new(),
            transient: false,
        }
    }

    /// Create a descriptor bound to the Rust type `R`
    pub fn for_type<R: Resource>(resource_type: ResourceType) -> Self {
        Self::new(resource_type, std::any::type_name::<R>())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_singular_name(mut self, name: impl Into<String>) -> Self {
        self.singular_name = Some(name.into());
        self
    }

    pub fn with_plural_name(mut self, name: impl Into<String>) -> Self {
        self.plural_name = Some(name.into());
        self
    }

    pub fn with_short_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.short_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_verbs(mut self, verbs: impl IntoIterator<Item = Verb>) -> Self {
        self.supported_verbs.extend(verbs);
        self
    }

    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn kind(&self) -> &str {
        &self.resource_type.kind
    }

    pub fn group(&self) -> Option<&str> {
        self.resource_type.group.as_deref()
    }

    pub fn api_version(&self) -> Option<&str> {
        self.resource_type.api_version.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Identifier of the concrete type the kind is bound to
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// Singular name, defaulting to the lower-cased kind
    pub fn singular_name(&self) -> String {
        self.singular_name
            .clone()
            .unwrap_or_else(|| self.resource_type.kind.to_lowercase())
    }

    pub fn plural_name(&self) -> Option<&str> {
        self.plural_name.as_deref()
    }

    pub fn short_names(&self) -> &BTreeSet<String> {
        &self.short_names
    }

    pub fn supported_verbs(&self) -> &BTreeSet<Verb> {
        &self.supported_verbs
    }

    pub fn supports(&self, verb: Verb) -> bool {
        self.supported_verbs.contains(&verb)
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Whether `name` designates this kind (kind, singular, plural or short name)
    pub fn is_named(&self, name: &str) -> bool {
        self.resource_type.kind.eq_ignore_ascii_case(name)
            || self.singular_name().eq_ignore_ascii_case(name)
            || self
                .plural_name
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(name))
            || self.short_names.iter().any(|s| s.eq_ignore_ascii_case(name))
    }
}

impl PartialEq for ResourceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.resource_type == other.resource_type
    }
}

impl Eq for ResourceDescriptor {}

impl Hash for ResourceDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource_type.hash(state);
    }
}

/// Object metadata shared by all resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Whether the resource carries the delete annotation set to `true`
    pub fn is_marked_for_deletion(&self) -> bool {
        self.annotations
            .get(DELETE_ANNOTATION)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Core trait for desired- and actual-state resources
///
/// Implementors are `'static` so a `&dyn Resource` can be upcast to `&dyn Any`
/// and downcast back to its concrete type.
pub trait Resource: Any + Send + Sync + fmt::Debug {
    /// Type of this resource
    fn resource_type(&self) -> ResourceType;

    /// Object metadata
    fn metadata(&self) -> &ObjectMeta;

    /// Name of the resource, unique within its type
    fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// Untyped representation of a resource of unknown kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericResource {
    resource_type: Option<ResourceType>,
    metadata: ObjectMeta,
    body: serde_json::Value,
}

impl GenericResource {
    pub fn new(resource_type: Option<ResourceType>, body: serde_json::Value) -> Self {
        let metadata = body
            .get("metadata")
            .cloned()
            .and_then(|m| serde_json::from_value(m).ok())
            .unwrap_or_default();
        Self {
            resource_type,
            metadata,
            body,
        }
    }

    /// Raw document body
    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }
}

impl Resource for GenericResource {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
            .clone()
            .unwrap_or_else(|| ResourceType::kind("Generic"))
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Ordered list of resources or changes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceList<T> {
    items: Vec<T>,
}

impl<T> ResourceList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Keep only the items matching the predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool,
    {
        Self {
            items: self.items.into_iter().filter(|i| predicate(i)).collect(),
        }
    }
}

impl<T> Default for ResourceList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> FromIterator<T> for ResourceList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for ResourceList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ResourceList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl ResourceList<Box<dyn Resource>> {
    /// Clone out every resource of concrete type `R`
    pub fn downcast<R: Resource + Clone>(&self) -> Vec<R> {
        self.items
            .iter()
            .filter_map(|r| {
                let any: &dyn Any = &**r;
                any.downcast_ref::<R>().cloned()
            })
            .collect()
    }

    /// Resources that did not resolve to a registered kind
    pub fn generic(&self) -> Vec<&GenericResource> {
        self.items
            .iter()
            .filter_map(|r| {
                let any: &dyn Any = &**r;
                any.downcast_ref::<GenericResource>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_type_equality_and_case() {
        let a = ResourceType::of("kafka", "v1", "Topic");
        let b = ResourceType::of("KAFKA", "V1", "topic");
        assert_ne!(a, b);
        assert!(a.matches_ignore_case(&b));
        assert!(!a.matches_ignore_case(&ResourceType::kind("Topic")));
        assert_eq!(a.to_string(), "kafka/v1/Topic");
        assert_eq!(a.qualified_api_version().as_deref(), Some("kafka/v1"));
    }

    #[test]
    fn test_descriptor_defaults_and_equality() {
        let ty = ResourceType::of("kafka", "v1", "Topic");
        let a = ResourceDescriptor::new(ty.clone(), "a::Topic").with_short_names(["kt"]);
        let b = ResourceDescriptor::new(ty, "b::Topic").with_plural_name("topics");
        assert_eq!(a.singular_name(), "topic");
        assert_eq!(a, b);
        assert!(a.is_named("KT"));
        assert!(b.is_named("topics"));
        assert!(!a.is_named("topics"));
    }

    #[test]
    fn test_delete_annotation() {
        let meta = ObjectMeta::named("x").with_annotation(DELETE_ANNOTATION, "True");
        assert!(meta.is_marked_for_deletion());
        assert!(!ObjectMeta::named("x").is_marked_for_deletion());
    }

    #[test]
    fn test_generic_resource_reads_metadata() {
        let resource = GenericResource::new(
            None,
            json!({"kind": "Thing", "metadata": {"name": "a", "labels": {"env": "dev"}}}),
        );
        assert_eq!(resource.name(), "a");
        assert_eq!(resource.metadata().labels["env"], "dev");
        assert_eq!(resource.resource_type().kind, "Generic");
    }

    #[test]
    fn test_downcast_resource_list() {
        let items: Vec<Box<dyn Resource>> = vec![
            Box::new(GenericResource::new(None, json!({"metadata": {"name": "a"}}))),
            Box::new(GenericResource::new(None, json!({"metadata": {"name": "b"}}))),
        ];
        let list = ResourceList::new(items);
        let typed: Vec<GenericResource> = list.downcast();
        assert_eq!(typed.len(), 2);
        assert_eq!(list.generic().len(), 2);
    }
}
