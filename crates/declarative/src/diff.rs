//! Diff computation between desired and actual resources

use crate::change::{ChangeType, FieldChange, ResourceChange};
use crate::resource::Resource;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

type FieldDiff<R> = dyn Fn(&R, &R) -> Vec<FieldChange> + Send + Sync;

/// Computes [`ResourceChange`]s from desired and actual resources
///
/// Resources are matched by group, kind (both case-insensitive) and name. The
/// API version is not part of the identity so a resource can move between
/// versions without being recreated.
pub struct ChangeComputer<R> {
    delete_orphans: bool,
    fields: Box<FieldDiff<R>>,
}

impl<R: Resource + Clone + Serialize> Default for ChangeComputer<R> {
    fn default() -> Self {
        Self::with_fields(json_field_changes::<R>)
    }
}

impl<R: Resource + Clone> ChangeComputer<R> {
    /// Use `fields` to compute the field differences of matched resources
    ///
    /// `fields(actual, desired)` should only return differing fields.
    pub fn with_fields<F>(fields: F) -> Self
    where
        F: Fn(&R, &R) -> Vec<FieldChange> + Send + Sync + 'static,
    {
        Self {
            delete_orphans: false,
            fields: Box::new(fields),
        }
    }

    /// Delete actual resources with no desired counterpart
    pub fn delete_orphans(mut self, delete_orphans: bool) -> Self {
        self.delete_orphans = delete_orphans;
        self
    }

    /// Compute changes in desired order, then orphans in actual order
    ///
    /// A resource identity yields at most one change. When several desired
    /// resources share an identity the last one wins.
    pub fn compute(&self, desired: &[R], actual: &[R]) -> Vec<ResourceChange<R>> {
        let actual_by_key: HashMap<Key, &R> = actual.iter().map(|r| (Key::of(r), r)).collect();
        let last_by_key: HashMap<Key, usize> = desired.iter().enumerate().map(|(i, r)| (Key::of(r), i)).collect();
        let mut seen = HashSet::new();
        let mut changes = Vec::with_capacity(last_by_key.len());

        for (idx, resource) in desired.iter().enumerate() {
            let key = Key::of(resource);
            if last_by_key.get(&key) != Some(&idx) {
                log::warn!(
                    "Duplicate {} {}, keeping the last definition",
                    resource.resource_type(),
                    resource.name()
                );
                continue;
            }
            let existing = actual_by_key.get(&key).copied();
            seen.insert(key);
            changes.push(self.change_for(resource, existing));
        }

        if self.delete_orphans {
            for resource in actual {
                if !seen.contains(&Key::of(resource)) {
                    log::debug!("Orphaned {} {}", resource.resource_type(), resource.name());
                    changes.push(
                        ResourceChange::new(resource.resource_type(), resource.name(), ChangeType::Delete)
                            .with_before(resource.clone()),
                    );
                }
            }
        }

        changes
    }

    fn change_for(&self, desired: &R, actual: Option<&R>) -> ResourceChange<R> {
        let ty = desired.resource_type();
        let name = desired.name();

        match actual {
            None if desired.metadata().is_marked_for_deletion() => ResourceChange::new(ty, name, ChangeType::None),
            None => ResourceChange::new(ty, name, ChangeType::Add).with_after(desired.clone()),
            Some(actual) if desired.metadata().is_marked_for_deletion() => {
                ResourceChange::new(ty, name, ChangeType::Delete).with_before(actual.clone())
            }
            Some(actual) => {
                let fields = (self.fields)(actual, desired);
                let operation = ChangeType::aggregate(fields.iter().map(|f| f.operation));
                ResourceChange::new(ty, name, operation)
                    .with_before(actual.clone())
                    .with_after(desired.clone())
                    .with_fields(fields)
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct Key {
    group: Option<String>,
    kind: String,
    name: String,
}

impl Key {
    fn of<R: Resource + ?Sized>(resource: &R) -> Self {
        let ty = resource.resource_type();
        Self {
            group: ty.group.map(|g| g.to_ascii_lowercase()),
            kind: ty.kind.to_ascii_lowercase(),
            name: resource.name().to_string(),
        }
    }
}

/// Field differences of two serialized resources
///
/// Compares every leaf outside `apiVersion`, `kind` and `metadata`, plus the
/// labels. Leaves are named by their dotted path, e.g. `spec.content`.
pub fn json_field_changes<R: Serialize>(actual: &R, desired: &R) -> Vec<FieldChange> {
    let before = flatten(actual);
    let after = flatten(desired);

    let mut names: Vec<&String> = before.keys().chain(after.keys()).collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .map(|name| FieldChange::compare(name.as_str(), before.get(name), after.get(name)))
        .filter(|f| f.operation != ChangeType::None)
        .collect()
}

fn flatten<R: Serialize>(resource: &R) -> BTreeMap<String, Value> {
    let mut leaves = BTreeMap::new();
    let Ok(Value::Object(fields)) = serde_json::to_value(resource) else {
        return leaves;
    };
    for (key, value) in fields {
        match key.as_str() {
            "apiVersion" | "kind" => {}
            "metadata" => {
                if let Some(labels) = value.get("labels") {
                    leaves.insert("metadata.labels".to_string(), labels.clone());
                }
            }
            _ => flatten_into(key, value, &mut leaves),
        }
    }
    leaves
}

fn flatten_into(path: String, value: Value, leaves: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(fields) if !fields.is_empty() => {
            for (key, value) in fields {
                flatten_into(format!("{path}.{key}"), value, leaves);
            }
        }
        Value::Null => {}
        value => {
            leaves.insert(path, value);
        }
    }
}
