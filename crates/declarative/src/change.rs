//! Change model
//!
//! A [`Change`] is one typed difference between desired and actual state.
//! Handlers report the outcome of applying a change as [`ChangeMetadata`],
//! grouped per change in a [`ChangeResponse`].

use crate::resource::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of difference a change represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    None,
    Add,
    Delete,
    Update,
    Ignore,
}

impl ChangeType {
    pub const ALL: [Self; 5] = [Self::None, Self::Add, Self::Delete, Self::Update, Self::Ignore];

    /// Reduce a collection of change types to one
    ///
    /// `None` iff every item is `None` (including an empty collection),
    /// `Update` otherwise. This is a conservative aggregate: any difference is
    /// reported as an update.
    pub fn aggregate<I>(types: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        if types.into_iter().all(|t| t == Self::None) {
            Self::None
        } else {
            Self::Update
        }
    }

    /// Change type between an optional before and after value
    pub fn between<T: PartialEq + ?Sized>(before: Option<&T>, after: Option<&T>) -> Self {
        match (before, after) {
            (None, None) => Self::None,
            (None, Some(_)) => Self::Add,
            (Some(_), None) => Self::Delete,
            (Some(b), Some(a)) if b == a => Self::None,
            (Some(_), Some(_)) => Self::Update,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Update => "UPDATE",
            Self::Ignore => "IGNORE",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of difference to reconcile
pub trait Change: Send + Sync + fmt::Debug {
    /// Identity of the change within a plan
    fn id(&self) -> String;

    /// Kind of difference
    fn operation(&self) -> ChangeType;
}

/// Error reported while applying one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ChangeError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ChangeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Build from an error, keeping its cause chain as details
    pub fn from_error(error: &anyhow::Error) -> Self {
        let message = error.to_string();
        let chain = format!("{error:#}");
        Self {
            details: (chain != message).then_some(chain),
            message,
        }
    }
}

/// Outcome of applying a change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeMetadata {
    error: Option<ChangeError>,
}

impl ChangeMetadata {
    /// Successful outcome
    pub fn empty() -> Self {
        Self::default()
    }

    /// Failed outcome
    pub fn failed(error: ChangeError) -> Self {
        Self { error: Some(error) }
    }

    pub fn from_result(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self::empty(),
            Err(e) => Self::failed(ChangeError::from_error(&e)),
        }
    }

    pub fn error(&self) -> Option<&ChangeError> {
        self.error.as_ref()
    }
}

/// Outcomes a handler reports for one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeResponse {
    change_id: String,
    metadata: Vec<ChangeMetadata>,
}

impl ChangeResponse {
    pub fn new<C: Change + ?Sized>(change: &C, metadata: ChangeMetadata) -> Self {
        Self::with_metadata(change.id(), vec![metadata])
    }

    pub fn with_metadata(change_id: impl Into<String>, metadata: Vec<ChangeMetadata>) -> Self {
        Self {
            change_id: change_id.into(),
            metadata,
        }
    }

    pub fn change_id(&self) -> &str {
        &self.change_id
    }

    pub fn metadata(&self) -> &[ChangeMetadata] {
        &self.metadata
    }

    pub fn into_metadata(self) -> Vec<ChangeMetadata> {
        self.metadata
    }

    pub fn has_error(&self) -> bool {
        self.metadata.iter().any(|m| m.error.is_some())
    }
}

/// Difference on a single field of a resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub name: String,
    pub operation: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl FieldChange {
    /// Compare two optional values of a field
    ///
    /// A value that fails to serialize is logged and left out of the change;
    /// the operation still reflects the comparison.
    pub fn compare<T>(name: impl Into<String>, before: Option<&T>, after: Option<&T>) -> Self
    where
        T: Serialize + PartialEq + ?Sized,
    {
        let name = name.into();
        let to_value = |v: &T| match serde_json::to_value(v) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("Could not serialize field {name}: {err}");
                None
            }
        };
        let operation = ChangeType::between(before, after);
        let (before_value, after_value) = (before.and_then(to_value), after.and_then(to_value));
        Self {
            name,
            operation,
            before: before_value,
            after: after_value,
        }
    }
}

/// Change of one resource, carrying its actual and desired specs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange<S> {
    resource_type: ResourceType,
    name: String,
    operation: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<S>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldChange>,
}

impl<S> ResourceChange<S> {
    pub fn new(resource_type: ResourceType, name: impl Into<String>, operation: ChangeType) -> Self {
        Self {
            resource_type,
            name: name.into(),
            operation,
            before: None,
            after: None,
            fields: Vec::new(),
        }
    }

    pub fn with_before(mut self, before: S) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: S) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldChange>) -> Self {
        self.fields = fields;
        self
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actual state before the change
    pub fn before(&self) -> Option<&S> {
        self.before.as_ref()
    }

    /// Desired state after the change
    pub fn after(&self) -> Option<&S> {
        self.after.as_ref()
    }

    pub fn fields(&self) -> &[FieldChange] {
        &self.fields
    }
}

impl<S: fmt::Debug + Send + Sync> Change for ResourceChange<S> {
    fn id(&self) -> String {
        format!("{}/{}", self.resource_type, self.name)
    }

    fn operation(&self) -> ChangeType {
        self.operation
    }
}
