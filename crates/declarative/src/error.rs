//! Error types for the reconciliation core
//!
//! Configuration errors (unsupported modes, malformed versions, duplicate
//! handlers) and registration conflicts are reported through [`Error`]. Errors
//! raised while applying a single change never surface here; they are captured
//! in that change's [`ChangeResult`](crate::ChangeResult).

use crate::change::ChangeType;
use crate::mode::ReconciliationMode;
use crate::resource::ResourceType;
use thiserror::Error;

/// Errors that can occur in the reconciliation core
#[derive(Error, Debug)]
pub enum Error {
    /// A version string does not match `v<major>[<qualifier><number>]`
    #[error("invalid API version '{0}': expected v<major>[<qualifier><number>]")]
    InvalidApiVersion(String),

    /// `ApiVersion::latest` was called without any version
    #[error("cannot determine the latest version of an empty set")]
    EmptyVersionSet,

    /// A resource type was registered twice
    #[error(
        "conflicting resource definition for {resource_type}: '{conflicting}' cannot replace already registered '{existing}'"
    )]
    ConflictingResourceDefinition {
        resource_type: ResourceType,
        existing: String,
        conflicting: String,
    },

    /// No descriptor is registered for the requested type
    #[error("no resource registered for {0}")]
    ResourceNotFound(ResourceType),

    /// A document could not be bound to the type it resolved to
    #[error("cannot bind document to {resource_type}: {source}")]
    InvalidResource {
        resource_type: ResourceType,
        #[source]
        source: serde_json::Error,
    },

    /// Two handlers claim the same change type for one execution
    #[error("handlers '{first}' and '{second}' both claim change type {change_type}")]
    DuplicateHandler {
        change_type: ChangeType,
        first: String,
        second: String,
    },

    /// The controller does not declare support for the requested mode
    #[error("reconciliation mode {mode} is not supported by controller '{controller}'")]
    UnsupportedMode {
        mode: ReconciliationMode,
        controller: String,
    },

    /// A selector expression could not be parsed
    #[error("invalid selector '{expression}': {reason}")]
    InvalidSelector { expression: String, reason: String },

    /// A configuration value has the wrong shape
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfiguration { key: String, reason: String },

    /// The worker pool for an execution could not be built
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Failure reported by a provider (collector, controller)
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

/// Result type for reconciliation core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is a configuration error, raised before any change
    /// was applied
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidApiVersion(_)
                | Self::EmptyVersionSet
                | Self::DuplicateHandler { .. }
                | Self::UnsupportedMode { .. }
                | Self::InvalidSelector { .. }
                | Self::InvalidConfiguration { .. }
        )
    }
}
