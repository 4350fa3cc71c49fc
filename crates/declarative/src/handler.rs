//! Change handlers
//!
//! A handler applies changes of the types it declares to the system being
//! reconciled. Providers supply one handler per change type for each
//! execution.

use crate::change::{Change, ChangeMetadata, ChangeResponse, ChangeType};

/// Applies changes of specific types
///
/// # Contract
///
/// Handlers must:
/// - Be Send + Sync, one handler may run while handlers of other change types
///   run on other threads
/// - Report failures as [`ChangeMetadata`] errors, never by panicking
/// - Return one [`ChangeResponse`] per change they were given
///
/// Handlers own the concurrency of the changes of a single call to
/// [`apply`](ChangeHandler::apply), e.g. by iterating them with rayon.
pub trait ChangeHandler<C: Change>: Send + Sync {
    /// Name for logging and error reporting
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Change types this handler applies
    fn supported_change_types(&self) -> &[ChangeType];

    /// Apply a group of changes, all of a supported type
    fn apply(&self, changes: &[C]) -> Vec<ChangeResponse>;

    /// Human-readable description of what applying `change` does
    fn describe(&self, change: &C) -> String;
}

/// Handler for `NONE` changes
///
/// Reports an empty outcome for each change so unchanged resources still get
/// an `OK` result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChangeHandler;

impl<C: Change> ChangeHandler<C> for NoopChangeHandler {
    fn name(&self) -> &str {
        "noop"
    }

    fn supported_change_types(&self) -> &[ChangeType] {
        &[ChangeType::None]
    }

    fn apply(&self, changes: &[C]) -> Vec<ChangeResponse> {
        changes
            .iter()
            .map(|c| ChangeResponse::new(c, ChangeMetadata::empty()))
            .collect()
    }

    fn describe(&self, change: &C) -> String {
        format!("No changes for {}", change.id())
    }
}
