//! Provider contracts
//!
//! A provider implements a [`Collector`] to read actual state and a
//! [`Controller`] to plan and execute changes for one resource kind.

use crate::change::Change;
use crate::context::{Configuration, ReconciliationContext};
use crate::error::Result;
use crate::executor::ChangeExecutor;
use crate::mode::ReconciliationMode;
use crate::resource::{Resource, ResourceList};
use crate::result::ChangeResult;
use crate::selector::Selectors;

/// Reads the actual state of resources
///
/// Collecting is a pure read, it never mutates the system.
pub trait Collector: Send + Sync {
    type Resource: Resource;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// List every actual resource matching the selectors
    fn list_all(&self, configuration: &Configuration, selectors: &Selectors) -> anyhow::Result<ResourceList<Self::Resource>>;
}

/// Plans and executes changes for one resource kind
pub trait Controller: Send + Sync {
    type Resource: Resource;
    type Change: Change;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Modes this controller can reconcile in
    fn supported_modes(&self) -> &[ReconciliationMode];

    fn supports(&self, mode: ReconciliationMode) -> bool {
        self.supported_modes().contains(&mode)
    }

    /// Compute the changes turning actual state into `resources`
    ///
    /// The plan accounts for every desired resource, including those that
    /// need no change (`NONE`).
    fn plan(&self, resources: &[Self::Resource], context: &ReconciliationContext) -> anyhow::Result<ResourceList<Self::Change>>;

    /// Execute admitted changes, typically by handing the executor this
    /// controller's handlers
    fn execute(
        &self,
        executor: ChangeExecutor<Self::Change>,
        context: &ReconciliationContext,
    ) -> Result<Vec<ChangeResult<Self::Change>>>;
}
