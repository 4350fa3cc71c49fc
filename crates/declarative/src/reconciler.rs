//! Reconciler - plan, filter and execute against one controller
//!
//! A reconciliation moves through three stages:
//!
//! ```text
//! Reconciler::plan ──► Planned ──filter──► Filtered ──execute──► Vec<ChangeResult>
//! ```
//!
//! Each stage is its own type, so the full plan and the admitted changes can
//! be inspected (for a diff view or a confirmation prompt) before anything is
//! executed.

use crate::change::{Change, ChangeType};
use crate::context::ReconciliationContext;
use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::executor::{ChangeExecutor, ExecutorOptions};
use crate::mode::{AdmissionTable, ReconciliationMode};
use crate::resource::ResourceList;
use crate::result::ChangeResult;

/// Drives reconciliations for one controller
pub struct Reconciler<'c, C> {
    controller: &'c C,
    admission: AdmissionTable,
}

impl<'c, C: Controller> Reconciler<'c, C> {
    pub fn new(controller: &'c C) -> Self {
        Self {
            controller,
            admission: AdmissionTable::default(),
        }
    }

    /// Replace the mode admission table
    pub fn with_admission_table(mut self, admission: AdmissionTable) -> Self {
        self.admission = admission;
        self
    }

    /// Plan the changes for `resources`
    ///
    /// Fails with [`Error::UnsupportedMode`] before planning when the
    /// controller does not support `mode`.
    pub fn plan<'r>(
        &'r self,
        resources: &[C::Resource],
        mode: ReconciliationMode,
        context: &'r ReconciliationContext,
    ) -> Result<Planned<'r, C>> {
        if !self.controller.supports(mode) {
            return Err(Error::UnsupportedMode {
                mode,
                controller: self.controller.name().to_string(),
            });
        }

        log::debug!(
            "Planning {} resource(s) with {} in {} mode",
            resources.len(),
            self.controller.name(),
            mode
        );
        let changes = self.controller.plan(resources, context)?;

        Ok(Planned {
            controller: self.controller,
            admission: &self.admission,
            mode,
            context,
            changes,
        })
    }

    /// Plan, filter and execute in one call
    pub fn reconcile(
        &self,
        resources: &[C::Resource],
        mode: ReconciliationMode,
        context: &ReconciliationContext,
    ) -> Result<Vec<ChangeResult<C::Change>>> {
        self.plan(resources, mode, context)?.filter().execute()
    }
}

/// Complete plan, including changes the mode will not admit
pub struct Planned<'r, C: Controller> {
    controller: &'r C,
    admission: &'r AdmissionTable,
    mode: ReconciliationMode,
    context: &'r ReconciliationContext,
    changes: ResourceList<C::Change>,
}

impl<'r, C: Controller> Planned<'r, C> {
    pub fn mode(&self) -> ReconciliationMode {
        self.mode
    }

    pub fn changes(&self) -> &ResourceList<C::Change> {
        &self.changes
    }

    /// Split the plan into admitted and excluded changes
    pub fn filter(self) -> Filtered<'r, C> {
        let (admitted, excluded): (Vec<_>, Vec<_>) = self.changes.into_iter().partition(|change| {
            self.admission
                .allows(self.mode, change.operation(), self.context.delete_orphans)
        });
        log::debug!(
            "{} mode admits {} of {} planned change(s)",
            self.mode,
            admitted.len(),
            admitted.len() + excluded.len()
        );

        Filtered {
            controller: self.controller,
            context: self.context,
            admitted: ResourceList::new(admitted),
            excluded: ResourceList::new(excluded),
        }
    }
}

/// Plan restricted to the changes the mode admits
pub struct Filtered<'r, C: Controller> {
    controller: &'r C,
    context: &'r ReconciliationContext,
    admitted: ResourceList<C::Change>,
    excluded: ResourceList<C::Change>,
}

impl<C: Controller> Filtered<'_, C> {
    /// Changes that will be executed
    pub fn changes(&self) -> &ResourceList<C::Change> {
        &self.admitted
    }

    /// Planned changes the mode left out
    pub fn excluded(&self) -> &ResourceList<C::Change> {
        &self.excluded
    }

    /// Whether executing would touch anything
    pub fn has_changes(&self) -> bool {
        self.admitted
            .iter()
            .any(|c| c.operation() != ChangeType::None)
    }

    /// Execute the admitted changes through the controller
    pub fn execute(self) -> Result<Vec<ChangeResult<C::Change>>> {
        let options = ExecutorOptions {
            dry_run: self.context.dry_run,
            jobs: self.context.jobs,
        };
        let executor = ChangeExecutor::new(self.admitted.into_items(), options);
        self.controller.execute(executor, self.context)
    }
}
