//! Results of executing changes

use crate::change::{Change, ChangeError, ChangeType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final status of one change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    /// The change was a no-op
    Ok,
    /// The change was applied (or would be, in a dry run)
    Changed,
    /// Applying the change reported at least one error
    Failed,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Changed => "CHANGED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Result of executing one change
///
/// Created once, at the end of an execution, through [`ChangeResult::ok`],
/// [`ChangeResult::changed`] or [`ChangeResult::failed`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResult<C> {
    status: ChangeStatus,
    change: C,
    description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ChangeError>,
    completed_at: DateTime<Utc>,
}

impl<C> ChangeResult<C> {
    fn new(status: ChangeStatus, change: C, description: String, errors: Vec<ChangeError>) -> Self {
        Self {
            status,
            change,
            description,
            errors,
            completed_at: Utc::now(),
        }
    }

    pub fn ok(change: C, description: impl Into<String>) -> Self {
        Self::new(ChangeStatus::Ok, change, description.into(), Vec::new())
    }

    pub fn changed(change: C, description: impl Into<String>) -> Self {
        Self::new(ChangeStatus::Changed, change, description.into(), Vec::new())
    }

    pub fn failed(change: C, description: impl Into<String>, errors: Vec<ChangeError>) -> Self {
        Self::new(ChangeStatus::Failed, change, description.into(), errors)
    }

    pub fn status(&self) -> ChangeStatus {
        self.status
    }

    pub fn change(&self) -> &C {
        &self.change
    }

    pub fn into_change(self) -> C {
        self.change
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn errors(&self) -> &[ChangeError] {
        &self.errors
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn is_changed(&self) -> bool {
        self.status == ChangeStatus::Changed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ChangeStatus::Failed
    }
}

/// Counts of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResultSummary {
    pub ok: usize,
    pub changed: usize,
    pub failed: usize,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ChangeResultSummary {
    /// Summarize a list of results
    pub fn from_results<C: Change>(results: &[ChangeResult<C>]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Add a result to the summary
    ///
    /// Per-operation counters only count changes that were applied.
    pub fn add_result<C: Change>(&mut self, result: &ChangeResult<C>) {
        match result.status() {
            ChangeStatus::Ok => self.ok += 1,
            ChangeStatus::Failed => self.failed += 1,
            ChangeStatus::Changed => {
                self.changed += 1;
                match result.change().operation() {
                    ChangeType::Add => self.added += 1,
                    ChangeType::Update => self.updated += 1,
                    ChangeType::Delete => self.deleted += 1,
                    ChangeType::None | ChangeType::Ignore => {}
                }
            }
        }
    }

    /// Total number of results
    pub fn total(&self) -> usize {
        self.ok + self.changed + self.failed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &Self) {
        self.ok += other.ok;
        self.changed += other.changed;
        self.failed += other.failed;
        self.added += other.added;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}
