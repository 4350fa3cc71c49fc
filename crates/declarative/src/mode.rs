//! Reconciliation modes and the change types each mode admits

use crate::change::ChangeType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How a reconciliation treats the planned changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationMode {
    /// Only create missing resources
    Create,
    /// Only update resources that differ
    Update,
    /// Only delete resources
    Delete,
    /// Create and update, delete orphans when enabled
    #[serde(alias = "apply", alias = "apply_all")]
    Full,
}

impl ReconciliationMode {
    pub const ALL: [Self; 4] = [Self::Create, Self::Update, Self::Delete, Self::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for ReconciliationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconciliationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "full" | "apply" | "apply_all" | "apply-all" => Ok(Self::Full),
            _ => Err(format!(
                "unknown reconciliation mode '{s}' (expected create, update, delete or full)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Admission {
    always: Vec<ChangeType>,
    with_orphan_deletion: Vec<ChangeType>,
}

/// Which change types each mode lets through to execution
///
/// `IGNORE` is never admitted, whatever the table says.
#[derive(Debug, Clone)]
pub struct AdmissionTable {
    modes: HashMap<ReconciliationMode, Admission>,
}

impl Default for AdmissionTable {
    fn default() -> Self {
        Self::empty()
            .admit(ReconciliationMode::Create, &[ChangeType::Add])
            .admit(ReconciliationMode::Update, &[ChangeType::Update])
            .admit(ReconciliationMode::Delete, &[ChangeType::Delete])
            .admit(
                ReconciliationMode::Full,
                &[ChangeType::None, ChangeType::Add, ChangeType::Update],
            )
            .admit_with_orphan_deletion(ReconciliationMode::Full, &[ChangeType::Delete])
    }
}

impl AdmissionTable {
    /// Table admitting nothing
    pub fn empty() -> Self {
        Self {
            modes: HashMap::new(),
        }
    }

    /// Admit `types` in `mode`
    pub fn admit(mut self, mode: ReconciliationMode, types: &[ChangeType]) -> Self {
        self.modes
            .entry(mode)
            .or_default()
            .always
            .extend_from_slice(types);
        self
    }

    /// Admit `types` in `mode` only when orphan deletion is enabled
    pub fn admit_with_orphan_deletion(mut self, mode: ReconciliationMode, types: &[ChangeType]) -> Self {
        self.modes
            .entry(mode)
            .or_default()
            .with_orphan_deletion
            .extend_from_slice(types);
        self
    }

    pub fn allows(&self, mode: ReconciliationMode, change_type: ChangeType, delete_orphans: bool) -> bool {
        if change_type == ChangeType::Ignore {
            return false;
        }
        self.modes.get(&mode).is_some_and(|admission| {
            admission.always.contains(&change_type)
                || (delete_orphans && admission.with_orphan_deletion.contains(&change_type))
        })
    }
}
