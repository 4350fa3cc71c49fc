//! Terminal rendering of plans and execution results
//!
//! The reconciliation itself runs in the `declarative` crate; this module only
//! shows what it is about to do and what it did.

pub mod differ;
pub mod executor;

pub use differ::display_plan;
pub use executor::{confirm_proceed, display_results, print_summary};
