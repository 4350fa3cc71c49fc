//! # Declarative
//!
//! A framework for declarative resource reconciliation.
//!
//! Desired state is described as typed resources. A controller computes the
//! changes that turn actual state into desired state, a reconciliation mode
//! decides which of those changes are admitted, and the executor applies them
//! through change handlers.
//!
//! ## Core Concepts
//!
//! - **ResourceType**: Identity of a kind of resource (`group/version/Kind`)
//! - **ResourceRegistry**: Descriptors of the kinds a process knows about
//! - **ResourceResolver**: Binds raw documents to typed resources, falling back
//!   to the latest registered version when a document's exact version is unknown
//! - **Change**: One typed difference, `NONE`, `ADD`, `UPDATE`, `DELETE` or `IGNORE`
//! - **ChangeExecutor**: Dispatches changes to handlers, one concurrent group
//!   per change type
//! - **Reconciler**: Plan, filter by mode, execute
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     ReconciliationContext, ReconciliationMode, Reconciler, ResourceRegistry,
//!     ResourceResolver,
//! };
//!
//! let resolver = ResourceResolver::new(Arc::new(ResourceRegistry::new()));
//! resolver.register::<FileResource>(descriptor)?;
//!
//! let resources = resolver.resolve_all(documents)?.downcast::<FileResource>();
//!
//! let controller = FileController::new(root);
//! let context = ReconciliationContext::default().dry_run(true);
//! let results = Reconciler::new(&controller).reconcile(&resources, ReconciliationMode::Full, &context)?;
//! ```
//!
//! ## Provider Traits
//!
//! Providers plug into the core through traits:
//!
//! - [`Collector`]: Reads actual state
//! - [`Controller`]: Plans changes and executes them
//! - [`ChangeHandler`]: Applies the changes of given types
//! - [`ResourceTypeResolver`]: Resolves documents whose type is not registered
//!   exactly
//!
//! The core performs no I/O of its own.

pub mod change;
pub mod context;
pub mod controller;
pub mod diff;
pub mod error;
pub mod executor;
pub mod handler;
pub mod mode;
pub mod reconciler;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod result;
pub mod selector;
pub mod version;

// Re-export main types at crate root
pub use change::{Change, ChangeError, ChangeMetadata, ChangeResponse, ChangeType, FieldChange, ResourceChange};
pub use context::{Configuration, ReconciliationContext};
pub use controller::{Collector, Controller};
pub use diff::{ChangeComputer, json_field_changes};
pub use error::{Error, Result};
pub use executor::{ChangeExecutor, ExecutorOptions};
pub use handler::{ChangeHandler, NoopChangeHandler};
pub use mode::{AdmissionTable, ReconciliationMode};
pub use reconciler::{Filtered, Planned, Reconciler};
pub use registry::ResourceRegistry;
pub use resolver::{Document, LatestVersionResolver, ResourceResolver, ResourceTypeResolver};
pub use resource::{
    DELETE_ANNOTATION, GenericResource, ObjectMeta, Resource, ResourceDescriptor, ResourceList, ResourceType, Verb,
};
pub use result::{ChangeResult, ChangeResultSummary, ChangeStatus};
pub use selector::{Selector, SelectorStrategy, Selectors};
pub use version::{ApiVersion, QualifierPriority};
