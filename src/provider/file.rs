//! Local file provider
//!
//! Manages UTF-8 text files below a root directory. A `File` resource is named
//! by its path relative to the root:
//!
//! ```toml
//! apiVersion = "fs.converge.dev/v1"
//! kind = "File"
//!
//! [metadata]
//! name = "config/app.toml"
//!
//! [spec]
//! content = "port = 8080\n"
//! ```

use anyhow::{Context, Result, bail};
use declarative::{
    Change, ChangeComputer, ChangeExecutor, ChangeHandler, ChangeMetadata, ChangeResponse,
    ChangeResult, ChangeType, Collector, Configuration, Controller, FieldChange, NoopChangeHandler,
    ObjectMeta, ReconciliationContext, ReconciliationMode, Resource, ResourceChange,
    ResourceDescriptor, ResourceList, ResourceType, Selectors, Verb,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// API group of file resources
pub const GROUP: &str = "fs.converge.dev";

/// Kind of file resources
pub const KIND: &str = "File";

/// Versions a `File` document may be written in, oldest first
pub const VERSIONS: [&str; 2] = ["v1beta1", "v1"];

/// Version used for files read from disk
pub const STORAGE_VERSION: &str = "v1";

/// Configuration key: create missing parent directories (default `true`)
pub const CREATE_DIRECTORIES: &str = "create_directories";

/// A text file below the managed root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FileSpec,
}

/// Desired content of a file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(default)]
    pub content: String,
}

impl FileResource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            api_version: format!("{GROUP}/{STORAGE_VERSION}"),
            kind: KIND.to_string(),
            metadata: ObjectMeta::named(name),
            spec: FileSpec {
                content: content.into(),
            },
        }
    }
}

impl Resource for FileResource {
    fn resource_type(&self) -> ResourceType {
        let ty = ResourceType::kind(self.kind.as_str());
        match self.api_version.split_once('/') {
            Some((group, version)) => ty.with_group(group).with_api_version(version),
            None => ty.with_api_version(self.api_version.as_str()),
        }
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Descriptors of every `File` version
pub fn descriptors() -> Vec<ResourceDescriptor> {
    VERSIONS
        .iter()
        .map(|version| {
            ResourceDescriptor::for_type::<FileResource>(ResourceType::of(GROUP, *version, KIND))
                .with_description("UTF-8 text file below the managed root directory")
                .with_plural_name("files")
                .with_short_names(["f"])
                .with_verbs([Verb::List, Verb::Create, Verb::Update, Verb::Delete, Verb::Apply])
        })
        .collect()
}

/// Validate a resource name as a relative path made of normal components
pub fn relative_path(name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        bail!("File name is empty");
    }
    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => bail!("File name '{name}' must not contain '..'"),
            Component::RootDir | Component::Prefix(_) => {
                bail!("File name '{name}' must be relative to the root directory")
            }
            Component::CurDir => bail!("File name '{name}' must not contain '.'"),
        }
    }
    Ok(path.to_path_buf())
}

// ============================================================================
// Collector
// ============================================================================

/// Reads the files below a root directory
#[derive(Debug, Clone)]
pub struct FileCollector {
    root: PathBuf,
}

impl FileCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, path: &Path) -> Result<Option<FileResource>> {
        let relative = path
            .strip_prefix(&self.root)
            .with_context(|| format!("{} is outside {}", path.display(), self.root.display()))?;
        let Some(name) = relative.to_str() else {
            log::warn!("Skipping non UTF-8 path {}", path.display());
            return Ok(None);
        };
        let name = name.replace(std::path::MAIN_SEPARATOR, "/");

        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(Some(FileResource::new(name, content))),
            Err(_) => {
                log::warn!("Skipping {}: content is not UTF-8", path.display());
                Ok(None)
            }
        }
    }
}

impl Collector for FileCollector {
    type Resource = FileResource;

    fn name(&self) -> &str {
        "file-collector"
    }

    fn list_all(&self, _configuration: &Configuration, selectors: &Selectors) -> Result<ResourceList<FileResource>> {
        if !self.root.exists() {
            log::debug!("Root {} does not exist yet", self.root.display());
            return Ok(ResourceList::default());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(file) = self.read(entry.path())?
                && selectors.matches(&file)
            {
                files.push(file);
            }
        }

        log::debug!("Collected {} file(s) below {}", files.len(), self.root.display());
        Ok(ResourceList::new(files))
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Change of one file
pub type FileChange = ResourceChange<FileResource>;

/// Plans and executes file changes below a root directory
#[derive(Debug, Clone)]
pub struct FileController {
    root: PathBuf,
    collector: FileCollector,
}

impl FileController {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            collector: FileCollector::new(root.clone()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn content_changes(actual: &FileResource, desired: &FileResource) -> Vec<FieldChange> {
    let field = FieldChange::compare(
        "spec.content",
        Some(actual.spec.content.as_str()),
        Some(desired.spec.content.as_str()),
    );
    if field.operation == ChangeType::None {
        Vec::new()
    } else {
        vec![field]
    }
}

impl Controller for FileController {
    type Resource = FileResource;
    type Change = FileChange;

    fn name(&self) -> &str {
        "file-controller"
    }

    fn supported_modes(&self) -> &[ReconciliationMode] {
        &ReconciliationMode::ALL
    }

    fn plan(&self, resources: &[FileResource], context: &ReconciliationContext) -> Result<ResourceList<FileChange>> {
        let desired: Vec<FileResource> = resources
            .iter()
            .filter(|r| context.selectors.matches(*r))
            .cloned()
            .collect();
        for resource in &desired {
            relative_path(resource.name())?;
        }

        // Orphans are limited to selected files, matches are not: an actual file
        // carries no labels for a label selector to match.
        let actual = self.collector.list_all(&context.configuration, &Selectors::default())?;
        let actual: Vec<FileResource> = actual
            .into_iter()
            .filter(|a| desired.iter().any(|d| d.name() == a.name()) || context.selectors.matches(a))
            .collect();

        let changes = ChangeComputer::with_fields(content_changes)
            .delete_orphans(context.delete_orphans)
            .compute(&desired, &actual);
        Ok(ResourceList::new(changes))
    }

    fn execute(
        &self,
        executor: ChangeExecutor<FileChange>,
        context: &ReconciliationContext,
    ) -> declarative::Result<Vec<ChangeResult<FileChange>>> {
        let create_directories = context
            .configuration
            .get_bool(CREATE_DIRECTORIES)?
            .unwrap_or(true);
        let root: Arc<Path> = Arc::from(self.root.as_path());

        let handlers: Vec<Box<dyn ChangeHandler<FileChange>>> = vec![
            Box::new(FileChangeHandler::new(Arc::clone(&root), ChangeType::Add, create_directories)),
            Box::new(FileChangeHandler::new(Arc::clone(&root), ChangeType::Update, create_directories)),
            Box::new(FileChangeHandler::new(root, ChangeType::Delete, create_directories)),
            Box::new(NoopChangeHandler),
        ];
        executor.execute(&handlers)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Applies one type of file change, files in parallel
pub struct FileChangeHandler {
    root: Arc<Path>,
    change_type: ChangeType,
    create_directories: bool,
}

impl FileChangeHandler {
    pub fn new(root: Arc<Path>, change_type: ChangeType, create_directories: bool) -> Self {
        Self {
            root,
            change_type,
            create_directories,
        }
    }

    fn apply_one(&self, change: &FileChange) -> Result<()> {
        let path = self.root.join(relative_path(change.name())?);
        match self.change_type {
            ChangeType::Add => self.write(&path, desired_content(change)?, true),
            ChangeType::Update => self.write(&path, desired_content(change)?, false),
            ChangeType::Delete => {
                fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))
            }
            ChangeType::None | ChangeType::Ignore => Ok(()),
        }
    }

    fn write(&self, path: &Path, content: &str, create_new: bool) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            if !self.create_directories {
                bail!("Parent directory {} does not exist", parent.display());
            }
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .create_new(create_new)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn desired_content(change: &FileChange) -> Result<&str> {
    change
        .after()
        .map(|f| f.spec.content.as_str())
        .with_context(|| format!("{} carries no desired content", change.id()))
}

impl ChangeHandler<FileChange> for FileChangeHandler {
    fn name(&self) -> &str {
        match self.change_type {
            ChangeType::Add => "file-create",
            ChangeType::Update => "file-update",
            ChangeType::Delete => "file-delete",
            ChangeType::None | ChangeType::Ignore => "file-noop",
        }
    }

    fn supported_change_types(&self) -> &[ChangeType] {
        std::slice::from_ref(&self.change_type)
    }

    fn apply(&self, changes: &[FileChange]) -> Vec<ChangeResponse> {
        changes
            .par_iter()
            .map(|change| {
                let result = self.apply_one(change);
                if let Err(e) = &result {
                    log::warn!("{}: {e:#}", change.id());
                }
                ChangeResponse::new(change, ChangeMetadata::from_result(result))
            })
            .collect()
    }

    fn describe(&self, change: &FileChange) -> String {
        let size = change.after().map_or(0, |f| f.spec.content.len());
        match self.change_type {
            ChangeType::Add => format!("Create {} ({size} bytes)", change.name()),
            ChangeType::Update => format!("Update {} ({size} bytes)", change.name()),
            ChangeType::Delete => format!("Delete {}", change.name()),
            ChangeType::None | ChangeType::Ignore => format!("Keep {}", change.name()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ChangeStatus, DELETE_ANNOTATION, Reconciler, SelectorStrategy};
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileController) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), "same").unwrap();
        fs::write(dir.path().join("stale.txt"), "old").unwrap();
        fs::write(dir.path().join("orphan.txt"), "orphan").unwrap();
        let controller = FileController::new(dir.path());
        (dir, controller)
    }

    fn desired() -> Vec<FileResource> {
        vec![
            FileResource::new("keep.txt", "same"),
            FileResource::new("stale.txt", "new"),
            FileResource::new("nested/dir/new.txt", "hello"),
        ]
    }

    fn planned(controller: &FileController, context: &ReconciliationContext) -> Vec<(String, ChangeType)> {
        controller
            .plan(&desired(), context)
            .unwrap()
            .iter()
            .map(|c| (c.name().to_string(), c.operation()))
            .collect()
    }

    #[test]
    fn test_relative_path_rejects_escapes() {
        assert!(relative_path("a/b.txt").is_ok());
        assert!(relative_path("").is_err());
        assert!(relative_path("../etc/passwd").is_err());
        assert!(relative_path("a/../../b").is_err());
        assert!(relative_path("/etc/passwd").is_err());
        assert!(relative_path("./a").is_err());
    }

    #[test]
    fn test_collector_skips_non_utf8() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), "a").unwrap();
        fs::write(dir.path().join("binary.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let files = FileCollector::new(dir.path())
            .list_all(&Configuration::new(), &Selectors::default())
            .unwrap();
        let names: Vec<&str> = files.iter().map(Resource::name).collect();
        assert_eq!(names, ["sub/a.txt"]);
        assert_eq!(files.items()[0].spec.content, "a");
    }

    #[test]
    fn test_collector_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let files = FileCollector::new(dir.path().join("absent"))
            .list_all(&Configuration::new(), &Selectors::default())
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_plan() {
        let (_dir, controller) = setup();
        let context = ReconciliationContext::default();
        assert_eq!(
            planned(&controller, &context),
            [
                ("keep.txt".to_string(), ChangeType::None),
                ("stale.txt".to_string(), ChangeType::Update),
                ("nested/dir/new.txt".to_string(), ChangeType::Add),
            ]
        );

        let context = ReconciliationContext::default().delete_orphans(true);
        let plan = planned(&controller, &context);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[3], ("orphan.txt".to_string(), ChangeType::Delete));
    }

    #[test]
    fn test_plan_rejects_escaping_names() {
        let (_dir, controller) = setup();
        let err = controller
            .plan(&[FileResource::new("../outside.txt", "x")], &ReconciliationContext::default())
            .unwrap_err();
        assert!(err.to_string().contains(".."));
    }

    #[test]
    fn test_apply_full_with_orphans() {
        let (dir, controller) = setup();
        let context = ReconciliationContext::default().delete_orphans(true);

        let results = Reconciler::new(&controller)
            .reconcile(&desired(), ReconciliationMode::Full, &context)
            .unwrap();

        assert!(results.iter().all(|r| !r.is_failed()));
        assert_eq!(fs::read_to_string(dir.path().join("stale.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dir.path().join("nested/dir/new.txt")).unwrap(), "hello");
        assert!(!dir.path().join("orphan.txt").exists());
        assert_eq!(results[0].status(), ChangeStatus::Ok);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let (dir, controller) = setup();
        let context = ReconciliationContext::default().dry_run(true).delete_orphans(true);

        let results = Reconciler::new(&controller)
            .reconcile(&desired(), ReconciliationMode::Full, &context)
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(fs::read_to_string(dir.path().join("stale.txt")).unwrap(), "old");
        assert!(dir.path().join("orphan.txt").exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_create_mode_only_adds() {
        let (dir, controller) = setup();
        let results = Reconciler::new(&controller)
            .reconcile(&desired(), ReconciliationMode::Create, &ReconciliationContext::default())
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].change().name(), "nested/dir/new.txt");
        assert_eq!(fs::read_to_string(dir.path().join("stale.txt")).unwrap(), "old");
    }

    #[test]
    fn test_failures_are_reported_per_file() {
        let (dir, controller) = setup();
        let context = ReconciliationContext::new(Configuration::new().with(CREATE_DIRECTORIES, "false"));

        let results = Reconciler::new(&controller)
            .reconcile(&desired(), ReconciliationMode::Full, &context)
            .unwrap();

        let failed: Vec<&str> = results
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| r.change().name())
            .collect();
        assert_eq!(failed, ["nested/dir/new.txt"]);
        assert_eq!(fs::read_to_string(dir.path().join("stale.txt")).unwrap(), "new");
    }

    #[test]
    fn test_duplicate_documents_write_once() {
        let dir = TempDir::new().unwrap();
        let controller = FileController::new(dir.path());
        let desired = vec![FileResource::new("a.txt", "one"), FileResource::new("a.txt", "two")];

        let results = Reconciler::new(&controller)
            .reconcile(&desired, ReconciliationMode::Full, &ReconciliationContext::default())
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status(), ChangeStatus::Changed);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "two");
    }

    #[test]
    fn test_delete_annotation() {
        let (dir, controller) = setup();
        let mut doomed = FileResource::new("stale.txt", "");
        doomed.metadata = doomed.metadata.with_annotation(DELETE_ANNOTATION, "true");

        let results = Reconciler::new(&controller)
            .reconcile(&[doomed], ReconciliationMode::Delete, &ReconciliationContext::default())
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].change().operation(), ChangeType::Delete);
        assert!(!dir.path().join("stale.txt").exists());
    }

    #[test]
    fn test_selectors_limit_plan() {
        let (_dir, controller) = setup();
        let selectors = Selectors::parse(["metadata.name =~ ^stale"], SelectorStrategy::All).unwrap();
        let context = ReconciliationContext::default()
            .with_selectors(selectors)
            .delete_orphans(true);

        assert_eq!(
            planned(&controller, &context),
            [("stale.txt".to_string(), ChangeType::Update)]
        );
    }
}
