//! Planning and applying documents against the managed directory

use anyhow::{Context as _, Result, bail};
use declarative::{
    Change, ChangeResult, ChangeResultSummary, ChangeType, Controller, DELETE_ANNOTATION, Filtered,
    ReconciliationContext, ReconciliationMode, Reconciler, Resource, ResourceList, SelectorStrategy, Selectors,
};

use crate::Context;
use crate::cli::{ApplyArgs, OutputFormat, PlanArgs};
use crate::config::ConvergeConfig;
use crate::documents;
use crate::engine;
use crate::provider::{self, file::FileChange, file::FileController, file::FileResource};
use crate::ui;

// ============================================================================
// Commands
// ============================================================================

/// Show the complete plan without executing it
pub fn diff(ctx: &Context, args: PlanArgs) -> Result<()> {
    let config = ConvergeConfig::load()?;
    let controller = FileController::new(config.root_path(args.root.as_deref())?);
    let resources = load_resources(&args.files.files, false)?;
    let context = build_context(&config, &args, true, None)?;

    if args.output == OutputFormat::Text && !ctx.quiet {
        ui::header("Diff");
        ui::kv("Root", &controller.root().display().to_string());
    }

    let reconciler = Reconciler::new(&controller);
    let planned = reconciler.plan(&resources, ReconciliationMode::Full, &context)?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(planned.changes())?),
        OutputFormat::Text => engine::display_plan(planned.changes(), true),
    }
    Ok(())
}

/// Plan, confirm and execute in `mode`
pub fn run(ctx: &Context, mode: ReconciliationMode, args: ApplyArgs) -> Result<()> {
    let config = ConvergeConfig::load()?;
    let controller = FileController::new(config.root_path(args.plan.root.as_deref())?);
    let resources = load_resources(&args.plan.files.files, mode == ReconciliationMode::Delete)?;
    let context = build_context(&config, &args.plan, args.dry_run, args.jobs)?;
    let text = args.plan.output == OutputFormat::Text;

    if text && !ctx.quiet {
        ui::header(&format!("Reconciling ({mode})"));
        ui::kv("Root", &controller.root().display().to_string());
        if args.dry_run {
            ui::warn("Dry run - no changes will be made");
        }
    }

    let reconciler = Reconciler::new(&controller);
    let filtered = reconciler.plan(&resources, mode, &context)?.filter();

    if !filtered.excluded().is_empty() {
        log::info!(
            "{} planned change(s) not admitted in {} mode",
            filtered.excluded().len(),
            mode
        );
    }
    for name in refused_deletions(mode, filtered.excluded()) {
        ui::warn(&format!(
            "Not deleting '{name}': orphan deletion is disabled (pass --delete-orphans)"
        ));
    }

    if text {
        engine::display_plan(filtered.changes(), ctx.verbose > 0);
    }

    let confirm = || {
        if text && !args.yes && !args.dry_run {
            println!();
            engine::confirm_proceed()
        } else {
            Ok(true)
        }
    };
    let Some(results) = execute_confirmed(filtered, confirm)? else {
        ui::info("Cancelled");
        return Ok(());
    };
    let summary = ChangeResultSummary::from_results(&results);

    if text {
        engine::display_results(&results, args.dry_run);
        engine::print_summary(&summary, args.dry_run);
    } else {
        print_json(&results, &summary, args.dry_run)?;
    }

    if summary.failed > 0 {
        bail!("{} change(s) failed", summary.failed);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Load and resolve documents, keeping the ones bound to `File`
///
/// Documents of unknown kinds are reported and skipped. With
/// `mark_for_deletion` every resource carries the delete annotation.
fn load_resources<P: AsRef<std::path::Path>>(
    files: &[P],
    mark_for_deletion: bool,
) -> Result<Vec<FileResource>> {
    let resolver = provider::resolver()?;
    let documents = documents::load_all(files)?;
    let resolved = resolver
        .resolve_all(documents)
        .context("Could not resolve documents")?;

    for generic in resolved.generic() {
        ui::warn(&format!(
            "Skipping '{}': unknown kind {}",
            generic.name(),
            generic.resource_type()
        ));
    }

    let mut resources = resolved.downcast::<FileResource>();
    if mark_for_deletion {
        for resource in &mut resources {
            resource
                .metadata
                .annotations
                .insert(DELETE_ANNOTATION.to_string(), "true".to_string());
        }
    }
    Ok(resources)
}

/// Execute the admitted changes, asking `confirm` first when any would touch
/// the directory
///
/// Returns `None` when the user declines. Unchanged resources still yield
/// `OK` results.
fn execute_confirmed<C, F>(filtered: Filtered<'_, C>, confirm: F) -> Result<Option<Vec<ChangeResult<C::Change>>>>
where
    C: Controller,
    F: FnOnce() -> Result<bool>,
{
    if filtered.has_changes() && !confirm()? {
        return Ok(None);
    }
    Ok(Some(filtered.execute()?))
}

/// Names of deletions only left out because orphan deletion is off
fn refused_deletions(mode: ReconciliationMode, excluded: &ResourceList<FileChange>) -> Vec<&str> {
    if mode != ReconciliationMode::Full {
        return Vec::new();
    }
    excluded
        .iter()
        .filter(|c| c.operation() == ChangeType::Delete)
        .map(|c| c.name())
        .collect()
}

/// Merge config file values with command-line flags
fn build_context(
    config: &ConvergeConfig,
    args: &PlanArgs,
    dry_run: bool,
    jobs: Option<usize>,
) -> Result<ReconciliationContext> {
    let strategy = if args.any {
        SelectorStrategy::Any
    } else {
        SelectorStrategy::All
    };
    let selectors = Selectors::parse(&args.selectors, strategy)?;

    Ok(ReconciliationContext::new(config.configuration.clone())
        .dry_run(dry_run)
        .with_selectors(selectors)
        .delete_orphans(args.delete_orphans || config.delete_orphans)
        .with_jobs(jobs.or(config.jobs)))
}

fn print_json(
    results: &[ChangeResult<FileChange>],
    summary: &ChangeResultSummary,
    dry_run: bool,
) -> Result<()> {
    let output = serde_json::json!({
        "dryRun": dry_run,
        "results": results,
        "summary": summary,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
