use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{GenericResource, Resource};
use std::any::Any;

use crate::Context;
use crate::cli::FileArgs;
use crate::documents;
use crate::provider;
use crate::ui;

/// Resolve every document and report the type it binds to
///
/// Fails when a document names a kind no provider knows.
pub fn run(ctx: &Context, args: FileArgs) -> Result<()> {
    let resolver = provider::resolver()?;
    let documents = documents::load_all(&args.files)?;
    let resources = resolver.resolve_all(documents)?;

    if !ctx.quiet {
        ui::header("Validating Documents");
    }

    let mut unknown = 0;
    for resource in &resources {
        let resource: &dyn Resource = &**resource;
        let any: &dyn Any = resource;
        let resource_type = resource.resource_type();
        if any.is::<GenericResource>() {
            unknown += 1;
            println!(
                "  {} {:<40} {}",
                "?".yellow(),
                display_name(resource),
                format!("{resource_type} (unknown kind)").dimmed()
            );
        } else if !ctx.quiet {
            println!(
                "  {} {:<40} {}",
                "✓".green(),
                display_name(resource),
                resource_type.to_string().dimmed()
            );
        }
    }

    println!();
    if unknown > 0 {
        bail!(
            "{} of {} document(s) did not resolve to a known kind",
            unknown,
            resources.len()
        );
    }

    ui::success(&format!("{} document(s) valid", resources.len()));
    Ok(())
}

fn display_name(resource: &dyn Resource) -> &str {
    match resource.name() {
        "" => "<unnamed>",
        name => name,
    }
}
