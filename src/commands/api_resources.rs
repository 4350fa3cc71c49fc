use anyhow::Result;
use colored::Colorize;
use declarative::ResourceDescriptor;
use std::sync::Arc;

use crate::Context;
use crate::provider;
use crate::ui;

pub fn run(ctx: &Context, group: Option<&str>) -> Result<()> {
    let resolver = provider::resolver()?;
    let registry = resolver.registry();

    let descriptors = match group {
        Some(group) => registry.descriptors_by_group(group),
        None => registry.all_descriptors(),
    };

    if descriptors.is_empty() {
        match group {
            Some(group) => ui::warn(&format!("No resource kinds in group '{group}'")),
            None => ui::warn("No resource kinds registered"),
        }
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("API Resources");
    }

    println!(
        "  {:<10} {:<8} {:<24} {:<8} {}",
        "NAME".bold(),
        "SHORT".bold(),
        "APIVERSION".bold(),
        "KIND".bold(),
        "VERBS".bold()
    );
    for descriptor in &descriptors {
        println!("  {}", row(descriptor));
    }

    if ctx.verbose > 0 {
        for descriptor in &descriptors {
            ui::kv(&descriptor.resource_type().to_string(), descriptor.description());
        }
    }

    Ok(())
}

fn row(descriptor: &Arc<ResourceDescriptor>) -> String {
    let short = descriptor
        .short_names()
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",");
    let verbs = descriptor
        .supported_verbs()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{:<10} {:<8} {:<24} {:<8} {}",
        descriptor
            .plural_name()
            .map_or_else(|| descriptor.singular_name(), str::to_string),
        short,
        descriptor
            .resource_type()
            .qualified_api_version()
            .unwrap_or_default(),
        descriptor.kind(),
        verbs
    )
}
