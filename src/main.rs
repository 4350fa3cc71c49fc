mod cli;
mod commands;
mod config;
mod documents;
mod engine;
mod paths;
mod provider;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use declarative::ReconciliationMode;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::ApiResources { group } => commands::api_resources::run(&ctx, group.as_deref()),
        Command::Validate(args) => commands::validate::run(&ctx, args),
        Command::Diff(args) => commands::reconcile::diff(&ctx, args),
        Command::Apply(args) => commands::reconcile::run(&ctx, ReconciliationMode::Full, args),
        Command::Create(args) => commands::reconcile::run(&ctx, ReconciliationMode::Create, args),
        Command::Update(args) => commands::reconcile::run(&ctx, ReconciliationMode::Update, args),
        Command::Delete(args) => commands::reconcile::run(&ctx, ReconciliationMode::Delete, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "converge", &mut io::stdout());
            Ok(())
        }
    }
}
