use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Declarative reconciliation of resource documents", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the resource kinds converge knows about
    ApiResources {
        /// Only show kinds of this API group
        #[arg(long)]
        group: Option<String>,
    },

    /// Resolve documents and show the type each one binds to
    Validate(FileArgs),

    /// Show every planned change, including unchanged resources
    Diff(PlanArgs),

    /// Create, update and (with --delete-orphans) delete to match the documents
    Apply(ApplyArgs),

    /// Only create resources that do not exist yet
    Create(ApplyArgs),

    /// Only update resources that differ
    Update(ApplyArgs),

    /// Delete the resources named by the documents
    Delete(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Document files (JSON or TOML)
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub files: FileArgs,

    /// Selector expression, e.g. 'metadata.labels.env = prod' (repeatable)
    #[arg(short, long = "selector")]
    pub selectors: Vec<String>,

    /// Select resources matching any selector instead of all of them
    #[arg(long)]
    pub any: bool,

    /// Delete managed resources missing from the documents
    #[arg(long)]
    pub delete_orphans: bool,

    /// Root directory of the file provider
    #[arg(long, env = "CONVERGE_ROOT")]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Show what would change without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "converge",
            "apply",
            "-f",
            "files.toml",
            "-s",
            "metadata.name = a",
            "--delete-orphans",
            "--dry-run",
            "--jobs",
            "3",
            "-o",
            "json",
        ])
        .unwrap();

        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.plan.files.files, [PathBuf::from("files.toml")]);
        assert_eq!(args.plan.selectors, ["metadata.name = a"]);
        assert!(args.plan.delete_orphans && args.dry_run && !args.yes);
        assert_eq!(args.jobs, Some(3));
        assert_eq!(args.plan.output, OutputFormat::Json);
    }

    #[test]
    fn test_file_is_required() {
        assert!(Cli::try_parse_from(["converge", "diff"]).is_err());
    }
}
