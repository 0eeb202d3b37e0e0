//! CLI argument definitions.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

/// Pipeline and session runtime for an autonomous coding agent.
#[derive(Debug, Parser)]
#[command(name = "auto-iflow", version, about)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze a task description and emit the intake JSON on stdout
    Intake(IntakeArgs),

    /// Parse a Markdown plan into normalized tasks plus a wave schedule
    PlanImport(PlanImportArgs),

    /// Run (or re-run) the post-code test plan for a spec
    PostCodeTests(PostCodeTestsArgs),

    /// Open an interactive multi-role deliberation session
    Consilium(ConsiliumArgs),

    /// Re-apply the data-directory entries to the project's .gitignore
    RepairGitignore(RepairGitignoreArgs),

    /// Migrate legacy task_metadata.json files to modelRouting
    MigrateMetadata(MigrateMetadataArgs),
}

#[derive(Debug, clap::Args)]
pub struct IntakeArgs {
    /// Free-text task description
    #[arg(long)]
    pub description: String,

    /// Model override for the intake analysis
    #[arg(long)]
    pub model: Option<String>,

    /// Attachment paths (JSON array or comma-separated list)
    #[arg(long)]
    pub attachments: Option<String>,

    /// Answers to earlier clarifying questions (JSON object)
    #[arg(long)]
    pub answers: Option<String>,

    /// Re-run the analysis even when an intake already exists
    #[arg(long)]
    pub reanalyze: bool,

    /// Use the v2 intake layout
    #[arg(long = "intake-v2")]
    pub intake_v2: bool,
}

#[derive(Debug, clap::Args)]
pub struct PlanImportArgs {
    /// Markdown plan file
    #[arg(long)]
    pub file: Utf8PathBuf,

    /// Maximum tasks per schedule wave
    #[arg(long, default_value_t = 4)]
    pub max_concurrency: usize,

    /// Emit per-task agent pipeline assignments
    #[arg(long)]
    pub agent_pipeline: bool,

    /// Agent profile overrides (JSON object)
    #[arg(long)]
    pub agent_profiles: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct PostCodeTestsArgs {
    /// Spec directory holding task_intake.json / scope_contract.json
    #[arg(long)]
    pub spec_dir: Utf8PathBuf,

    /// Project directory tests run from
    #[arg(long)]
    pub project_dir: Utf8PathBuf,

    /// Run even when the stored report matches the current commit
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PermissionMode {
    Auto,
    Manual,
    Selective,
}

#[derive(Debug, clap::Args)]
pub struct ConsiliumArgs {
    /// Topic to deliberate
    #[arg(long)]
    pub task: String,

    /// Project name for context
    #[arg(long)]
    pub project_name: Option<String>,

    /// Project directory for routing lookups
    #[arg(long)]
    pub project_dir: Option<Utf8PathBuf>,

    /// Workspace directory for session artifacts
    #[arg(long)]
    pub workspace: Option<Utf8PathBuf>,

    /// Model override for all roles
    #[arg(long)]
    pub model: Option<String>,

    /// Tool permission mode
    #[arg(long, value_enum, default_value_t = PermissionMode::Manual)]
    pub permission_mode: PermissionMode,
}

#[derive(Debug, clap::Args)]
pub struct RepairGitignoreArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long)]
    pub project_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct MigrateMetadataArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long)]
    pub project_dir: Option<Utf8PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_args_parse() {
        let cli = Cli::parse_from([
            "auto-iflow",
            "intake",
            "--description",
            "Fix the login bug",
            "--reanalyze",
        ]);
        match cli.command {
            Command::Intake(args) => {
                assert_eq!(args.description, "Fix the login bug");
                assert!(args.reanalyze);
                assert!(!args.intake_v2);
            }
            _ => panic!("expected intake"),
        }
    }

    #[test]
    fn test_plan_import_defaults() {
        let cli = Cli::parse_from(["auto-iflow", "plan-import", "--file", "plan.md"]);
        match cli.command {
            Command::PlanImport(args) => {
                assert_eq!(args.max_concurrency, 4);
                assert!(!args.agent_pipeline);
            }
            _ => panic!("expected plan-import"),
        }
    }

    #[test]
    fn test_post_code_tests_args() {
        let cli = Cli::parse_from([
            "auto-iflow",
            "post-code-tests",
            "--spec-dir",
            "/tmp/spec",
            "--project-dir",
            "/tmp/project",
            "--force",
        ]);
        match cli.command {
            Command::PostCodeTests(args) => {
                assert!(args.force);
                assert_eq!(args.spec_dir, Utf8PathBuf::from("/tmp/spec"));
            }
            _ => panic!("expected post-code-tests"),
        }
    }

    #[test]
    fn test_consilium_permission_mode() {
        let cli = Cli::parse_from([
            "auto-iflow",
            "consilium",
            "--task",
            "Should we migrate?",
            "--permission-mode",
            "auto",
        ]);
        match cli.command {
            Command::Consilium(args) => {
                assert_eq!(args.permission_mode, PermissionMode::Auto);
            }
            _ => panic!("expected consilium"),
        }
    }
}
