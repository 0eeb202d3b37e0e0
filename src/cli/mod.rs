//! CLI entry points.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

/// Dispatch a parsed CLI invocation to its handler; returns the exit code.
pub async fn run(cli: Cli) -> i32 {
    match &cli.command {
        Command::Intake(args) => commands::run_intake(args),
        Command::PlanImport(args) => commands::run_plan_import(args),
        Command::PostCodeTests(args) => commands::run_post_code_tests_cmd(args).await,
        Command::Consilium(args) => commands::run_consilium(args),
        Command::RepairGitignore(args) => commands::run_repair_gitignore(args),
        Command::MigrateMetadata(args) => commands::run_migrate_metadata(args),
    }
}
