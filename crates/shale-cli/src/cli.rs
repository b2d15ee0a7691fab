//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Shale - ordered, checksummed schema migrations
#[derive(Parser, Debug)]
#[command(name = "shale")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Named database target from shale.yml
    #[arg(long, global = true, env = "SHALE_TARGET")]
    pub target_db: Option<String>,

    /// Connection string, overriding every configured database
    #[arg(long, global = true, env = "SHALE_DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show which migrations would run
    Plan(PlanArgs),

    /// Apply pending migrations up to a target
    Apply(ApplyArgs),

    /// Reverse the most recently applied migrations
    Rollback(RollbackArgs),

    /// Show every migration with its applied state
    Status(StatusArgs),

    /// Check recorded checksums against migration definitions
    Verify(VerifyArgs),

    /// Scaffold a new migration on top of the current head
    New(NewArgs),

    /// Clear a lock left behind by a crashed run
    Unlock(UnlockArgs),
}

/// Output formats for read-only commands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON document
    Json,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Target migration id, or `latest`
    #[arg(short, long, default_value = "latest")]
    pub target: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Target migration id, or `latest`
    #[arg(short, long, default_value = "latest")]
    pub target: String,

    /// Print the plan without running it
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the rollback command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Number of applied migrations to reverse
    #[arg(short = 'n', long, default_value_t = 1)]
    pub steps: usize,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the verify command
#[derive(Args, Debug)]
pub struct VerifyArgs {}

/// Arguments for the new command
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Short description, also used for the directory name
    pub description: String,

    /// Migration id (default: next number after the current head)
    #[arg(long)]
    pub id: Option<String>,
}

/// Arguments for the unlock command
#[derive(Args, Debug)]
pub struct UnlockArgs {}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
