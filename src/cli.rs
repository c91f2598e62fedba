//! CLI argument parsing for the integration test runner.
//!
//! Everything that describes the test itself lives in the JSON config; flags
//! here only change how the runner treats the staged fixture.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "nfr",
    version,
    about = "Run npm integration tests against locally built packages",
    after_help = "Examples:\n  nfr run integration/app/test_config.json\n  nfr run --debug integration/app/test_config.json\n  nfr stage integration/app/test_config.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log every staging, patching, and execution step
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Stage(StageArgs),
}

/// Flags shared by every command that stages a fixture.
#[derive(Args, Debug)]
pub struct FixtureArgs {
    /// Run configuration JSON (testFiles, commands, npmPackages, ...)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Work in place under BUILD_WORKSPACE_DIRECTORY instead of a temp copy
    #[arg(long)]
    pub debug: bool,

    /// Load $RUNFILES_DIR/MANIFEST when present, even without RUNFILES_MANIFEST_ONLY
    #[arg(long)]
    pub test_manifest: bool,
}

/// Stage, patch, and run the configured test commands.
#[derive(Parser, Debug)]
#[command(about = "Stage a fixture, patch package.json, and run its commands")]
pub struct RunArgs {
    #[command(flatten)]
    pub fixture: FixtureArgs,

    /// Leave the staged temp directory in place after the run
    #[arg(long)]
    pub keep: bool,

    /// Extra arguments recorded with the run
    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    pub args: Vec<String>,
}

/// Stage and patch only, printing the staged directory.
#[derive(Parser, Debug)]
#[command(about = "Stage a fixture and patch package.json without running commands")]
pub struct StageArgs {
    #[command(flatten)]
    pub fixture: FixtureArgs,
}
