//! Environment signals consulted by the runner.
//!
//! Variables are read once at startup into a `RunnerEnv` value so the rest of
//! the runner never touches process-wide state and tests can build one by hand.
use anyhow::{Context, Result};
use std::path::PathBuf;

pub const RUNFILES_MANIFEST_ONLY: &str = "RUNFILES_MANIFEST_ONLY";
pub const RUNFILES_MANIFEST_FILE: &str = "RUNFILES_MANIFEST_FILE";
pub const RUNFILES_DIR: &str = "RUNFILES_DIR";
pub const BUILD_WORKSPACE_DIRECTORY: &str = "BUILD_WORKSPACE_DIRECTORY";
pub const TEST_WORKSPACE: &str = "TEST_WORKSPACE";
pub const TEST_TARGET: &str = "TEST_TARGET";
pub const VERBOSE_LOGS: &str = "VERBOSE_LOGS";

#[derive(Debug, Clone, Default)]
pub struct RunnerEnv {
    /// Working directory at startup; logical paths resolve against its parent.
    pub cwd: PathBuf,
    pub manifest_only: bool,
    pub manifest_file: Option<PathBuf>,
    pub runfiles_dir: Option<PathBuf>,
    pub build_workspace_directory: Option<PathBuf>,
    pub test_workspace: Option<String>,
    pub test_target: Option<String>,
    pub verbose_logs: bool,
}

impl RunnerEnv {
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir().context("resolve current directory")?;
        Ok(Self {
            cwd,
            manifest_only: var(RUNFILES_MANIFEST_ONLY).as_deref() == Some("1"),
            manifest_file: var(RUNFILES_MANIFEST_FILE).map(PathBuf::from),
            runfiles_dir: var(RUNFILES_DIR).map(PathBuf::from),
            build_workspace_directory: var(BUILD_WORKSPACE_DIRECTORY).map(PathBuf::from),
            test_workspace: var(TEST_WORKSPACE),
            test_target: var(TEST_TARGET),
            verbose_logs: var(VERBOSE_LOGS).is_some(),
        })
    }

    /// Conventional on-disk manifest location under the runfiles tree.
    pub fn runfiles_dir_manifest(&self) -> Option<PathBuf> {
        self.runfiles_dir.as_ref().map(|dir| dir.join("MANIFEST"))
    }
}

/// Empty values count as unset.
fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
