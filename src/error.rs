//! Fatal conditions the runner reports before any test command executes.
//!
//! A failing test command is not listed here: its exit code is the run's
//! result and is propagated unchanged (see `exec::CommandOutcome`).
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no test files")]
    NoTestFiles,

    #[error("not all test files are under the same root ({file} does not start with {root})")]
    FixtureRootMismatch { file: PathBuf, root: PathBuf },

    #[error("directories in test_files not supported ({path})")]
    DirectoryNotSupported { path: PathBuf },

    #[error("no package.json file found at test root {root}")]
    MissingManifest { root: PathBuf },

    #[error(
        "expected replacement of npm packages {names:?} for locally generated npm_package not found; add these to npm_packages attribute"
    )]
    UnresolvedPackageSubstitution { names: Vec<String> },

    #[error("{0}")]
    DebugEnvironmentMissing(String),

    #[error("runfiles manifest {path} is unavailable: {source}")]
    RunfilesManifestUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("test command {index} is empty")]
    EmptyCommand { index: usize },
}
