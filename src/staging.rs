//! Fixture staging.
//!
//! Test files are copied into a private temp directory so commands can write
//! freely without touching build outputs. Debug runs skip the copy and work
//! in place under the source workspace instead.
use crate::env::RunnerEnv;
use crate::error::RunnerError;
use crate::runfiles::RunfilesResolver;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

/// Nested dependency trees are never copied into a staged fixture.
pub const DEPENDENCY_DIR: &str = "node_modules";

const FILE_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;

/// The directory test commands run in.
///
/// A temporary fixture is removed when this value drops unless it was staged
/// with `keep`. In-place fixtures are never removed.
#[derive(Debug)]
pub struct StagedFixture {
    root: PathBuf,
    source_root: PathBuf,
    temp: Option<TempDir>,
    in_place: bool,
    keep: bool,
}

impl StagedFixture {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Common root of the test files the fixture was built from.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn is_in_place(&self) -> bool {
        self.in_place
    }

    /// True when the directory outlives the run.
    pub fn is_kept(&self) -> bool {
        self.in_place || self.keep
    }

    /// Delete a temporary fixture now. Safe to call more than once; kept and
    /// in-place fixtures are left alone.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.keep {
            return Ok(());
        }
        if let Some(temp) = self.temp.take() {
            let path = temp.path().to_path_buf();
            temp.close()
                .with_context(|| format!("remove staged fixture {}", path.display()))?;
        }
        Ok(())
    }
}

/// Stage `files` either into a fresh temp directory or, in debug mode, in place.
pub fn stage_fixture(
    files: &[String],
    resolver: &RunfilesResolver,
    env: &RunnerEnv,
    debug: bool,
    keep: bool,
) -> Result<StagedFixture> {
    if files.is_empty() {
        return Err(RunnerError::NoTestFiles.into());
    }
    if debug {
        return stage_in_place(files, env);
    }
    let resolved: Vec<PathBuf> = files.iter().map(|file| resolver.resolve(file)).collect();
    let root = root_directory(&resolved)?;
    let temp = tempfile::Builder::new()
        .prefix("nfr-fixture-")
        .keep(keep)
        .tempdir()
        .context("create staging directory")?;
    let copied = copy_files(&resolved, &root, temp.path())?;
    tracing::info!(
        source = %root.display(),
        staged = %temp.path().display(),
        files = copied,
        "test files copied to tmp folder"
    );
    Ok(StagedFixture {
        root: temp.path().to_path_buf(),
        source_root: root,
        temp: Some(temp),
        in_place: false,
        keep,
    })
}

fn stage_in_place(files: &[String], env: &RunnerEnv) -> Result<StagedFixture> {
    let workspace_dir = env.build_workspace_directory.as_ref().ok_or_else(|| {
        let target = env.test_target.as_deref().unwrap_or("<target>");
        RunnerError::DebugEnvironmentMissing(format!(
            "debug mode only available with 'bazel run {target}'"
        ))
    })?;
    let test_workspace = env.test_workspace.as_deref().ok_or_else(|| {
        RunnerError::DebugEnvironmentMissing("TEST_WORKSPACE not set".to_string())
    })?;
    let logical: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
    let root = root_directory(&logical)?;
    if root == Path::new(test_workspace) || !root.starts_with(test_workspace) {
        return Err(RunnerError::DebugEnvironmentMissing(format!(
            "debug mode only available with test files in the test workspace '{test_workspace}'"
        ))
        .into());
    }
    let fixture_root = workspace_dir.join("..").join(&root);
    tracing::info!(root = %fixture_root.display(), "configuring test in-place");
    Ok(StagedFixture {
        root: fixture_root,
        source_root: root,
        temp: None,
        in_place: true,
        keep: true,
    })
}

/// Shortest parent directory among `files`; every file must live under it.
pub fn root_directory(files: &[PathBuf]) -> Result<PathBuf> {
    let first = files.first().ok_or(RunnerError::NoTestFiles)?;
    let mut root = first.clone();
    for file in files {
        let candidate = file.parent().unwrap_or_else(|| Path::new(""));
        if candidate.as_os_str().len() < root.as_os_str().len() {
            root = candidate.to_path_buf();
        }
    }
    if let Some(file) = files.iter().find(|file| !file.starts_with(&root)) {
        return Err(RunnerError::FixtureRootMismatch {
            file: file.clone(),
            root,
        }
        .into());
    }
    Ok(root)
}

struct CopyPlan {
    source: PathBuf,
    dest: PathBuf,
    executable: bool,
}

/// Copy every file under `root` into `to`, returning how many were copied.
///
/// All sources are checked before the first byte is written.
pub fn copy_files(files: &[PathBuf], root: &Path, to: &Path) -> Result<usize> {
    let mut plans = Vec::with_capacity(files.len());
    for source in files {
        let rel = source.strip_prefix(root).map_err(|_| {
            anyhow!(
                "file to copy {} is not under root {}",
                source.display(),
                root.display()
            )
        })?;
        let metadata = fs::metadata(source)
            .with_context(|| format!("inspect test file {}", source.display()))?;
        if metadata.is_dir() {
            return Err(RunnerError::DirectoryNotSupported {
                path: source.clone(),
            }
            .into());
        }
        if is_dependency_path(rel) {
            tracing::debug!(file = %source.display(), "skipping nested {DEPENDENCY_DIR}");
            continue;
        }
        plans.push(CopyPlan {
            source: source.clone(),
            dest: to.join(rel),
            executable: is_executable(&metadata),
        });
    }

    for plan in &plans {
        if let Some(parent) = plan.dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::copy(&plan.source, &plan.dest).with_context(|| {
            format!(
                "copy {} -> {}",
                plan.source.display(),
                plan.dest.display()
            )
        })?;
        let mode = if plan.executable {
            EXECUTABLE_MODE
        } else {
            FILE_MODE
        };
        set_mode(&plan.dest, mode)?;
        tracing::debug!(
            src = %plan.source.display(),
            dest = %plan.dest.display(),
            "copying file"
        );
    }
    Ok(plans.len())
}

fn is_dependency_path(rel: &Path) -> bool {
    matches!(
        rel.components().next(),
        Some(Component::Normal(first)) if first == DEPENDENCY_DIR
    ) && rel.components().count() > 1
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use nix::unistd::{getegid, geteuid, Gid, Uid};
    use std::os::unix::fs::MetadataExt;
    let mode = metadata.mode();
    (Uid::from_raw(metadata.uid()) == geteuid() && mode & 0o100 != 0)
        || (Gid::from_raw(metadata.gid()) == getegid() && mode & 0o010 != 0)
        || mode & 0o001 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
