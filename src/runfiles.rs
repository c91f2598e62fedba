//! Logical-path resolution through an optional runfiles manifest.
//!
//! Sandboxed test environments may expose runfiles only through a
//! `MANIFEST` indirection table instead of a symlink tree. When no table is
//! loaded, a logical path resolves against the parent of the startup cwd.
use crate::env::RunnerEnv;
use crate::error::RunnerError;
use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Which signal caused the manifest to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestTrigger {
    /// `RUNFILES_MANIFEST_ONLY=1`: the environment demands the manifest.
    ManifestOnly,
    /// `--test-manifest` with a `MANIFEST` file present under `RUNFILES_DIR`.
    LegacyOnDisk,
}

#[derive(Debug, Clone)]
pub struct RunfilesResolver {
    base: PathBuf,
    manifest: Option<HashMap<String, PathBuf>>,
    trigger: Option<ManifestTrigger>,
}

impl RunfilesResolver {
    /// Resolver with no manifest: everything resolves under `parent(cwd)`.
    pub fn relative_to(cwd: &Path) -> Self {
        Self {
            base: cwd.join(".."),
            manifest: None,
            trigger: None,
        }
    }

    pub fn with_manifest(
        cwd: &Path,
        entries: HashMap<String, PathBuf>,
        trigger: ManifestTrigger,
    ) -> Self {
        Self {
            base: cwd.join(".."),
            manifest: Some(entries),
            trigger: Some(trigger),
        }
    }

    /// Pick a resolver from the environment signals, evaluated once.
    pub fn from_env(env: &RunnerEnv, test_manifest: bool) -> Result<Self> {
        let Some(trigger) = manifest_trigger(env, test_manifest) else {
            tracing::debug!("no runfiles manifest in effect");
            return Ok(Self::relative_to(&env.cwd));
        };
        let Some(path) = env
            .manifest_file
            .clone()
            .or_else(|| env.runfiles_dir_manifest())
        else {
            return Err(RunnerError::RunfilesManifestUnavailable {
                path: PathBuf::from("MANIFEST"),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "neither RUNFILES_MANIFEST_FILE nor RUNFILES_DIR is set",
                ),
            }
            .into());
        };
        let text = fs::read_to_string(&path).map_err(|source| {
            RunnerError::RunfilesManifestUnavailable {
                path: path.clone(),
                source,
            }
        })?;
        let entries = parse_manifest(&text);
        tracing::info!(
            manifest = %path.display(),
            entries = entries.len(),
            ?trigger,
            "loaded runfiles manifest"
        );
        Ok(Self::with_manifest(&env.cwd, entries, trigger))
    }

    pub fn trigger(&self) -> Option<ManifestTrigger> {
        self.trigger
    }

    /// Map a logical path to a real one, falling back to `parent(cwd)/logical`.
    pub fn resolve(&self, logical: &str) -> PathBuf {
        if let Some(real) = self
            .manifest
            .as_ref()
            .and_then(|manifest| manifest.get(logical))
        {
            return real.clone();
        }
        self.base.join(logical)
    }
}

fn manifest_trigger(env: &RunnerEnv, test_manifest: bool) -> Option<ManifestTrigger> {
    if env.manifest_only {
        return Some(ManifestTrigger::ManifestOnly);
    }
    let on_disk = env
        .runfiles_dir_manifest()
        .is_some_and(|path| path.is_file());
    if test_manifest && on_disk {
        return Some(ManifestTrigger::LegacyOnDisk);
    }
    None
}

/// Parse `<logical> <real>` lines; malformed lines are skipped.
pub fn parse_manifest(text: &str) -> HashMap<String, PathBuf> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once(' '))
        .filter(|(logical, real)| !logical.is_empty() && !real.is_empty())
        .map(|(logical, real)| (logical.to_string(), PathBuf::from(real)))
        .collect()
}
