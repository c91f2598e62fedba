//! `package.json` patching.
//!
//! Substitution and verification are separate passes over the parsed
//! document: verification also has to catch entries that no substitution
//! was ever configured for.
use crate::error::RunnerError;
use crate::runfiles::RunfilesResolver;
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_FILE: &str = "package.json";
pub const DEPENDENCY_SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

const FILE_PREFIX: &str = "file:";

/// A parsed `package.json` and the location it is written back to.
#[derive(Debug, Clone)]
pub struct PackageManifest {
    path: PathBuf,
    document: Map<String, Value>,
}

/// One dependency entry rewritten to a local file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub name: String,
    pub section: &'static str,
    pub previous: String,
    pub reference: String,
}

impl PackageManifest {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(RunnerError::MissingManifest {
                root: root.to_path_buf(),
            }
            .into());
        }
        let text =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Self::parse(path, &text)
    }

    pub fn parse(path: PathBuf, text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .with_context(|| format!("parse package manifest {}", path.display()))?;
        let Value::Object(document) = value else {
            return Err(anyhow!(
                "package manifest {} is not a JSON object",
                path.display()
            ));
        };
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of `name` in the first dependency section that lists it.
    pub fn dependency(&self, name: &str) -> Option<&Value> {
        DEPENDENCY_SECTIONS
            .iter()
            .filter_map(|section| self.section(section))
            .find_map(|deps| deps.get(name))
    }

    fn section(&self, section: &str) -> Option<&Map<String, Value>> {
        self.document.get(section).and_then(Value::as_object)
    }

    fn section_mut(&mut self, section: &str) -> Option<&mut Map<String, Value>> {
        self.document.get_mut(section).and_then(Value::as_object_mut)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut text =
            serde_json::to_string_pretty(&self.document).context("serialize package manifest")?;
        text.push('\n');
        Ok(text)
    }

    /// Overwrite the manifest file in place.
    pub fn save(&self) -> Result<()> {
        let text = self.to_json_string()?;
        tracing::debug!("package.json file:\n{text}");
        fs::write(&self.path, text.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

pub fn local_file_reference(path: &Path) -> String {
    format!("{FILE_PREFIX}{}", path.display())
}

/// Point every listed package at its local artifact.
///
/// Names missing from both dependency sections are skipped.
pub fn substitute_packages(
    manifest: &mut PackageManifest,
    packages: &BTreeMap<String, PathBuf>,
) -> Vec<Substitution> {
    let mut applied = Vec::new();
    for (name, real_path) in packages {
        let reference = local_file_reference(real_path);
        let mut found = false;
        for section in DEPENDENCY_SECTIONS {
            let Some(entry) = manifest
                .section_mut(section)
                .and_then(|deps| deps.get_mut(name))
            else {
                continue;
            };
            found = true;
            let previous = match &*entry {
                Value::String(value) => value.clone(),
                other => other.to_string(),
            };
            *entry = Value::String(reference.clone());
            applied.push(Substitution {
                name: name.clone(),
                section,
                previous,
                reference: reference.clone(),
            });
        }
        if !found {
            tracing::debug!(package = %name, "npm package not listed in package.json; skipping");
        }
    }
    applied
}

/// Names whose entries still do not point at a local artifact.
///
/// Every package in `check` must reference `file:` outside the fixture.
/// Entries nobody asked about still may not reference a file inside the
/// fixture, since that means a substitution was never configured.
pub fn find_unresolved(
    manifest: &PackageManifest,
    check: &BTreeSet<String>,
    substituted: &BTreeSet<String>,
) -> Vec<String> {
    let mut unresolved: Vec<String> = Vec::new();
    for name in check {
        let Some(value) = manifest.dependency(name) else {
            continue;
        };
        let resolved = value.as_str().is_some_and(|value| {
            value.starts_with(FILE_PREFIX)
                && !value.starts_with("file:.")
                && !is_in_fixture_reference(value)
        });
        if !resolved {
            unresolved.push(name.clone());
        }
    }
    for section in DEPENDENCY_SECTIONS {
        let Some(deps) = manifest.section(section) else {
            continue;
        };
        for (name, value) in deps {
            if check.contains(name) || substituted.contains(name) || unresolved.contains(name) {
                continue;
            }
            if value.as_str().is_some_and(is_in_fixture_reference) {
                unresolved.push(name.clone());
            }
        }
    }
    unresolved
}

/// `file:` reference whose target stays inside the fixture directory.
pub fn is_in_fixture_reference(value: &str) -> bool {
    let Some(target) = value.strip_prefix(FILE_PREFIX) else {
        return false;
    };
    let mut depth = 0usize;
    for component in Path::new(target).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(_) => depth += 1,
            Component::ParentDir => match depth.checked_sub(1) {
                Some(next) => depth = next,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Resolve, substitute, verify, and persist the fixture's `package.json`.
pub fn patch_manifest(
    root: &Path,
    npm_packages: &BTreeMap<String, String>,
    check: &BTreeSet<String>,
    resolver: &RunfilesResolver,
) -> Result<Vec<Substitution>> {
    let mut manifest = PackageManifest::load(root)?;
    let packages: BTreeMap<String, PathBuf> = npm_packages
        .iter()
        .map(|(name, logical)| (name.clone(), resolver.resolve(logical)))
        .collect();

    let applied = substitute_packages(&mut manifest, &packages);
    for substitution in &applied {
        tracing::info!(
            package = %substitution.name,
            section = substitution.section,
            previous = %substitution.previous,
            "overriding npm package with '{}' in package.json file",
            substitution.reference
        );
    }

    let substituted: BTreeSet<String> = applied.iter().map(|sub| sub.name.clone()).collect();
    let unresolved = find_unresolved(&manifest, check, &substituted);
    if !unresolved.is_empty() {
        return Err(RunnerError::UnresolvedPackageSubstitution { names: unresolved }.into());
    }

    manifest.save()?;
    tracing::info!(
        manifest = %manifest.path().display(),
        substitutions = applied.len(),
        "patched package.json"
    );
    Ok(applied)
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
