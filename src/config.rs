//! Run configuration loading.
//!
//! The build rule that declares an integration test writes this file; the
//! runner only reads it and never mutates it afterwards.
use crate::error::RunnerError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// One integration test: a fixture, its commands, and the packages to swap in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunConfiguration {
    /// Logical paths of every fixture file; all share one root directory.
    pub test_files: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    /// Package name to the logical path of its locally built artifact.
    #[serde(default)]
    pub npm_packages: BTreeMap<String, String>,
    #[serde(default)]
    pub check_npm_packages: BTreeSet<String>,
    /// Injected into test commands only.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub debug: bool,
}

/// Load and validate a run configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<RunConfiguration> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: RunConfiguration = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse run config JSON {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &RunConfiguration) -> Result<()> {
    if config.test_files.is_empty() {
        return Err(RunnerError::NoTestFiles.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_reads_camel_case_fields() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
              "testFiles": ["ws/fixture/package.json", "ws/fixture/src/x.js"],
              "commands": ["./node_modules/.bin/tool --version"],
              "npmPackages": {"my-lib": "ws/dist/my-lib"},
              "checkNpmPackages": ["my-lib"],
              "envVars": {"CI": "1"},
              "debug": false
            }"#,
        )
        .expect("write config");

        let config = load_config(&path).expect("load config");
        assert_eq!(config.test_files.len(), 2);
        assert_eq!(config.commands, vec!["./node_modules/.bin/tool --version"]);
        assert_eq!(
            config.npm_packages.get("my-lib").map(String::as_str),
            Some("ws/dist/my-lib")
        );
        assert!(config.check_npm_packages.contains("my-lib"));
        assert_eq!(config.env_vars.get("CI").map(String::as_str), Some("1"));
        assert!(!config.debug);
    }

    #[test]
    fn optional_fields_default_to_empty() {
        let config: RunConfiguration =
            serde_json::from_str(r#"{"testFiles": ["ws/a/package.json"]}"#).expect("parse");
        assert!(config.commands.is_empty());
        assert!(config.npm_packages.is_empty());
        assert!(config.check_npm_packages.is_empty());
        assert!(config.env_vars.is_empty());
        assert!(!config.debug);
    }

    #[test]
    fn empty_test_files_are_rejected() {
        let config = RunConfiguration::default();
        let err = validate_config(&config).expect_err("no test files");
        assert!(matches!(
            err.downcast_ref::<RunnerError>(),
            Some(RunnerError::NoTestFiles)
        ));
    }
}
