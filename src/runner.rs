//! End-to-end run of one integration test.
//!
//! Stages are strictly linear: resolve runfiles, stage the fixture, patch its
//! `package.json`, run the commands, report. Nothing is retried.
use crate::config::RunConfiguration;
use crate::env::RunnerEnv;
use crate::exec::{run_commands, CommandReport};
use crate::manifest::patch_manifest;
use crate::runfiles::RunfilesResolver;
use crate::staging::{stage_fixture, StagedFixture};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Exit code for failures inside the runner itself.
pub const INTERNAL_FAILURE: i32 = 1;

/// Command-line overrides layered over the run configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub debug: bool,
    pub keep: bool,
    pub test_manifest: bool,
    /// Extra arguments after the config path; recorded, not interpreted.
    pub args: Vec<String>,
}

impl RunOptions {
    fn debug_enabled(&self, config: &RunConfiguration) -> bool {
        config.debug || self.debug
    }
}

/// A fixture that has been staged and patched, ready for its commands.
pub struct TestRunner<'a> {
    config: &'a RunConfiguration,
    resolver: RunfilesResolver,
    fixture: StagedFixture,
}

impl<'a> TestRunner<'a> {
    /// Stage and patch the fixture described by `config`.
    pub fn prepare(
        config: &'a RunConfiguration,
        env: &RunnerEnv,
        resolver: RunfilesResolver,
        debug: bool,
        keep: bool,
    ) -> Result<Self> {
        tracing::debug!(trigger = ?resolver.trigger(), "runfiles resolver ready");
        let fixture = stage_fixture(&config.test_files, &resolver, env, debug, keep)?;
        tracing::debug!(
            source = %fixture.source_root().display(),
            in_place = fixture.is_in_place(),
            "fixture staged"
        );
        patch_manifest(
            fixture.root(),
            &config.npm_packages,
            &config.check_npm_packages,
            &resolver,
        )
        .with_context(|| format!("patch package.json under {}", fixture.root().display()))?;
        Ok(Self {
            config,
            resolver,
            fixture,
        })
    }

    pub fn fixture(&self) -> &StagedFixture {
        &self.fixture
    }

    pub fn run(&self) -> Result<CommandReport> {
        run_commands(
            &self.config.commands,
            self.fixture.root(),
            &self.config.env_vars,
            &self.resolver,
        )
    }

    /// Remove the staged directory unless it is meant to outlive the run.
    pub fn finish(mut self) {
        if let Err(err) = self.fixture.cleanup() {
            tracing::warn!("{err:#}");
        }
    }
}

/// Run one integration test and return the process exit code.
///
/// Errors before staging propagate; failures from staging onwards are
/// reported here so the debug hint can follow them.
pub fn run_test(config: &RunConfiguration, env: &RunnerEnv, options: &RunOptions) -> Result<i32> {
    log_inputs(config, env, options);
    let debug = options.debug_enabled(config);
    let resolver = RunfilesResolver::from_env(env, options.test_manifest)?;

    let runner = match TestRunner::prepare(config, env, resolver, debug, options.keep) {
        Ok(runner) => runner,
        Err(err) => {
            tracing::error!("{err:#}");
            if !debug {
                log_debug_hint(env);
            }
            return Ok(INTERNAL_FAILURE);
        }
    };

    let report = match runner.run() {
        Ok(report) => report,
        Err(err) => {
            tracing::error!("{err:#}");
            report_location(&runner, debug, env, true);
            runner.finish();
            return Ok(INTERNAL_FAILURE);
        }
    };

    tracing::info!(
        "{} of {} test commands successful",
        report.successful,
        report.total
    );
    if let Some(failure) = &report.failure {
        tracing::error!(
            command = %failure.command,
            "test command {} failed with status code {}",
            failure.number,
            failure.code
        );
    }
    report_location(&runner, debug, env, report.failure.is_some());
    runner.finish();
    Ok(report.exit_code())
}

/// Stage and patch without running commands; the directory is always kept.
pub fn stage_only(
    config: &RunConfiguration,
    env: &RunnerEnv,
    options: &RunOptions,
) -> Result<PathBuf> {
    log_inputs(config, env, options);
    let debug = options.debug_enabled(config);
    let resolver = RunfilesResolver::from_env(env, options.test_manifest)?;
    let runner = TestRunner::prepare(config, env, resolver, debug, true)?;
    let root = runner.fixture().root().to_path_buf();
    runner.finish();
    Ok(root)
}

fn report_location(runner: &TestRunner<'_>, debug: bool, env: &RunnerEnv, failed: bool) {
    let fixture = runner.fixture();
    if debug {
        tracing::info!(
            "test may be re-run manually under {}",
            fixture.root().display()
        );
        return;
    }
    if fixture.is_kept() {
        tracing::info!("staged fixture kept at {}", fixture.root().display());
    }
    if failed {
        log_debug_hint(env);
    }
}

fn log_debug_hint(env: &RunnerEnv) {
    match env.test_target.as_deref() {
        Some(target) => {
            tracing::info!("to run test in debug mode:\n\n    bazel run {target}.debug\n")
        }
        None => tracing::info!("to run test in debug mode, re-run with --debug"),
    }
}

fn log_inputs(config: &RunConfiguration, env: &RunnerEnv, options: &RunOptions) {
    tracing::info!(cwd = %env.cwd.display(), "running test");
    for (key, value) in &config.env_vars {
        tracing::debug!("set environment variable {key}='{value}' for test commands");
    }
    match serde_json::to_string_pretty(config) {
        Ok(text) => tracing::debug!("config: {text}"),
        Err(err) => tracing::debug!("config not serializable: {err}"),
    }
    tracing::debug!(?env, args = ?options.args, "runner inputs");
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
