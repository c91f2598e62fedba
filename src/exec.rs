//! Sequential test command execution.
use crate::error::RunnerError;
use crate::runfiles::RunfilesResolver;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Instant;

/// Prefix of binaries that live in an external repository's runfiles.
const EXTERNAL_PREFIX: &str = "external/";

/// A command line split into a resolved program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub line: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// 1-based position in the configured command list.
    pub number: usize,
    pub command: String,
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub successful: usize,
    pub total: usize,
    pub failure: Option<CommandFailure>,
}

impl CommandReport {
    pub fn exit_code(&self) -> i32 {
        self.failure.as_ref().map_or(0, |failure| failure.code)
    }
}

/// Split `line` and resolve its program.
///
/// `./`-prefixed programs are taken relative to `cwd`; anything else goes
/// through the runfiles resolver after dropping a leading `external/`.
///
/// Lines are split with POSIX shell quoting rather than on bare whitespace:
/// quotes group words and backslashes escape, so `tool C:\dir` loses its
/// backslash and an unbalanced `'` is a parse error.
pub fn parse_command(
    number: usize,
    line: &str,
    cwd: &Path,
    resolver: &RunfilesResolver,
) -> Result<CommandSpec> {
    let mut tokens =
        shell_words::split(line).with_context(|| format!("parse test command: {line}"))?;
    if tokens.is_empty() {
        return Err(RunnerError::EmptyCommand { index: number }.into());
    }
    let binary = tokens.remove(0);
    let program = if binary.starts_with("./") {
        cwd.join(&binary)
    } else {
        let logical = binary
            .strip_prefix(EXTERNAL_PREFIX)
            .unwrap_or(binary.as_str());
        resolver.resolve(logical)
    };
    Ok(CommandSpec {
        line: line.to_string(),
        program,
        args: tokens,
    })
}

/// Run every command in order in `cwd`, stopping at the first failure.
///
/// `env_vars` are layered over the inherited environment of each child only.
pub fn run_commands(
    commands: &[String],
    cwd: &Path,
    env_vars: &BTreeMap<String, String>,
    resolver: &RunfilesResolver,
) -> Result<CommandReport> {
    let specs = commands
        .iter()
        .enumerate()
        .map(|(idx, line)| parse_command(idx + 1, line, cwd, resolver))
        .collect::<Result<Vec<_>>>()?;

    let mut report = CommandReport {
        successful: 0,
        total: specs.len(),
        failure: None,
    };
    for (idx, spec) in specs.iter().enumerate() {
        let command_line = format_command_line(&spec.program, &spec.args);
        tracing::info!(cwd = %cwd.display(), "running test command '{command_line}'");

        let start = Instant::now();
        let status = spawn(spec, cwd, env_vars).with_context(|| {
            format!(
                "test command {} could not be started ({} of {} test commands successful)",
                idx + 1,
                report.successful,
                report.total
            )
        })?;
        let elapsed_ms = start.elapsed().as_millis();
        let code = exit_code(&status);
        tracing::info!(elapsed_ms, code, number = idx + 1, "test command complete");

        if code != 0 {
            report.failure = Some(CommandFailure {
                number: idx + 1,
                command: spec.line.clone(),
                code,
            });
            return Ok(report);
        }
        report.successful += 1;
    }
    Ok(report)
}

fn spawn(
    spec: &CommandSpec,
    cwd: &Path,
    env_vars: &BTreeMap<String, String>,
) -> Result<ExitStatus> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.current_dir(cwd);
    cmd.status()
        .with_context(|| format!("spawn test command {}", spec.program.display()))
}

/// Exit code as a shell would report it; signals map to `128 + signal`.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Printable form of a resolved command, quoted so it can be pasted into a shell.
fn format_command_line(program: &Path, args: &[String]) -> String {
    let program = program.to_string_lossy();
    shell_words::join(std::iter::once(program.as_ref()).chain(args.iter().map(String::as_str)))
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
