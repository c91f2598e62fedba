use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod env;
mod error;
mod exec;
mod manifest;
mod runfiles;
mod runner;
mod staging;

use cli::{Command, RootArgs};
use env::RunnerEnv;
use runner::{RunOptions, INTERNAL_FAILURE};

fn main() -> ExitCode {
    let args = RootArgs::parse();
    let env = match RunnerEnv::from_env() {
        Ok(env) => env,
        Err(err) => {
            init_tracing(args.verbose);
            tracing::error!("{err:#}");
            return exit_code(INTERNAL_FAILURE);
        }
    };
    init_tracing(args.verbose || env.verbose_logs);

    match dispatch(args.command, &env) {
        Ok(code) => exit_code(code),
        Err(err) => {
            tracing::error!("{err:#}");
            exit_code(INTERNAL_FAILURE)
        }
    }
}

fn dispatch(command: Command, env: &RunnerEnv) -> Result<i32> {
    match command {
        Command::Run(args) => {
            let config = config::load_config(&args.fixture.config)?;
            let options = RunOptions {
                debug: args.fixture.debug,
                keep: args.keep,
                test_manifest: args.fixture.test_manifest,
                args: args.args,
            };
            runner::run_test(&config, env, &options)
        }
        Command::Stage(args) => {
            let config = config::load_config(&args.fixture.config)?;
            let options = RunOptions {
                debug: args.fixture.debug,
                keep: true,
                test_manifest: args.fixture.test_manifest,
                args: Vec::new(),
            };
            let root = runner::stage_only(&config, env, &options)?;
            println!("{}", root.display());
            Ok(0)
        }
    }
}

/// Diagnostics go to stderr; RUST_LOG overrides the verbosity flags.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
