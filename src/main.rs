// src/main.rs

use std::process::ExitCode;

use codemod_runner::errors::RunnerError;
use codemod_runner::{cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("codemod-runner: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("codemod-runner: {err:?}");
            exit_code(&err)
        }
    }
}

/// Manifest and usage problems exit with 2, everything else with 1.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<RunnerError>() {
        Some(RunnerError::ConfigError(_) | RunnerError::TomlError(_)) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
