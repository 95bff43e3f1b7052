// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::DEFAULT_IDLE_TIMEOUT;
use crate::types::ArgumentValue;

/// Command-line arguments for `codemod-runner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "codemod-runner",
    version,
    about = "Run codemods over a source tree and record their effects as a case log.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CODEMOD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a codemod manifest against a target directory.
    Run(RunArgs),
    /// Decode a case log, optionally following it while it grows.
    Tail(TailArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the codemod manifest (TOML).
    #[arg(long, value_name = "PATH")]
    pub codemod: PathBuf,

    /// Directory the codemod runs on.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub target: PathBuf,

    /// Compute the commands without touching the target.
    #[arg(long)]
    pub dry_run: bool,

    /// Worker count for per-file engines. Defaults to the available
    /// parallelism.
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Include glob; repeatable.
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Exclude glob; repeatable.
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Explicit file list; replaces pattern matching entirely. Repeatable.
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Codemod argument `key=value`; overrides the manifest's `[arguments]`.
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub arguments: Vec<(String, ArgumentValue)>,

    /// Write `case.data` and the command data into this directory.
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Stop waiting for workers that produced nothing for this long.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct TailArgs {
    /// Path to a case log.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Keep waiting for new records until the postamble arrives.
    #[arg(long)]
    pub follow: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_key_value(raw: &str) -> Result<(String, ArgumentValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty argument name in '{raw}'"));
    }
    Ok((key.to_string(), ArgumentValue::parse_cli(value)))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse() {
        let args = CliArgs::try_parse_from([
            "codemod-runner",
            "run",
            "--codemod",
            "m.toml",
            "--dry-run",
            "--arg",
            "quote=single",
            "--arg",
            "max=3",
            "--include",
            "src/",
        ])
        .unwrap();

        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert!(run.dry_run);
        assert_eq!(run.include, vec!["src/".to_string()]);
        assert_eq!(
            run.arguments,
            vec![
                ("quote".to_string(), ArgumentValue::from("single")),
                ("max".to_string(), ArgumentValue::from(3)),
            ]
        );
        assert_eq!(run.idle_timeout_secs, 30);
    }

    #[test]
    fn malformed_argument_is_rejected() {
        assert!(
            CliArgs::try_parse_from(["codemod-runner", "run", "--codemod", "m.toml", "--arg", "novalue"])
                .is_err()
        );
    }
}
