// src/lib.rs

pub mod case;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod patterns;
pub mod types;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::case::{
    Case, CaseEvent, CaseWriter, HashDigest, Job, JobBuilder, ReaderOptions, codemod_hash_digest,
    derive_case_hash_digest, spawn_case_reader,
};
use crate::cli::{CliArgs, Command, RunArgs, TailArgs};
use crate::commands::FormattedFileCommand;
use crate::config::load_and_validate;
use crate::engine::{
    CaseLogSink, FlowSettings, RunContext, RunSettings, TracingEventSink, run_codemod,
};
use crate::exec::CommandBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::patterns::FlowPatterns;

/// File name of the case log inside `--output`.
pub const CASE_LOG_FILE_NAME: &str = "case.data";

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run(run_args) => run_command(run_args).await,
        Command::Tail(tail_args) => tail_command(tail_args).await,
    }
}

/// Load the manifest, run the codemod and either log its commands as jobs
/// or print them as JSON lines.
async fn run_command(args: RunArgs) -> Result<()> {
    let manifest = load_and_validate(&args.codemod)
        .with_context(|| format!("loading codemod manifest {:?}", args.codemod))?;

    let mut arguments = manifest.arguments.clone();
    arguments.extend(args.arguments);

    let target = std::fs::canonicalize(&args.target)
        .with_context(|| format!("resolving target directory {:?}", args.target))?;

    let mut flow = FlowSettings::new(&target);
    flow.patterns = FlowPatterns {
        include: args.include,
        exclude: args.exclude,
        files: args.files,
    };
    if let Some(threads) = args.threads {
        flow.threads = threads.max(1);
    }
    flow.idle_timeout = Duration::from_secs(args.idle_timeout_secs);

    let created_at = now_millis()?;
    let codemod_digest = codemod_hash_digest(&manifest.codemod.identity());
    let case_hash_digest = derive_case_hash_digest(&target, &codemod_digest, created_at);
    let run = RunSettings {
        dry_run: args.dry_run,
        case_hash_digest,
    };

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let events = Arc::new(TracingEventSink::new());
    let ctx = RunContext::new(
        Arc::clone(&fs),
        Arc::new(CommandBackend::default()),
        events.clone(),
        arguments.clone(),
    );

    let commands = match args.output {
        Some(output) => {
            std::fs::create_dir_all(&output)
                .with_context(|| format!("creating output directory {output:?}"))?;
            let log_path = output.join(CASE_LOG_FILE_NAME);
            let file = File::create(&log_path)
                .with_context(|| format!("creating case log {log_path:?}"))?;

            let mut writer = CaseWriter::new(file)?;
            writer.write_case(&Case {
                case_hash_digest,
                codemod_hash_digest: codemod_digest,
                created_at,
                absolute_target_path: target.to_string_lossy().into_owned(),
                argument_record: arguments,
            })?;

            let builder = JobBuilder::new(Arc::clone(&fs), &output, case_hash_digest);
            let mut sink = CaseLogSink::new(writer, builder);
            run_codemod(&ctx, &manifest.codemod, &flow, &run, &mut sink).await?;

            let jobs = sink.jobs_written();
            sink.finish()?;
            info!(path = ?log_path, jobs, "case log written");
            jobs
        }
        None => {
            let mut sink: Vec<FormattedFileCommand> = Vec::new();
            run_codemod(&ctx, &manifest.codemod, &flow, &run, &mut sink).await?;
            for command in &sink {
                println!("{}", serde_json::to_string(command)?);
            }
            sink.len()
        }
    };

    print_summary(&manifest.codemod.name, &target, commands, events.error_count(), run.dry_run);
    Ok(())
}

/// Print every record of a case log; with `--follow`, until the postamble.
async fn tail_command(args: TailArgs) -> Result<()> {
    let options = ReaderOptions {
        follow: args.follow,
        ..ReaderOptions::default()
    };
    let mut reader = spawn_case_reader(&args.path, options);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = reader.next_event() => match event {
                Some(CaseEvent::Case(case)) => print_case(&case)?,
                Some(CaseEvent::Job(job)) => print_job(&job),
                Some(CaseEvent::Finish) => {
                    debug!(path = ?args.path, "case log complete");
                    return Ok(());
                }
                Some(CaseEvent::Error(err)) => {
                    if interrupted && err.is_reader_fatal() {
                        warn!(error = %err, "interrupted before the postamble was read");
                    }
                    return Err(err).with_context(|| format!("reading case log {:?}", args.path));
                }
                None => return Ok(()),
            },
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                if let Err(e) = signal {
                    eprintln!("failed to listen for Ctrl+C: {e}");
                }
                interrupted = true;
                reader.close();
            }
        }
    }
}

fn now_millis() -> Result<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the Unix epoch")?;
    i64::try_from(elapsed.as_millis()).context("timestamp out of range")
}

fn hex(digest: &HashDigest) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn print_case(case: &Case) -> Result<()> {
    println!("case {}", hex(&case.case_hash_digest));
    println!("  codemod: {}", hex(&case.codemod_hash_digest));
    println!("  created_at: {}", case.created_at);
    println!("  target: {}", case.absolute_target_path);
    println!("  arguments: {}", serde_json::to_string(&case.argument_record)?);
    Ok(())
}

fn print_job(job: &Job) {
    println!("job {} {:?}", hex(&job.job_hash_digest), job.kind());
    for uri in job.payload.uris() {
        println!("  {uri}");
    }
}

fn print_summary(name: &str, target: &Path, commands: usize, errors: usize, dry_run: bool) {
    let mode = if dry_run { " (dry run)" } else { "" };
    eprintln!(
        "codemod '{name}' on {}{mode}: {commands} command(s), {errors} error(s)",
        target.display()
    );
}
