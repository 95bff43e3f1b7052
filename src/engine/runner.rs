// src/engine/runner.rs

//! Engine dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    Codemod, CommandSink, Engine, FlowSettings, MAX_RECIPE_DEPTH, PrinterMessage, RunContext,
    RunResult, RunSettings, filemod, recipe,
};
use crate::commands::{FormattedFileCommand, apply_command};
use crate::errors::{Result, RunnerError};
use crate::exec::WorkerPool;
use crate::fs::FileSystem;
use crate::patterns::{PathSource, ResolvedPatterns, SkippedDirs, resolve_patterns};

/// Reject a codemod tree containing anything that can't run.
///
/// Checked before any file is read, so an unsupported engine deep inside a
/// recipe fails the run up front instead of after earlier steps applied.
pub fn ensure_supported(codemod: &Codemod) -> Result<()> {
    fn check(codemod: &Codemod, depth: usize) -> Result<()> {
        match &codemod.engine {
            Engine::Unsupported { engine } => Err(RunnerError::EngineUnsupported(format!(
                "codemod '{}' uses engine '{engine}'",
                codemod.name
            ))),
            Engine::Recipe { steps, .. } => {
                if depth >= MAX_RECIPE_DEPTH {
                    return Err(RunnerError::ConfigError(format!(
                        "recipe '{}' nests deeper than {MAX_RECIPE_DEPTH} levels",
                        codemod.name
                    )));
                }
                steps.iter().try_for_each(|step| check(step, depth + 1))
            }
            Engine::JsTransform { .. } | Engine::Filemod { .. } | Engine::AstGrep { .. } => Ok(()),
        }
    }
    check(codemod, 0)
}

/// Run `codemod` and stream its commands into `sink`.
///
/// Outside dry-run mode every command is applied to `ctx.fs` before the sink
/// sees it, once the codemod has finished producing commands.
pub async fn run_codemod(
    ctx: &RunContext,
    codemod: &Codemod,
    flow: &FlowSettings,
    run: &RunSettings,
    sink: &mut dyn CommandSink,
) -> Result<()> {
    ensure_supported(codemod)?;

    info!(
        codemod = %codemod.name,
        engine = %codemod.kind(),
        target = ?flow.target,
        dry_run = run.dry_run,
        "codemod run started"
    );

    let commands = execute(ctx, codemod, flow, run, sink).await?;

    info!(codemod = %codemod.name, commands, "codemod run finished");
    ctx.events.on_message(PrinterMessage::Finish);
    Ok(())
}

/// Dispatch on the engine; returns the number of commands emitted.
pub(crate) fn execute<'a>(
    ctx: &'a RunContext,
    codemod: &'a Codemod,
    flow: &'a FlowSettings,
    run: &'a RunSettings,
    sink: &'a mut dyn CommandSink,
) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
    Box::pin(async move {
        let is_recipe = matches!(codemod.engine, Engine::Recipe { .. });
        // Recipe steps apply their own commands.
        let mut counted = ApplyingSink {
            apply: !run.dry_run && !is_recipe,
            pending: Vec::new(),
            inner: sink,
            count: 0,
        };

        match &codemod.engine {
            Engine::Unsupported { engine } => {
                return Err(RunnerError::EngineUnsupported(format!(
                    "codemod '{}' uses engine '{engine}'",
                    codemod.name
                )));
            }
            Engine::Filemod { .. } => {
                filemod::run_filemod(ctx, codemod, flow, &mut counted).await?;
            }
            Engine::JsTransform { .. } | Engine::AstGrep { .. } => {
                run_per_file(ctx, codemod, flow, &mut counted).await?;
            }
            Engine::Recipe { steps, .. } => {
                recipe::run_recipe(ctx, codemod, steps, flow, run, &mut counted).await?;
            }
        }

        let count = counted.flush(ctx.fs.as_ref()).await?;
        ctx.events.on_success(RunResult {
            codemod_name: codemod.name.clone(),
            commands: count,
        });
        Ok(count)
    })
}

/// Counts commands on the way to the real sink.
///
/// Commands that must be applied are held back until the codemod has
/// finished, so the path walk and the workers only ever see the tree as it
/// was when the codemod started. A codemod that fails applies and emits
/// none of its held-back commands.
struct ApplyingSink<'a> {
    apply: bool,
    pending: Vec<FormattedFileCommand>,
    inner: &'a mut dyn CommandSink,
    count: usize,
}

impl ApplyingSink<'_> {
    /// Apply and forward everything held back; returns the total count.
    async fn flush(mut self, fs: &dyn FileSystem) -> Result<usize> {
        if !self.pending.is_empty() {
            debug!(commands = self.pending.len(), "applying held-back commands");
        }
        for command in std::mem::take(&mut self.pending) {
            apply_command(fs, &command)?;
            self.inner.accept(command).await?;
            self.count += 1;
        }
        Ok(self.count)
    }
}

impl CommandSink for ApplyingSink<'_> {
    fn accept(
        &mut self,
        command: FormattedFileCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.apply {
                self.pending.push(command);
                return Ok(());
            }
            self.inner.accept(command).await?;
            self.count += 1;
            Ok(())
        })
    }
}

/// Summary shown before a codemod touches any file.
pub(crate) fn announce(ctx: &RunContext, codemod: &Codemod, flow: &FlowSettings, resolved: &ResolvedPatterns) {
    let mut message = format!(
        "Running codemod '{}' ({}) on {}\n{}",
        codemod.name,
        codemod.kind(),
        flow.target.display(),
        resolved.reason
    );
    if !resolved.include().is_empty() {
        message.push_str(&format!("\nIncluded patterns: {}", resolved.include().join(", ")));
    }
    if !resolved.exclude().is_empty() {
        message.push_str(&format!("\nExcluded patterns: {}", resolved.exclude().join(", ")));
    }
    if matches!(codemod.engine, Engine::JsTransform { .. } | Engine::AstGrep { .. }) {
        message.push_str(&format!("\nThreads: {}", flow.threads.max(1)));
    }
    ctx.events.on_message(PrinterMessage::info(message));
}

pub(crate) fn warn_no_files(ctx: &RunContext, codemod: &Codemod) {
    warn!(codemod = %codemod.name, "no files matched");
    ctx.events.on_message(PrinterMessage::warn(format!(
        "No files matched the patterns of codemod '{}'; nothing to do",
        codemod.name
    )));
}

/// Report directories the path walk could not read.
pub(crate) fn warn_skipped_dirs(ctx: &RunContext, codemod: &Codemod, skipped: &SkippedDirs) {
    for dir in skipped.take() {
        ctx.events.on_message(PrinterMessage::warn(format!(
            "Codemod '{}' skipped unreadable directory {}: {}",
            codemod.name,
            dir.path.display(),
            dir.reason
        )));
    }
}

/// A backend that can't compile a codemod fails that codemod as a whole.
pub(crate) fn backend_error(codemod: &Codemod, err: anyhow::Error) -> RunnerError {
    RunnerError::Transform {
        codemod: codemod.name.clone(),
        path: None,
        message: format!("{err:#}"),
    }
}

async fn run_per_file(
    ctx: &RunContext,
    codemod: &Codemod,
    flow: &FlowSettings,
    sink: &mut dyn CommandSink,
) -> Result<()> {
    let transform = ctx
        .backend
        .file_transform(codemod)
        .map_err(|e| backend_error(codemod, e))?;

    let resolved = resolve_patterns(codemod, &flow.patterns, None)?;
    announce(ctx, codemod, flow, &resolved);

    let mut source = PathSource::from_selection(Arc::clone(&ctx.fs), &flow.target, &resolved.selection)?;
    let skipped = source.skipped_dirs();
    if !source.has_next().await {
        warn_skipped_dirs(ctx, codemod, &skipped);
        warn_no_files(ctx, codemod);
        return Ok(());
    }

    let pool = WorkerPool {
        threads: flow.threads,
        idle_timeout: flow.idle_timeout,
        fs: Arc::clone(&ctx.fs),
        transform,
        codemod_name: codemod.name.clone(),
        engine: codemod.kind(),
        arguments: Arc::clone(&ctx.arguments),
        events: Arc::clone(&ctx.events),
    };
    let outcome = pool.run(source, sink).await?;
    warn_skipped_dirs(ctx, codemod, &skipped);

    if outcome.timed_out {
        ctx.events.on_message(PrinterMessage::warn(format!(
            "Codemod '{}' stopped after {} of {} files: workers were idle for {}s",
            codemod.name,
            outcome.processed,
            outcome.total,
            flow.idle_timeout.as_secs()
        )));
    }

    info!(
        target: "codemod_runner::telemetry",
        codemod = %codemod.name,
        engine = %codemod.kind(),
        files = outcome.processed,
        "codemod executed"
    );
    Ok(())
}
