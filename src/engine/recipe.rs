// src/engine/recipe.rs

//! Recipe execution.
//!
//! Steps always run strictly in order.
//!
//! - Live: every step runs against the real filesystem and its commands are
//!   applied before the next step starts.
//! - Dry run: the matched files are snapshotted into a [`VirtualFileSystem`],
//!   every step runs (applying) against that sandbox, and only the net
//!   difference between the snapshot and the final sandbox is emitted. If
//!   any step fails outright nothing is emitted at all.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use super::diff::{net_commands, snapshot};
use super::runner::{announce, execute, warn_no_files, warn_skipped_dirs};
use super::{
    Codemod, CodemodExecutionError, CommandSink, EventSink, FlowSettings, PrinterMessage,
    RunContext, RunResult, RunSettings,
};
use crate::commands::FormattedFileCommand;
use crate::errors::Result;
use crate::fs::VirtualFileSystem;
use crate::patterns::{PathSource, resolve_patterns};

pub(crate) async fn run_recipe(
    ctx: &RunContext,
    recipe: &Codemod,
    steps: &[Codemod],
    flow: &FlowSettings,
    run: &RunSettings,
    sink: &mut dyn CommandSink,
) -> Result<()> {
    if steps.is_empty() {
        warn!(recipe = %recipe.name, "recipe has no steps");
        ctx.events.on_message(PrinterMessage::warn(format!(
            "Recipe '{}' has no steps; nothing to do",
            recipe.name
        )));
        return Ok(());
    }

    let nested = ctx.nested()?;
    if run.dry_run {
        run_dry(&nested, recipe, steps, flow, run, sink).await
    } else {
        run_live(&nested, recipe, steps, flow, run, sink).await
    }
}

async fn run_live(
    ctx: &RunContext,
    recipe: &Codemod,
    steps: &[Codemod],
    flow: &FlowSettings,
    run: &RunSettings,
    sink: &mut dyn CommandSink,
) -> Result<()> {
    let step_run = RunSettings {
        dry_run: false,
        ..*run
    };

    for (index, step) in steps.iter().enumerate() {
        debug!(recipe = %recipe.name, step = %step.name, index, "running recipe step");
        let step_ctx = ctx.with_events(StepEvents::wrap(ctx, recipe, index, steps.len(), true));

        if let Err(err) = execute(&step_ctx, step, flow, &step_run, &mut *sink).await {
            warn!(
                recipe = %recipe.name,
                step = %step.name,
                index,
                "recipe step failed; earlier changes stay applied"
            );
            ctx.events.on_message(PrinterMessage::warn(format!(
                "Recipe '{}' stopped at step {} of {} ('{}'). Changes made by the previous steps were already written to disk and remain applied.",
                recipe.name,
                index + 1,
                steps.len(),
                step.name
            )));
            return Err(err);
        }
    }
    Ok(())
}

async fn run_dry(
    ctx: &RunContext,
    recipe: &Codemod,
    steps: &[Codemod],
    flow: &FlowSettings,
    run: &RunSettings,
    sink: &mut dyn CommandSink,
) -> Result<()> {
    let resolved = resolve_patterns(recipe, &flow.patterns, None)?;
    announce(ctx, recipe, flow, &resolved);

    let source = PathSource::from_selection(Arc::clone(&ctx.fs), &flow.target, &resolved.selection)?;
    let skipped = source.skipped_dirs();
    let paths = source.collect().await;
    warn_skipped_dirs(ctx, recipe, &skipped);
    let file_map = snapshot(ctx.fs.as_ref(), &paths);
    if file_map.is_empty() {
        warn_no_files(ctx, recipe);
        return Ok(());
    }

    let vfs = Arc::new(VirtualFileSystem::from_file_map(&file_map));
    let sandbox = ctx.with_fs(vfs.clone());
    let step_run = RunSettings {
        dry_run: false,
        ..*run
    };
    let mut removals = RemovalTracker::default();

    for (index, step) in steps.iter().enumerate() {
        debug!(recipe = %recipe.name, step = %step.name, index, "running recipe step in sandbox");
        let step_ctx = sandbox.with_events(StepEvents::wrap(ctx, recipe, index, steps.len(), false));
        execute(&step_ctx, step, flow, &step_run, &mut removals).await?;
    }

    let commands = net_commands(&file_map, &vfs.files(), &removals.removed);
    debug!(
        recipe = %recipe.name,
        snapshot = file_map.len(),
        removed = removals.removed.len(),
        commands = commands.len(),
        "dry-run diff computed"
    );
    for command in commands {
        sink.accept(command).await?;
    }
    Ok(())
}

/// Remembers every path a sandboxed step removed; the commands themselves
/// were already applied to the sandbox.
#[derive(Debug, Default)]
struct RemovalTracker {
    removed: BTreeSet<PathBuf>,
}

impl CommandSink for RemovalTracker {
    fn accept(
        &mut self,
        command: FormattedFileCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        if let Some(path) = command.removed_path() {
            self.removed.insert(path.to_path_buf());
        }
        Box::pin(async { Ok(()) })
    }
}

/// Presents a step's progress as progress of the whole recipe.
struct StepEvents {
    inner: Arc<dyn EventSink>,
    recipe_name: String,
    index: usize,
    count: usize,
    weighted: bool,
}

impl StepEvents {
    fn wrap(ctx: &RunContext, recipe: &Codemod, index: usize, count: usize, weighted: bool) -> Arc<dyn EventSink> {
        Arc::new(Self {
            inner: Arc::clone(&ctx.events),
            recipe_name: recipe.name.clone(),
            index,
            count,
            weighted,
        })
    }
}

impl EventSink for StepEvents {
    fn on_message(&self, message: PrinterMessage) {
        let message = match message {
            PrinterMessage::Progress {
                processed_file_number,
                total_file_number,
                processed_file_name,
                ..
            } => {
                let (processed, total) = if self.weighted {
                    (
                        total_file_number * self.index + processed_file_number,
                        total_file_number * self.count,
                    )
                } else {
                    (processed_file_number, total_file_number)
                };
                PrinterMessage::Progress {
                    codemod_name: self.recipe_name.clone(),
                    processed_file_number: processed,
                    total_file_number: total,
                    processed_file_name,
                }
            }
            other => other,
        };
        self.inner.on_message(message);
    }

    fn on_codemod_error(&self, error: CodemodExecutionError) {
        self.inner.on_codemod_error(error);
    }

    fn on_success(&self, result: RunResult) {
        self.inner.on_success(result);
    }
}
