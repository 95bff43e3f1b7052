// src/engine/filemod.rs

//! Single-pass filemod execution.

use std::sync::Arc;

use tracing::{debug, info};

use super::runner::{announce, backend_error, warn_no_files, warn_skipped_dirs};
use super::{Codemod, CodemodExecutionError, CommandSink, FlowSettings, PrinterMessage, RunContext};
use crate::commands::{format_command, resolve_external_command};
use crate::errors::Result;
use crate::exec::FilemodInput;
use crate::patterns::{PathSource, resolve_patterns};

pub(crate) async fn run_filemod(
    ctx: &RunContext,
    codemod: &Codemod,
    flow: &FlowSettings,
    sink: &mut dyn CommandSink,
) -> Result<()> {
    let filemod = ctx.backend.filemod(codemod).map_err(|e| backend_error(codemod, e))?;
    let declared = filemod.include_patterns();

    let resolved = resolve_patterns(codemod, &flow.patterns, Some(declared.as_slice()))?;
    announce(ctx, codemod, flow, &resolved);

    let source = PathSource::from_selection(Arc::clone(&ctx.fs), &flow.target, &resolved.selection)?;
    let skipped = source.skipped_dirs();
    let paths = source.collect().await;
    warn_skipped_dirs(ctx, codemod, &skipped);
    if paths.is_empty() {
        warn_no_files(ctx, codemod);
        return Ok(());
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        match ctx.fs.read_to_string(path) {
            Ok(data) => files.push((path.clone(), data)),
            Err(err) => ctx.events.on_codemod_error(CodemodExecutionError {
                codemod_name: codemod.name.clone(),
                file_path: Some(path.clone()),
                message: format!("{err:#}"),
            }),
        }
    }
    debug!(codemod = %codemod.name, files = files.len(), "running filemod");

    let output = filemod
        .execute(FilemodInput {
            target: flow.target.clone(),
            files,
            arguments: Arc::clone(&ctx.arguments),
        })
        .await
        .map_err(|e| backend_error(codemod, e))?;

    for (file_path, message) in output.errors {
        ctx.events.on_codemod_error(CodemodExecutionError {
            codemod_name: codemod.name.clone(),
            file_path,
            message,
        });
    }

    for external in output.commands {
        let command = resolve_external_command(ctx.fs.as_ref(), external)?;
        if let Some(formatted) = format_command(command) {
            sink.accept(formatted).await?;
        }
    }

    ctx.events.on_message(PrinterMessage::Progress {
        codemod_name: codemod.name.clone(),
        processed_file_number: paths.len(),
        total_file_number: paths.len(),
        processed_file_name: None,
    });

    info!(
        target: "codemod_runner::telemetry",
        codemod = %codemod.name,
        engine = %codemod.kind(),
        files = paths.len(),
        "codemod executed"
    );
    Ok(())
}
