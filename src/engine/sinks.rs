// src/engine/sinks.rs

//! Production sinks.
//!
//! - [`TracingEventSink`] renders orchestrator events as tracing records.
//! - [`CaseLogSink`] appends one Job frame per command to a case log.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, error, info, warn};

use super::{CodemodExecutionError, CommandSink, ConsoleKind, EventSink, PrinterMessage, RunResult};
use crate::case::{CaseWriter, JobBuilder};
use crate::commands::FormattedFileCommand;
use crate::errors::Result;

/// Logs every event; counts transform errors for the final summary.
#[derive(Debug, Default)]
pub struct TracingEventSink {
    errors: AtomicUsize,
}

impl TracingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

impl EventSink for TracingEventSink {
    fn on_message(&self, message: PrinterMessage) {
        match message {
            PrinterMessage::Progress {
                codemod_name,
                processed_file_number,
                total_file_number,
                processed_file_name,
            } => debug!(
                codemod = %codemod_name,
                processed = processed_file_number,
                total = total_file_number,
                path = ?processed_file_name,
                "progress"
            ),
            PrinterMessage::Console { kind, message } => match kind {
                ConsoleKind::Info => info!("{message}"),
                ConsoleKind::Warn => warn!("{message}"),
                ConsoleKind::Error => error!("{message}"),
            },
            PrinterMessage::Finish => info!("run finished"),
        }
    }

    fn on_codemod_error(&self, error: CodemodExecutionError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            codemod = %error.codemod_name,
            path = ?error.file_path,
            "transform failed: {}",
            error.message
        );
    }

    fn on_success(&self, result: RunResult) {
        info!(
            codemod = %result.codemod_name,
            commands = result.commands,
            "codemod completed"
        );
    }
}

/// Writes each command as a Job frame right after it is emitted.
pub struct CaseLogSink<W: Write + Send> {
    writer: CaseWriter<W>,
    builder: JobBuilder,
}

impl<W: Write + Send> CaseLogSink<W> {
    /// `writer` must already hold the Case.
    pub fn new(writer: CaseWriter<W>, builder: JobBuilder) -> Self {
        Self { writer, builder }
    }

    pub fn jobs_written(&self) -> usize {
        self.writer.jobs_written()
    }

    /// Write the postamble.
    pub fn finish(self) -> Result<W> {
        self.writer.finish()
    }
}

impl<W: Write + Send> CommandSink for CaseLogSink<W> {
    fn accept(
        &mut self,
        command: FormattedFileCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let result = self
            .builder
            .build(&command)
            .and_then(|job| self.writer.write_job(&job));
        Box::pin(async move { result })
    }
}
