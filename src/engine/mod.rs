// src/engine/mod.rs

//! Execution orchestrator.
//!
//! Turns a [`Codemod`] into an ordered stream of [`FormattedFileCommand`]s.
//!
//! - [`runner`] validates the codemod tree and dispatches on the engine.
//! - [`recipe`] runs multi-step recipes, live or as a whole-recipe dry run.
//! - [`diff`] computes the net effect of a dry run from two snapshots.
//! - [`filemod`] runs single-pass filemods.
//! - [`sinks`] holds the command and event sinks used in production.
//!
//! Nothing here reads ambient state: the filesystem, the engine backend, the
//! event sink and the argument record all travel in a [`RunContext`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::case::HashDigest;
use crate::commands::FormattedFileCommand;
use crate::errors::{Result, RunnerError};
use crate::exec::EngineBackend;
use crate::fs::FileSystem;
use crate::patterns::FlowPatterns;
use crate::types::{ArgumentRecord, EngineKind};

pub mod diff;
pub mod filemod;
pub mod recipe;
pub mod runner;
pub mod sinks;

pub use runner::{ensure_supported, run_codemod};
pub use sinks::{CaseLogSink, TracingEventSink};

/// Deepest recipe nesting the orchestrator will evaluate.
pub const MAX_RECIPE_DEPTH: usize = 16;

/// Default worker idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Closed set of engines with their engine-specific settings.
#[derive(Debug, Clone, PartialEq)]
pub enum Engine {
    /// Per-file transform (`jscodeshift`, `ts-morph`).
    JsTransform { source: PathBuf, include: Vec<String> },
    /// Whole-tree transform run once over every matched path.
    Filemod { source: PathBuf, include: Vec<String> },
    /// Per-file rule application; files come from the rule language.
    AstGrep { source: PathBuf, language: String },
    /// Ordered sub-codemods. Never executes directly.
    Recipe { include: Vec<String>, steps: Vec<Codemod> },
    /// Recognised but not runnable.
    Unsupported { engine: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Codemod {
    pub name: String,
    pub engine: Engine,
}

impl Codemod {
    pub fn kind(&self) -> EngineKind {
        match self.engine {
            Engine::JsTransform { .. } => EngineKind::JsTransform,
            Engine::Filemod { .. } => EngineKind::Filemod,
            Engine::AstGrep { .. } => EngineKind::AstGrep,
            Engine::Recipe { .. } => EngineKind::Recipe,
            Engine::Unsupported { .. } => EngineKind::Unsupported,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        match &self.engine {
            Engine::JsTransform { source, .. }
            | Engine::Filemod { source, .. }
            | Engine::AstGrep { source, .. } => Some(source),
            Engine::Recipe { .. } | Engine::Unsupported { .. } => None,
        }
    }

    /// Include patterns declared by the codemod itself.
    pub fn include(&self) -> &[String] {
        match &self.engine {
            Engine::JsTransform { include, .. }
            | Engine::Filemod { include, .. }
            | Engine::Recipe { include, .. } => include,
            Engine::AstGrep { .. } | Engine::Unsupported { .. } => &[],
        }
    }

    /// Stable identity used for the codemod hash digest.
    pub fn identity(&self) -> String {
        match self.source() {
            Some(source) => source.to_string_lossy().into_owned(),
            None => self.name.clone(),
        }
    }
}

/// Where and on what a codemod runs.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub target: PathBuf,
    pub patterns: FlowPatterns,
    pub threads: usize,
    pub idle_timeout: Duration,
}

impl FlowSettings {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            patterns: FlowPatterns::default(),
            threads: default_threads(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub dry_run: bool,
    pub case_hash_digest: HashDigest,
}

/// Explicit context threaded through every orchestrator call.
#[derive(Clone)]
pub struct RunContext {
    pub fs: Arc<dyn FileSystem>,
    pub backend: Arc<dyn EngineBackend>,
    pub events: Arc<dyn EventSink>,
    pub arguments: Arc<ArgumentRecord>,
    depth: usize,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("fs", &self.fs)
            .field("arguments", &self.arguments)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        backend: Arc<dyn EngineBackend>,
        events: Arc<dyn EventSink>,
        arguments: ArgumentRecord,
    ) -> Self {
        Self {
            fs,
            backend,
            events,
            arguments: Arc::new(arguments),
            depth: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Context for one level deeper in a recipe tree.
    pub fn nested(&self) -> Result<Self> {
        if self.depth >= MAX_RECIPE_DEPTH {
            return Err(RunnerError::ConfigError(format!(
                "recipes nest deeper than {MAX_RECIPE_DEPTH} levels"
            )));
        }
        Ok(Self {
            depth: self.depth + 1,
            ..self.clone()
        })
    }

    pub fn with_fs(&self, fs: Arc<dyn FileSystem>) -> Self {
        Self { fs, ..self.clone() }
    }

    pub fn with_events(&self, events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKind {
    Info,
    Warn,
    Error,
}

/// Messages for whatever presents the run to a human.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterMessage {
    Progress {
        codemod_name: String,
        processed_file_number: usize,
        total_file_number: usize,
        processed_file_name: Option<PathBuf>,
    },
    Console {
        kind: ConsoleKind,
        message: String,
    },
    Finish,
}

impl PrinterMessage {
    pub fn info(message: impl Into<String>) -> Self {
        PrinterMessage::Console {
            kind: ConsoleKind::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        PrinterMessage::Console {
            kind: ConsoleKind::Warn,
            message: message.into(),
        }
    }
}

/// A transform failure attributed to a codemod and, usually, a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CodemodExecutionError {
    pub codemod_name: String,
    pub file_path: Option<PathBuf>,
    pub message: String,
}

impl From<CodemodExecutionError> for RunnerError {
    fn from(e: CodemodExecutionError) -> Self {
        RunnerError::Transform {
            codemod: e.codemod_name,
            path: e.file_path,
            message: e.message,
        }
    }
}

/// Reported once a codemod (or a whole recipe) completed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub codemod_name: String,
    pub commands: usize,
}

/// Progress, console, error and success callbacks.
pub trait EventSink: Send + Sync {
    fn on_message(&self, message: PrinterMessage);
    fn on_codemod_error(&self, error: CodemodExecutionError);
    fn on_success(&self, _result: RunResult) {}
}

/// Receives commands in emission order.
///
/// Implemented for `Vec` (collect everything) and `mpsc::Sender` (stream to
/// another task); production adds the log writer in [`sinks`].
pub trait CommandSink: Send {
    fn accept(
        &mut self,
        command: FormattedFileCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl CommandSink for Vec<FormattedFileCommand> {
    fn accept(
        &mut self,
        command: FormattedFileCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.push(command);
        Box::pin(async { Ok(()) })
    }
}

impl CommandSink for mpsc::Sender<FormattedFileCommand> {
    fn accept(
        &mut self,
        command: FormattedFileCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.clone();
        Box::pin(async move {
            tx.send(command)
                .await
                .map_err(|_| RunnerError::Other(anyhow::anyhow!("command receiver dropped")))
        })
    }
}
