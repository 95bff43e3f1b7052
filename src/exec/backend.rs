// src/exec/backend.rs

//! Pluggable engine backend abstraction.
//!
//! The orchestrator never runs a transform itself. It asks an
//! [`EngineBackend`] for a compiled [`FileTransform`] or [`Filemod`] and
//! drives it. Production uses [`super::command::CommandBackend`], which runs
//! codemod scripts as child processes; tests provide in-process fakes.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;

use crate::commands::{ExternalFileCommand, FileCommand};
use crate::engine::Codemod;
use crate::types::ArgumentRecord;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One file handed to a per-file transform.
#[derive(Debug, Clone)]
pub struct TransformInput {
    pub path: PathBuf,
    pub data: String,
    pub arguments: Arc<ArgumentRecord>,
}

/// A per-file transform (JS engines, ast-grep).
pub trait FileTransform: Send + Sync {
    /// Transform a single file.
    ///
    /// An `Err` is attributed to this file only; sibling files keep running.
    fn transform(&self, input: TransformInput) -> BoxFuture<'_, Result<Vec<FileCommand>>>;
}

/// Everything a filemod sees in its single pass.
#[derive(Debug, Clone)]
pub struct FilemodInput {
    pub target: PathBuf,
    pub files: Vec<(PathBuf, String)>,
    pub arguments: Arc<ArgumentRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct FilemodOutput {
    pub commands: Vec<ExternalFileCommand>,
    /// Failures the filemod attributed to individual files.
    pub errors: Vec<(Option<PathBuf>, String)>,
}

pub trait Filemod: Send + Sync {
    /// Patterns the filemod declares for itself, used when neither the
    /// command line nor the manifest names any.
    fn include_patterns(&self) -> Vec<String>;

    fn execute(&self, input: FilemodInput) -> BoxFuture<'_, Result<FilemodOutput>>;
}

/// Compiles codemods into runnable transforms.
pub trait EngineBackend: Send + Sync {
    fn file_transform(&self, codemod: &Codemod) -> Result<Arc<dyn FileTransform>>;
    fn filemod(&self, codemod: &Codemod) -> Result<Arc<dyn Filemod>>;
}
