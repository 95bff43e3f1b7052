// src/exec/mod.rs

//! Transform execution layer.
//!
//! - [`backend`] defines the `EngineBackend` seam and the compiled
//!   `FileTransform` / `Filemod` traits the orchestrator drives.
//! - [`command`] is the production backend, which runs codemod scripts with
//!   `tokio::process::Command`.
//! - [`pool`] is the worker pool coordinator for per-file transforms.

pub mod backend;
pub mod command;
pub mod pool;

pub use backend::{
    BoxFuture, EngineBackend, FileTransform, Filemod, FilemodInput, FilemodOutput, TransformInput,
};
pub use command::CommandBackend;
pub use pool::{PoolOutcome, WorkerPool};
