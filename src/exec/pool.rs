// src/exec/pool.rs

//! Worker pool coordinator for per-file transforms.
//!
//! The coordinator runs on the caller's task and owns a `JoinSet` of at most
//! `threads` workers. It pulls a new path from the [`PathSource`] only when a
//! worker slot is free, forwards each worker's commands to the sink in
//! completion order, and reports progress after every file.
//!
//! If no worker reports back within the idle timeout, every worker is
//! aborted and the run is treated as finished.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::backend::{FileTransform, TransformInput};
use crate::commands::{FormattedFileCommand, format_commands};
use crate::engine::{CodemodExecutionError, CommandSink, EventSink, PrinterMessage};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::patterns::PathSource;
use crate::types::{ArgumentRecord, EngineKind};

/// What a finished pool run looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOutcome {
    pub processed: usize,
    pub total: usize,
    pub timed_out: bool,
}

struct WorkerReport {
    path: PathBuf,
    result: anyhow::Result<Vec<FormattedFileCommand>>,
}

pub struct WorkerPool {
    pub threads: usize,
    pub idle_timeout: Duration,
    pub fs: Arc<dyn FileSystem>,
    pub transform: Arc<dyn FileTransform>,
    pub codemod_name: String,
    pub engine: EngineKind,
    pub arguments: Arc<ArgumentRecord>,
    pub events: Arc<dyn EventSink>,
}

impl WorkerPool {
    pub async fn run(self, mut source: PathSource, sink: &mut dyn CommandSink) -> Result<PoolOutcome> {
        let threads = self.threads.max(1);
        let mut workers: JoinSet<WorkerReport> = JoinSet::new();
        let mut exhausted = false;
        let mut outcome = PoolOutcome {
            processed: 0,
            total: 0,
            timed_out: false,
        };

        info!(
            codemod = %self.codemod_name,
            engine = %self.engine,
            threads,
            "worker pool started"
        );

        loop {
            while !exhausted && workers.len() < threads {
                match source.next().await {
                    Some(path) => {
                        outcome.total += 1;
                        self.spawn_worker(&mut workers, path);
                    }
                    None => exhausted = true,
                }
            }

            if workers.is_empty() {
                break;
            }

            let joined = match tokio::time::timeout(self.idle_timeout, workers.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        codemod = %self.codemod_name,
                        idle_secs = self.idle_timeout.as_secs(),
                        in_flight = workers.len(),
                        "workers idle for too long; terminating"
                    );
                    workers.abort_all();
                    outcome.timed_out = true;
                    break;
                }
            };

            outcome.processed += 1;
            let processed_file_name = match joined {
                Ok(WorkerReport { path, result: Ok(commands) }) => {
                    debug!(path = ?path, commands = commands.len(), "file transformed");
                    for command in commands {
                        sink.accept(command).await?;
                    }
                    Some(path)
                }
                Ok(WorkerReport { path, result: Err(err) }) => {
                    self.events.on_codemod_error(CodemodExecutionError {
                        codemod_name: self.codemod_name.clone(),
                        file_path: Some(path.clone()),
                        message: format!("{err:#}"),
                    });
                    Some(path)
                }
                Err(join_err) => {
                    self.events.on_codemod_error(CodemodExecutionError {
                        codemod_name: self.codemod_name.clone(),
                        file_path: None,
                        message: format!("worker failed: {join_err}"),
                    });
                    None
                }
            };

            self.events.on_message(PrinterMessage::Progress {
                codemod_name: self.codemod_name.clone(),
                processed_file_number: outcome.processed,
                total_file_number: outcome.total,
                processed_file_name,
            });
        }

        info!(
            codemod = %self.codemod_name,
            processed = outcome.processed,
            total = outcome.total,
            timed_out = outcome.timed_out,
            "worker pool finished"
        );
        Ok(outcome)
    }

    fn spawn_worker(&self, workers: &mut JoinSet<WorkerReport>, path: PathBuf) {
        let fs = Arc::clone(&self.fs);
        let transform = Arc::clone(&self.transform);
        let arguments = Arc::clone(&self.arguments);

        workers.spawn(async move {
            let result = async {
                let data = fs.read_to_string(&path)?;
                let commands = transform
                    .transform(TransformInput {
                        path: path.clone(),
                        data,
                        arguments,
                    })
                    .await?;
                Ok::<_, anyhow::Error>(format_commands(commands))
            }
            .await;
            WorkerReport { path, result }
        });
    }
}
