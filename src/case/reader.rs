// src/case/reader.rs

//! Tailing reader for a log that may still be growing.
//!
//! The reader owns the file handle and a `notify` watcher. It reads whatever
//! is on disk (never more than the decoder's ring can take), then sleeps
//! until the file changes, the poll interval elapses or the caller closes
//! the source. The file handle and the watcher are released before the
//! terminal `Finish` or `Error` event is delivered.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::decode::{DecodeEvent, StreamDecoder};
use super::ring::DEFAULT_RING_CAPACITY;
use super::{Case, Job};
use crate::errors::{Result, RunnerError};

#[derive(Debug)]
pub enum CaseEvent {
    Case(Case),
    Job(Job),
    Finish,
    Error(RunnerError),
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Keep waiting for more bytes at end of file.
    pub follow: bool,
    /// Fallback re-read interval when no change notification arrives.
    pub poll_interval: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            follow: true,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Receiving end of a spawned reader.
pub struct CaseReaderHandle {
    events: mpsc::Receiver<CaseEvent>,
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for CaseReaderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseReaderHandle").finish_non_exhaustive()
    }
}

impl CaseReaderHandle {
    /// Next decoded event; `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<CaseEvent> {
        self.events.recv().await
    }

    /// Declare the source closed. An incomplete log then ends in
    /// `CaseEvent::Error(RunnerError::Truncated(_))`.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub fn spawn_case_reader(path: impl Into<PathBuf>, options: ReaderOptions) -> CaseReaderHandle {
    let path = path.into();
    let (tx, rx) = mpsc::channel::<CaseEvent>(64);
    let (close_tx, close_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let terminal = match tail(&path, &options, close_rx, &tx).await {
            Ok(()) => CaseEvent::Finish,
            Err(err) => {
                debug!(path = ?path, error = %err, "case reader stopped");
                CaseEvent::Error(err)
            }
        };
        let _ = tx.send(terminal).await;
    });

    CaseReaderHandle {
        events: rx,
        close_tx: Some(close_tx),
        task,
    }
}

/// Returns `Ok` only once the postamble verified.
async fn tail(
    path: &Path,
    options: &ReaderOptions,
    mut close_rx: oneshot::Receiver<()>,
    tx: &mpsc::Sender<CaseEvent>,
) -> Result<()> {
    let mut file = File::open(path).await?;
    let mut decoder = StreamDecoder::new();
    let mut buf = vec![0u8; DEFAULT_RING_CAPACITY];

    let (change_tx, mut change_rx) = mpsc::unbounded_channel::<Event>();
    let _watcher = if options.follow {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = change_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(anyhow::Error::from)?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(anyhow::Error::from)?;
        info!("tailing case log {:?}", path);
        Some(watcher)
    } else {
        None
    };

    loop {
        if read_available(&mut file, &mut decoder, &mut buf, tx).await? {
            return Ok(());
        }
        if !options.follow {
            return decoder.close();
        }

        tokio::select! {
            _ = &mut close_rx => {
                // Pick up anything written right before the close.
                if read_available(&mut file, &mut decoder, &mut buf, tx).await? {
                    return Ok(());
                }
                return decoder.close();
            }
            Some(event) = change_rx.recv() => {
                debug!(?event.kind, "case log changed");
            }
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }
}

/// Read up to end of file. Returns `true` once the postamble verified.
async fn read_available(
    file: &mut File,
    decoder: &mut StreamDecoder,
    buf: &mut [u8],
    tx: &mpsc::Sender<CaseEvent>,
) -> Result<bool> {
    loop {
        let limit = decoder.free_len().min(buf.len());
        let n = file.read(&mut buf[..limit]).await?;
        if n == 0 {
            return Ok(false);
        }
        for event in decoder.feed(&buf[..n])? {
            let event = match event {
                DecodeEvent::Case(case) => CaseEvent::Case(case),
                DecodeEvent::Job(job) => CaseEvent::Job(job),
                DecodeEvent::Finish => return Ok(true),
            };
            tx.send(event)
                .await
                .map_err(|_| RunnerError::Other(anyhow::anyhow!("case event receiver dropped")))?;
        }
    }
}
