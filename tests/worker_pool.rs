// tests/worker_pool.rs

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use codemod_runner::commands::FormattedFileCommand;
use codemod_runner::exec::{FileTransform, WorkerPool};
use codemod_runner::fs::FileSystem;
use codemod_runner::patterns::PathSource;
use codemod_runner::types::{ArgumentRecord, EngineKind};
use codemod_runner_test_utils::fake_backend::{FnTransform, append, append_failing_on};
use codemod_runner_test_utils::recording::RecordingEventSink;
use codemod_runner_test_utils::{init_tracing, with_timeout};

fn tree(count: usize) -> (Arc<dyn FileSystem>, Vec<PathBuf>) {
    let fs = codemod_runner::fs::VirtualFileSystem::new();
    let mut paths = Vec::new();
    for i in 0..count {
        let path = PathBuf::from(format!("/repo/src/f{i:02}.ts"));
        fs.add_file(&path, format!("{i}"));
        paths.push(path);
    }
    (Arc::new(fs), paths)
}

fn pool(
    fs: Arc<dyn FileSystem>,
    transform: Arc<dyn FileTransform>,
    threads: usize,
    idle_timeout: Duration,
    events: Arc<RecordingEventSink>,
) -> WorkerPool {
    WorkerPool {
        threads,
        idle_timeout,
        fs,
        transform,
        codemod_name: "pool-test".to_string(),
        engine: EngineKind::JsTransform,
        arguments: Arc::new(ArgumentRecord::new()),
        events,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_file_is_processed_exactly_once_for_any_thread_count() {
    init_tracing();

    for threads in 1..=8 {
        let (fs, paths) = tree(20);
        let transform = append("!");
        let max_in_flight = transform.max_in_flight();
        let events = Arc::new(RecordingEventSink::new());
        let mut sink: Vec<FormattedFileCommand> = Vec::new();

        let outcome = with_timeout(
            pool(fs, Arc::new(transform), threads, Duration::from_secs(2), events.clone())
                .run(PathSource::from_paths(paths.clone()), &mut sink),
        )
        .await
        .unwrap();

        assert_eq!(outcome.processed, 20, "threads = {threads}");
        assert_eq!(outcome.total, 20);
        assert!(!outcome.timed_out);

        let touched: BTreeSet<PathBuf> = sink
            .iter()
            .filter_map(|c| c.old_path().map(|p| p.to_path_buf()))
            .collect();
        assert_eq!(sink.len(), 20);
        assert_eq!(touched, paths.iter().cloned().collect());
        assert!(max_in_flight.load(Ordering::SeqCst) <= threads);

        let progress = events.progress();
        assert_eq!(progress.len(), 20);
        assert_eq!(progress.last().map(|(_, done, _)| *done), Some(20));
    }
}

#[tokio::test]
async fn idle_workers_are_terminated() {
    init_tracing();
    let (fs, paths) = tree(3);
    let transform = append("!").slow_on("f01.ts", Duration::from_secs(30));
    let events = Arc::new(RecordingEventSink::new());
    let mut sink: Vec<FormattedFileCommand> = Vec::new();

    let outcome = with_timeout(
        pool(fs, Arc::new(transform), 1, Duration::from_millis(100), events.clone())
            .run(PathSource::from_paths(paths), &mut sink),
    )
    .await
    .unwrap();

    assert!(outcome.timed_out);
    assert_eq!(outcome.processed, 1);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn failures_are_attributed_to_their_file() {
    init_tracing();
    let (fs, mut paths) = tree(4);
    let bad = PathBuf::from("/repo/src/x.bad.ts");
    fs.write(&bad, b"?").unwrap();
    paths.push(bad.clone());

    let events = Arc::new(RecordingEventSink::new());
    let mut sink: Vec<FormattedFileCommand> = Vec::new();

    let outcome = with_timeout(
        pool(
            fs,
            Arc::new(append_failing_on("!", ".bad.ts")),
            3,
            Duration::from_secs(2),
            events.clone(),
        )
        .run(PathSource::from_paths(paths), &mut sink),
    )
    .await
    .unwrap();

    assert_eq!(outcome.processed, 5);
    assert_eq!(sink.len(), 4);
    let errors = events.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].file_path, Some(bad));
    assert_eq!(errors[0].codemod_name, "pool-test");
}

#[tokio::test]
async fn unreadable_files_are_reported_not_fatal() {
    init_tracing();
    let (fs, mut paths) = tree(2);
    paths.push(PathBuf::from("/repo/src/missing.ts"));

    let events = Arc::new(RecordingEventSink::new());
    let mut sink: Vec<FormattedFileCommand> = Vec::new();
    let transform: FnTransform = append("!");

    let outcome = with_timeout(
        pool(fs, Arc::new(transform), 2, Duration::from_secs(2), events.clone())
            .run(PathSource::from_paths(paths), &mut sink),
    )
    .await
    .unwrap();

    assert_eq!(outcome.processed, 3);
    assert_eq!(sink.len(), 2);
    assert_eq!(
        events.errors()[0].file_path,
        Some(PathBuf::from("/repo/src/missing.ts"))
    );
}

#[tokio::test]
async fn empty_source_finishes_immediately() {
    let (fs, _) = tree(0);
    let events = Arc::new(RecordingEventSink::new());
    let mut sink: Vec<FormattedFileCommand> = Vec::new();

    let outcome = with_timeout(
        pool(fs, Arc::new(append("!")), 4, Duration::from_secs(2), events.clone())
            .run(PathSource::from_paths(vec![]), &mut sink),
    )
    .await
    .unwrap();

    assert_eq!(outcome.processed, 0);
    assert!(!outcome.timed_out);
    assert!(events.progress().is_empty());
}
