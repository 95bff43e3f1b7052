// tests/case_reader.rs

mod common;

use std::fs::File;
use std::time::Duration;

use codemod_runner::case::{CaseEvent, CaseWriter, ReaderOptions, spawn_case_reader};
use codemod_runner::errors::RunnerError;
use codemod_runner_test_utils::{init_tracing, with_timeout};

use common::{encode_log, sample_case, sample_job};

fn options(follow: bool) -> ReaderOptions {
    ReaderOptions {
        follow,
        poll_interval: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn complete_log_is_read_to_finish() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.data");
    std::fs::write(&path, encode_log(&sample_case(), &[sample_job(0), sample_job(1)])).unwrap();

    let mut reader = spawn_case_reader(&path, options(false));

    with_timeout(async {
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Case(c)) if c == sample_case()));
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Job(j)) if j == sample_job(0)));
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Job(j)) if j == sample_job(1)));
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Finish)));
        assert!(reader.next_event().await.is_none());
    })
    .await;
}

#[tokio::test]
async fn following_picks_up_appended_jobs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.data");

    let mut writer = CaseWriter::new(File::create(&path).unwrap()).unwrap();
    writer.write_case(&sample_case()).unwrap();

    let mut reader = spawn_case_reader(&path, options(true));

    with_timeout(async {
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Case(_))));

        writer.write_job(&sample_job(3)).unwrap();
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Job(j)) if j == sample_job(3)));

        writer.write_job(&sample_job(4)).unwrap();
        writer.finish().unwrap();
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Job(j)) if j == sample_job(4)));
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Finish)));
    })
    .await;
}

#[tokio::test]
async fn closing_an_incomplete_log_reports_truncation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.data");

    let mut writer = CaseWriter::new(File::create(&path).unwrap()).unwrap();
    writer.write_case(&sample_case()).unwrap();

    let mut reader = spawn_case_reader(&path, options(true));

    with_timeout(async {
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Case(_))));
        reader.close();
        assert!(matches!(
            reader.next_event().await,
            Some(CaseEvent::Error(RunnerError::Truncated(_)))
        ));
        assert!(reader.next_event().await.is_none());
    })
    .await;
}

#[tokio::test]
async fn partial_log_without_follow_is_truncated() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.data");
    let bytes = encode_log(&sample_case(), &[sample_job(0)]);
    std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    let mut reader = spawn_case_reader(&path, options(false));

    with_timeout(async {
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Case(_))));
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Job(_))));
        match reader.next_event().await {
            Some(CaseEvent::Error(err)) => {
                assert!(matches!(err, RunnerError::Truncated(_)));
                assert!(err.is_reader_fatal());
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    })
    .await;
}

#[tokio::test]
async fn tampered_log_stops_with_an_integrity_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.data");
    let mut bytes = encode_log(&sample_case(), &[sample_job(0)]);
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = spawn_case_reader(&path, options(false));

    with_timeout(async {
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Case(_))));
        assert!(matches!(reader.next_event().await, Some(CaseEvent::Job(_))));
        assert!(matches!(
            reader.next_event().await,
            Some(CaseEvent::Error(RunnerError::Integrity(_)))
        ));
    })
    .await;
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = spawn_case_reader(dir.path().join("absent.data"), options(false));

    with_timeout(async {
        assert!(matches!(
            reader.next_event().await,
            Some(CaseEvent::Error(RunnerError::IoError(_)))
        ));
    })
    .await;
}
