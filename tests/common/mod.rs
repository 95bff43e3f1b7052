#![allow(dead_code)]

use std::sync::Arc;

use codemod_runner::case::{Case, CaseWriter, HashDigest, Job, JobPayload};
use codemod_runner::engine::RunContext;
use codemod_runner::fs::FileSystem;
use codemod_runner::types::{ArgumentRecord, ArgumentValue};
use codemod_runner_test_utils::fake_backend::FakeBackend;
use codemod_runner_test_utils::recording::RecordingEventSink;

pub fn sample_case() -> Case {
    let mut argument_record = ArgumentRecord::new();
    argument_record.insert("quote".to_string(), ArgumentValue::from("single"));
    argument_record.insert("strict".to_string(), ArgumentValue::from(true));

    Case {
        case_hash_digest: [0x11; 20],
        codemod_hash_digest: [0x22; 20],
        created_at: 1_700_000_000_000,
        absolute_target_path: "/work/repo".to_string(),
        argument_record,
    }
}

pub fn sample_job(index: u8) -> Job {
    let digest: HashDigest = [index; 20];
    let payload = match index % 3 {
        0 => JobPayload::UpdateFile {
            path_uri: format!("/work/repo/src/{index}.ts"),
            new_data_uri: format!("/out/{index}.ts"),
        },
        1 => JobPayload::DeleteFile {
            path_uri: format!("/work/repo/src/{index}.ts"),
        },
        _ => JobPayload::MoveAndUpdateFile {
            old_path_uri: format!("/work/repo/src/{index}.ts"),
            new_path_uri: format!("/work/repo/lib/{index}.ts"),
            new_data_uri: format!("/out/{index}.ts"),
        },
    };
    Job {
        job_hash_digest: digest,
        payload,
    }
}

/// A complete log holding `case` and `jobs`.
pub fn encode_log(case: &Case, jobs: &[Job]) -> Vec<u8> {
    let mut writer = CaseWriter::new(Vec::new()).unwrap();
    writer.write_case(case).unwrap();
    for job in jobs {
        writer.write_job(job).unwrap();
    }
    writer.finish().unwrap()
}

pub struct Harness {
    pub ctx: RunContext,
    pub backend: Arc<FakeBackend>,
    pub events: Arc<RecordingEventSink>,
}

pub fn harness(fs: Arc<dyn FileSystem>, backend: FakeBackend) -> Harness {
    harness_with_arguments(fs, backend, ArgumentRecord::new())
}

pub fn harness_with_arguments(
    fs: Arc<dyn FileSystem>,
    backend: FakeBackend,
    arguments: ArgumentRecord,
) -> Harness {
    let backend = Arc::new(backend);
    let events = Arc::new(RecordingEventSink::new());
    let ctx = RunContext::new(fs, backend.clone(), events.clone(), arguments);
    Harness { ctx, backend, events }
}
