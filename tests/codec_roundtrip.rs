// tests/codec_roundtrip.rs

mod common;

use codemod_runner::case::{
    CASE_MAGIC, CaseWriter, DecodeEvent, JOB_MAGIC, Job, JobPayload, MAX_FIELD_BYTE_LENGTH,
    StreamDecoder, decode_all, hash_digest, serialize_case, serialize_job, serialize_preamble,
};
use codemod_runner::errors::RunnerError;

use common::{encode_log, sample_case, sample_job};

#[test]
fn case_without_jobs_round_trips() {
    let bytes = encode_log(&sample_case(), &[]);

    let log = decode_all(&bytes).unwrap();

    assert_eq!(log.case, sample_case());
    assert!(log.jobs.is_empty());
}

#[test]
fn changing_the_last_postamble_byte_fails() {
    let mut bytes = encode_log(&sample_case(), &[]);
    let last = bytes.len() - 1;
    bytes[last] = bytes[last].wrapping_add(1);

    assert!(matches!(decode_all(&bytes), Err(RunnerError::Integrity(_))));
}

#[test]
fn jobs_come_back_in_write_order() {
    let jobs: Vec<Job> = (0..9).map(sample_job).collect();
    let bytes = encode_log(&sample_case(), &jobs);

    let log = decode_all(&bytes).unwrap();

    assert_eq!(log.jobs, jobs);
}

#[test]
fn every_job_kind_round_trips() {
    let payloads = vec![
        JobPayload::CreateFile {
            path_uri: "/r/new.ts".into(),
            data_uri: "/out/a.ts".into(),
        },
        JobPayload::UpdateFile {
            path_uri: "/r/a.ts".into(),
            new_data_uri: "/out/b.ts".into(),
        },
        JobPayload::MoveFile {
            old_path_uri: "/r/a.ts".into(),
            new_path_uri: "/r/b.ts".into(),
        },
        JobPayload::MoveAndUpdateFile {
            old_path_uri: "/r/a.ts".into(),
            new_path_uri: "/r/b.ts".into(),
            new_data_uri: "/out/c.ts".into(),
        },
        JobPayload::DeleteFile {
            path_uri: "/r/gone.ts".into(),
        },
        JobPayload::CopyFile {
            source_path_uri: "/r/a.ts".into(),
            target_path_uri: "/r/copy.ts".into(),
        },
    ];
    let jobs: Vec<Job> = payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| Job {
            job_hash_digest: [i as u8; 20],
            payload,
        })
        .collect();

    let log = decode_all(&encode_log(&sample_case(), &jobs)).unwrap();

    assert_eq!(log.jobs, jobs);
}

#[test]
fn tampered_job_fails_at_that_record() {
    let jobs: Vec<Job> = (0..3).map(sample_job).collect();
    let bytes = encode_log(&sample_case(), &jobs);

    // Locate the second job frame and flip a bit inside its payload.
    let first_job = find(&bytes, &JOB_MAGIC, 0);
    let second_job = find(&bytes, &JOB_MAGIC, first_job + 4);
    let mut tampered = bytes.clone();
    tampered[second_job + 30] ^= 0x01;

    let mut stream = StreamDecoder::new();
    let before = stream.feed(&tampered[..second_job]).unwrap();
    let err = stream.feed(&tampered[second_job..]).unwrap_err();

    assert_eq!(
        before,
        vec![DecodeEvent::Case(sample_case()), DecodeEvent::Job(sample_job(0))]
    );
    assert!(matches!(err, RunnerError::Integrity(_)), "got {err:?}");
}

#[test]
fn bad_preamble_magic_is_a_framing_error() {
    let mut bytes = encode_log(&sample_case(), &[]);
    bytes[0] = 0x00;

    assert!(matches!(decode_all(&bytes), Err(RunnerError::Framing(_))));
}

#[test]
fn unknown_version_is_a_framing_error() {
    let mut bytes = encode_log(&sample_case(), &[]);
    bytes[4] = 2;

    assert!(matches!(decode_all(&bytes), Err(RunnerError::Framing(_))));
}

#[test]
fn unknown_job_kind_is_a_framing_error() {
    // A digest-correct job frame whose kind byte is 7.
    let mut payload = vec![0u8; 20];
    payload.push(7);
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.push(b'x');

    let mut bytes = serialize_preamble();
    bytes.extend(serialize_case(&sample_case()).unwrap());
    bytes.extend_from_slice(&JOB_MAGIC);
    bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&hash_digest(&payload));
    bytes.extend_from_slice(&payload);

    let err = StreamDecoder::new().feed(&bytes).unwrap_err();
    assert!(matches!(err, RunnerError::Framing(_)), "got {err:?}");
}

#[test]
fn case_magic_in_job_position_is_rejected() {
    let case_frame = serialize_case(&sample_case()).unwrap();
    assert_eq!(&case_frame[..4], &CASE_MAGIC);

    let mut bytes = serialize_preamble();
    bytes.extend(&case_frame);
    bytes.extend(&case_frame);

    assert!(matches!(
        StreamDecoder::new().feed(&bytes),
        Err(RunnerError::Framing(_))
    ));
}

#[test]
fn truncation_anywhere_is_reported_on_close() {
    let bytes = encode_log(&sample_case(), &[sample_job(1), sample_job(2)]);

    for cut in [0, 5, 8, 20, 40, bytes.len() - 21, bytes.len() - 1] {
        let mut stream = StreamDecoder::new();
        stream.feed(&bytes[..cut]).unwrap();
        assert!(
            matches!(stream.close(), Err(RunnerError::Truncated(_))),
            "cut at {cut} was not reported"
        );
    }
}

#[test]
fn bytes_after_the_postamble_are_rejected() {
    let mut bytes = encode_log(&sample_case(), &[]);
    bytes.push(0);

    assert!(matches!(decode_all(&bytes), Err(RunnerError::Framing(_))));
}

#[test]
fn oversized_uri_is_rejected_by_the_encoder() {
    let job = Job {
        job_hash_digest: [0; 20],
        payload: JobPayload::DeleteFile {
            path_uri: "a".repeat(MAX_FIELD_BYTE_LENGTH + 1),
        },
    };

    assert!(matches!(
        serialize_job(&job),
        Err(RunnerError::FieldTooLong { field: "uri", .. })
    ));

    let ok = Job {
        job_hash_digest: [0; 20],
        payload: JobPayload::DeleteFile {
            path_uri: "a".repeat(MAX_FIELD_BYTE_LENGTH),
        },
    };
    assert!(serialize_job(&ok).is_ok());
}

#[test]
fn writer_refuses_out_of_order_records() {
    let mut writer = CaseWriter::new(Vec::new()).unwrap();
    assert!(writer.write_job(&sample_job(0)).is_err());

    writer.write_case(&sample_case()).unwrap();
    assert!(writer.write_case(&sample_case()).is_err());

    let bytes = writer.finish().unwrap();
    assert!(decode_all(&bytes).unwrap().jobs.is_empty());
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> usize {
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
        .expect("needle not found")
}
