// tests/codec_property.rs

mod common;

use proptest::prelude::*;

use codemod_runner::case::{
    Case, DecodeEvent, Job, JobPayload, StreamDecoder, decode_all,
};
use codemod_runner::types::{ArgumentRecord, ArgumentValue};

use common::encode_log;

fn uri() -> impl Strategy<Value = String> {
    "/[a-z]{1,8}(/[a-zA-Z0-9_.-]{1,12}){0,4}"
}

fn payload() -> impl Strategy<Value = JobPayload> {
    prop_oneof![
        (uri(), uri()).prop_map(|(path_uri, data_uri)| JobPayload::CreateFile { path_uri, data_uri }),
        (uri(), uri()).prop_map(|(path_uri, new_data_uri)| JobPayload::UpdateFile {
            path_uri,
            new_data_uri
        }),
        (uri(), uri()).prop_map(|(old_path_uri, new_path_uri)| JobPayload::MoveFile {
            old_path_uri,
            new_path_uri
        }),
        (uri(), uri(), uri()).prop_map(|(old_path_uri, new_path_uri, new_data_uri)| {
            JobPayload::MoveAndUpdateFile {
                old_path_uri,
                new_path_uri,
                new_data_uri,
            }
        }),
        uri().prop_map(|path_uri| JobPayload::DeleteFile { path_uri }),
        (uri(), uri()).prop_map(|(source_path_uri, target_path_uri)| JobPayload::CopyFile {
            source_path_uri,
            target_path_uri
        }),
    ]
}

fn job() -> impl Strategy<Value = Job> {
    (any::<[u8; 20]>(), payload()).prop_map(|(job_hash_digest, payload)| Job {
        job_hash_digest,
        payload,
    })
}

fn argument_value() -> impl Strategy<Value = ArgumentValue> {
    prop_oneof![
        any::<bool>().prop_map(ArgumentValue::from),
        any::<i64>().prop_map(ArgumentValue::from),
        "[a-z ]{0,16}".prop_map(|s| ArgumentValue::from(s.as_str())),
    ]
}

fn case() -> impl Strategy<Value = Case> {
    (
        any::<[u8; 20]>(),
        any::<[u8; 20]>(),
        any::<i64>(),
        uri(),
        proptest::collection::btree_map("[a-zA-Z]{1,8}", argument_value(), 0..4),
    )
        .prop_map(
            |(case_hash_digest, codemod_hash_digest, created_at, absolute_target_path, args)| Case {
                case_hash_digest,
                codemod_hash_digest,
                created_at,
                absolute_target_path,
                argument_record: args.into_iter().collect::<ArgumentRecord>(),
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn logs_round_trip(case in case(), jobs in proptest::collection::vec(job(), 0..12)) {
        let bytes = encode_log(&case, &jobs);

        let log = decode_all(&bytes).unwrap();

        prop_assert_eq!(log.case, case);
        prop_assert_eq!(log.jobs, jobs);
    }

    #[test]
    fn chunking_does_not_change_the_events(
        case in case(),
        jobs in proptest::collection::vec(job(), 0..6),
        chunk in 1usize..97,
    ) {
        let bytes = encode_log(&case, &jobs);

        let mut stream = StreamDecoder::new();
        let mut events = Vec::new();
        for piece in bytes.chunks(chunk) {
            events.extend(stream.feed(piece).unwrap());
        }
        prop_assert!(stream.close().is_ok());

        let mut expected = vec![DecodeEvent::Case(case)];
        expected.extend(jobs.into_iter().map(DecodeEvent::Job));
        expected.push(DecodeEvent::Finish);
        prop_assert_eq!(events, expected);
    }

    #[test]
    fn any_single_bit_flip_is_detected(
        case in case(),
        jobs in proptest::collection::vec(job(), 0..4),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut bytes = encode_log(&case, &jobs);
        let at = position.index(bytes.len());
        bytes[at] ^= 1 << bit;

        prop_assert!(decode_all(&bytes).is_err());
    }
}
