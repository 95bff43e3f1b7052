// src/case/mod.rs

//! Case/Job binary log.
//!
//! A log is `preamble · case frame · job frame* · postamble`. Every frame
//! carries a ripemd160 digest of its own payload, and the postamble carries a
//! digest over every framed byte in between, so a reader tailing a growing
//! file can stop at the last complete frame without ever accepting a torn or
//! tampered record.
//!
//! - [`encode`] serialises frames and owns the single-writer [`CaseWriter`].
//! - [`decode`] is the byte-count driven state machine.
//! - [`ring`] is the bounded buffer between a byte source and the decoder.
//! - [`reader`] tails a log file on disk using `notify`.
//! - [`jobs`] turns file commands into jobs.

pub mod decode;
pub mod encode;
pub mod jobs;
pub mod reader;
pub mod ring;

use ripemd::{Digest, Ripemd160};

use crate::errors::{Result, RunnerError};
use crate::types::ArgumentRecord;

pub use decode::{CaseDecoder, DecodeEvent, DecodedLog, DecoderState, StreamDecoder, decode_all};
pub use encode::{CaseWriter, serialize_case, serialize_job, serialize_postamble, serialize_preamble};
pub use jobs::{JobBuilder, codemod_hash_digest, derive_case_hash_digest};
pub use reader::{CaseEvent, CaseReaderHandle, ReaderOptions, spawn_case_reader};
pub use ring::{DEFAULT_RING_CAPACITY, RingBuffer};

pub const PREAMBLE_MAGIC: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];
pub const VERSION: [u8; 4] = [1, 0, 0, 0];
pub const CASE_MAGIC: [u8; 4] = [0xA1, 0xB1, 0xC1, 0xD1];
pub const JOB_MAGIC: [u8; 4] = [0xA2, 0xB2, 0xC2, 0xD2];
pub const POSTAMBLE_MAGIC: [u8; 4] = [0xDD, 0xCC, 0xBB, 0xAA];

pub const DIGEST_LEN: usize = 20;

/// Longest string field (path, URI, argument record) the encoder accepts.
pub const MAX_FIELD_BYTE_LENGTH: usize = 16 * 1024 - 1;

/// 20-byte ripemd160 digest.
pub type HashDigest = [u8; DIGEST_LEN];

pub fn hash_digest(bytes: &[u8]) -> HashDigest {
    let mut hasher = Ripemd160::new();
    hasher.update(bytes);
    finalize(hasher)
}

pub(crate) fn finalize(hasher: Ripemd160) -> HashDigest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Per-run metadata, always the first record of a log.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub case_hash_digest: HashDigest,
    pub codemod_hash_digest: HashDigest,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub absolute_target_path: String,
    pub argument_record: ArgumentRecord,
}

/// Wire value of the job kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobKind {
    CreateFile = 1,
    UpdateFile = 2,
    MoveFile = 3,
    MoveAndUpdateFile = 4,
    DeleteFile = 5,
    CopyFile = 6,
}

impl JobKind {
    /// Number of length-prefixed URI fields following the kind byte.
    pub fn uri_count(self) -> usize {
        match self {
            JobKind::CreateFile | JobKind::UpdateFile | JobKind::MoveFile | JobKind::CopyFile => 2,
            JobKind::MoveAndUpdateFile => 3,
            JobKind::DeleteFile => 1,
        }
    }
}

impl TryFrom<u8> for JobKind {
    type Error = RunnerError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(JobKind::CreateFile),
            2 => Ok(JobKind::UpdateFile),
            3 => Ok(JobKind::MoveFile),
            4 => Ok(JobKind::MoveAndUpdateFile),
            5 => Ok(JobKind::DeleteFile),
            6 => Ok(JobKind::CopyFile),
            other => Err(RunnerError::Framing(format!("unrecognized job kind byte {other:#04x}"))),
        }
    }
}

/// Kind-specific URIs of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    CreateFile { path_uri: String, data_uri: String },
    UpdateFile { path_uri: String, new_data_uri: String },
    MoveFile { old_path_uri: String, new_path_uri: String },
    MoveAndUpdateFile { old_path_uri: String, new_path_uri: String, new_data_uri: String },
    DeleteFile { path_uri: String },
    CopyFile { source_path_uri: String, target_path_uri: String },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::CreateFile { .. } => JobKind::CreateFile,
            JobPayload::UpdateFile { .. } => JobKind::UpdateFile,
            JobPayload::MoveFile { .. } => JobKind::MoveFile,
            JobPayload::MoveAndUpdateFile { .. } => JobKind::MoveAndUpdateFile,
            JobPayload::DeleteFile { .. } => JobKind::DeleteFile,
            JobPayload::CopyFile { .. } => JobKind::CopyFile,
        }
    }

    /// URIs in wire order.
    pub fn uris(&self) -> Vec<&str> {
        match self {
            JobPayload::CreateFile { path_uri, data_uri } => vec![path_uri.as_str(), data_uri.as_str()],
            JobPayload::UpdateFile { path_uri, new_data_uri } => {
                vec![path_uri.as_str(), new_data_uri.as_str()]
            }
            JobPayload::MoveFile { old_path_uri, new_path_uri } => {
                vec![old_path_uri.as_str(), new_path_uri.as_str()]
            }
            JobPayload::MoveAndUpdateFile {
                old_path_uri,
                new_path_uri,
                new_data_uri,
            } => vec![old_path_uri.as_str(), new_path_uri.as_str(), new_data_uri.as_str()],
            JobPayload::DeleteFile { path_uri } => vec![path_uri.as_str()],
            JobPayload::CopyFile {
                source_path_uri,
                target_path_uri,
            } => vec![source_path_uri.as_str(), target_path_uri.as_str()],
        }
    }

    /// Rebuild a payload from `kind.uri_count()` URIs in wire order.
    pub(crate) fn from_uris(kind: JobKind, uris: Vec<String>) -> Result<Self> {
        if uris.len() != kind.uri_count() {
            return Err(RunnerError::Framing(format!(
                "job kind {kind:?} expects {} URI fields, got {}",
                kind.uri_count(),
                uris.len()
            )));
        }
        let mut it = uris.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Ok(match kind {
            JobKind::CreateFile => JobPayload::CreateFile {
                path_uri: next(),
                data_uri: next(),
            },
            JobKind::UpdateFile => JobPayload::UpdateFile {
                path_uri: next(),
                new_data_uri: next(),
            },
            JobKind::MoveFile => JobPayload::MoveFile {
                old_path_uri: next(),
                new_path_uri: next(),
            },
            JobKind::MoveAndUpdateFile => JobPayload::MoveAndUpdateFile {
                old_path_uri: next(),
                new_path_uri: next(),
                new_data_uri: next(),
            },
            JobKind::DeleteFile => JobPayload::DeleteFile { path_uri: next() },
            JobKind::CopyFile => JobPayload::CopyFile {
                source_path_uri: next(),
                target_path_uri: next(),
            },
        })
    }
}

/// One logged file mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_hash_digest: HashDigest,
    pub payload: JobPayload,
}

impl Job {
    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }
}
