// src/case/encode.rs

//! Frame serialisation and the single-writer log encoder.

use std::io::Write;

use ripemd::{Digest, Ripemd160};
use tracing::debug;

use super::{
    CASE_MAGIC, Case, HashDigest, JOB_MAGIC, Job, MAX_FIELD_BYTE_LENGTH, POSTAMBLE_MAGIC,
    PREAMBLE_MAGIC, VERSION, finalize, hash_digest,
};
use crate::errors::{Result, RunnerError};

pub fn serialize_preamble() -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&PREAMBLE_MAGIC);
    out.extend_from_slice(&VERSION);
    out
}

/// Full Case frame: header (magic, length, digest) followed by the payload.
pub fn serialize_case(case: &Case) -> Result<Vec<u8>> {
    let record = serde_json::to_vec(&case.argument_record)?;

    let mut payload = Vec::with_capacity(48 + 4 + case.absolute_target_path.len() + record.len());
    payload.extend_from_slice(&case.case_hash_digest);
    payload.extend_from_slice(&case.codemod_hash_digest);
    payload.extend_from_slice(&case.created_at.to_be_bytes());
    push_field(&mut payload, "absoluteTargetPath", case.absolute_target_path.as_bytes())?;
    push_field(&mut payload, "argumentRecord", &record)?;

    frame(CASE_MAGIC, &payload)
}

/// Full Job frame.
pub fn serialize_job(job: &Job) -> Result<Vec<u8>> {
    let uris = job.payload.uris();

    let mut payload = Vec::with_capacity(21 + uris.iter().map(|u| u.len() + 2).sum::<usize>());
    payload.extend_from_slice(&job.job_hash_digest);
    payload.push(job.kind() as u8);
    for uri in uris {
        push_field(&mut payload, "uri", uri.as_bytes())?;
    }

    frame(JOB_MAGIC, &payload)
}

pub fn serialize_postamble(digest: &HashDigest) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    out.extend_from_slice(&POSTAMBLE_MAGIC);
    out.extend_from_slice(digest);
    out
}

fn push_field(out: &mut Vec<u8>, field: &'static str, bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_FIELD_BYTE_LENGTH {
        return Err(RunnerError::FieldTooLong {
            field,
            len: bytes.len(),
            max: MAX_FIELD_BYTE_LENGTH,
        });
    }
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn frame(magic: [u8; 4], payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| {
        RunnerError::Framing(format!("payload of {} bytes does not fit a frame", payload.len()))
    })?;

    let mut out = Vec::with_capacity(26 + payload.len());
    out.extend_from_slice(&magic);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&hash_digest(payload));
    out.extend_from_slice(payload);
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterMode {
    AwaitingCase,
    AwaitingJobs,
    Ended,
}

/// Appends a log to `W`, one flushed frame at a time.
///
/// Readers may tail the destination while it is being written; every call
/// leaves the stream ending on a frame boundary.
pub struct CaseWriter<W: Write> {
    inner: W,
    hasher: Ripemd160,
    mode: WriterMode,
    jobs_written: usize,
}

impl<W: Write> CaseWriter<W> {
    /// Write the preamble and return a writer awaiting the Case.
    pub fn new(mut inner: W) -> Result<Self> {
        inner.write_all(&serialize_preamble())?;
        inner.flush()?;
        Ok(Self {
            inner,
            hasher: Ripemd160::new(),
            mode: WriterMode::AwaitingCase,
            jobs_written: 0,
        })
    }

    pub fn write_case(&mut self, case: &Case) -> Result<()> {
        if self.mode != WriterMode::AwaitingCase {
            return Err(RunnerError::Framing("the Case was already written".to_string()));
        }
        let bytes = serialize_case(case)?;
        self.write_frame(&bytes)?;
        self.mode = WriterMode::AwaitingJobs;
        debug!(target_path = %case.absolute_target_path, "case frame written");
        Ok(())
    }

    pub fn write_job(&mut self, job: &Job) -> Result<()> {
        match self.mode {
            WriterMode::AwaitingJobs => {}
            WriterMode::AwaitingCase => {
                return Err(RunnerError::Framing("a Job cannot precede the Case".to_string()));
            }
            WriterMode::Ended => {
                return Err(RunnerError::Framing("the log is already closed".to_string()));
            }
        }
        let bytes = serialize_job(job)?;
        self.write_frame(&bytes)?;
        self.jobs_written += 1;
        debug!(kind = ?job.kind(), index = self.jobs_written, "job frame written");
        Ok(())
    }

    pub fn jobs_written(&self) -> usize {
        self.jobs_written
    }

    /// Write the postamble and hand back the destination.
    pub fn finish(mut self) -> Result<W> {
        if self.mode != WriterMode::AwaitingJobs {
            return Err(RunnerError::Framing(
                "the postamble requires exactly one preceding Case".to_string(),
            ));
        }
        let digest = finalize(self.hasher.clone());
        self.inner.write_all(&serialize_postamble(&digest))?;
        self.inner.flush()?;
        self.mode = WriterMode::Ended;
        Ok(self.inner)
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.inner.flush()?;
        self.hasher.update(bytes);
        Ok(())
    }
}
