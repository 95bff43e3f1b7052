// src/case/decode.rs

//! Resumable log decoder.
//!
//! [`CaseDecoder`] is a pure state machine: each state reports exactly how
//! many bytes it needs next via [`CaseDecoder::required_len`], and
//! [`CaseDecoder::step`] consumes exactly that span. It never looks ahead,
//! which lets [`StreamDecoder`] put a bounded [`RingBuffer`] in front of it
//! and feed it whatever a tailing reader happened to observe.

use ripemd::{Digest, Ripemd160};
use tracing::debug;

use super::ring::RingBuffer;
use super::{
    CASE_MAGIC, Case, DIGEST_LEN, HashDigest, JOB_MAGIC, Job, JobKind, JobPayload,
    POSTAMBLE_MAGIC, PREAMBLE_MAGIC, VERSION, finalize, hash_digest,
};
use crate::errors::{Result, RunnerError};
use crate::types::parse_argument_record;

const FRAME_HEADER_LEN: usize = 4 + 2 + DIGEST_LEN;

/// Position of the decoder within the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderState {
    BeforePreamble,
    BeforeOuterCase,
    BeforeInnerCase { len: usize, digest: HashDigest },
    BeforeOuterJobOrPostamble,
    BeforeInnerJobLen,
    BeforeInnerJob { len: usize, digest: HashDigest },
    BeforePostambleDigest,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    Case(Case),
    Job(Job),
    /// The postamble digest matched; no further bytes are accepted.
    Finish,
}

pub struct CaseDecoder {
    state: DecoderState,
    hasher: Ripemd160,
}

impl Default for CaseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::BeforePreamble,
            hasher: Ripemd160::new(),
        }
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == DecoderState::Finished
    }

    /// Bytes the current state consumes. Zero once finished or failed.
    pub fn required_len(&self) -> usize {
        match &self.state {
            DecoderState::BeforePreamble => PREAMBLE_MAGIC.len() + VERSION.len(),
            DecoderState::BeforeOuterCase => FRAME_HEADER_LEN,
            DecoderState::BeforeInnerCase { len, .. } => *len,
            DecoderState::BeforeOuterJobOrPostamble => 4,
            DecoderState::BeforeInnerJobLen => 2 + DIGEST_LEN,
            DecoderState::BeforeInnerJob { len, .. } => *len,
            DecoderState::BeforePostambleDigest => DIGEST_LEN,
            DecoderState::Finished | DecoderState::Failed => 0,
        }
    }

    /// Consume exactly `required_len()` bytes.
    ///
    /// Any error moves the decoder to `Failed`; it accepts nothing afterwards.
    pub fn step(&mut self, bytes: &[u8]) -> Result<Option<DecodeEvent>> {
        if bytes.len() != self.required_len() {
            return Err(RunnerError::Framing(format!(
                "decoder in state {:?} needs {} bytes, was given {}",
                self.state,
                self.required_len(),
                bytes.len()
            )));
        }

        match self.transition(bytes) {
            Ok((next, event)) => {
                if self.hashes(&next) {
                    self.hasher.update(bytes);
                }
                self.state = next;
                Ok(event)
            }
            Err(err) => {
                self.state = DecoderState::Failed;
                Err(err)
            }
        }
    }

    /// Every framed byte except the preamble and the postamble counts
    /// towards the whole-log digest.
    fn hashes(&self, next: &DecoderState) -> bool {
        !matches!(
            self.state,
            DecoderState::BeforePreamble | DecoderState::BeforePostambleDigest
        ) && *next != DecoderState::BeforePostambleDigest
    }

    fn transition(&self, bytes: &[u8]) -> Result<(DecoderState, Option<DecodeEvent>)> {
        match &self.state {
            DecoderState::BeforePreamble => {
                if bytes[..4] != PREAMBLE_MAGIC {
                    return Err(RunnerError::Framing(format!(
                        "bad preamble magic {:02x?}",
                        &bytes[..4]
                    )));
                }
                if bytes[4..8] != VERSION {
                    return Err(RunnerError::Framing(format!(
                        "unsupported version {:02x?}",
                        &bytes[4..8]
                    )));
                }
                Ok((DecoderState::BeforeOuterCase, None))
            }
            DecoderState::BeforeOuterCase => {
                if bytes[..4] != CASE_MAGIC {
                    return Err(RunnerError::Framing(format!(
                        "expected case magic, found {:02x?}",
                        &bytes[..4]
                    )));
                }
                let (len, digest) = read_len_and_digest(&bytes[4..]);
                Ok((DecoderState::BeforeInnerCase { len, digest }, None))
            }
            DecoderState::BeforeInnerCase { digest, .. } => {
                verify(bytes, digest, "case")?;
                let case = parse_case_payload(bytes)?;
                debug!(target_path = %case.absolute_target_path, "case decoded");
                Ok((DecoderState::BeforeOuterJobOrPostamble, Some(DecodeEvent::Case(case))))
            }
            DecoderState::BeforeOuterJobOrPostamble => {
                if bytes == JOB_MAGIC {
                    Ok((DecoderState::BeforeInnerJobLen, None))
                } else if bytes == POSTAMBLE_MAGIC {
                    Ok((DecoderState::BeforePostambleDigest, None))
                } else {
                    Err(RunnerError::Framing(format!(
                        "expected job or postamble magic, found {bytes:02x?}"
                    )))
                }
            }
            DecoderState::BeforeInnerJobLen => {
                let (len, digest) = read_len_and_digest(bytes);
                Ok((DecoderState::BeforeInnerJob { len, digest }, None))
            }
            DecoderState::BeforeInnerJob { digest, .. } => {
                verify(bytes, digest, "job")?;
                let job = parse_job_payload(bytes)?;
                debug!(kind = ?job.kind(), "job decoded");
                Ok((DecoderState::BeforeOuterJobOrPostamble, Some(DecodeEvent::Job(job))))
            }
            DecoderState::BeforePostambleDigest => {
                let expected = finalize(self.hasher.clone());
                if bytes != expected {
                    return Err(RunnerError::Integrity(
                        "postamble digest does not match the logged frames".to_string(),
                    ));
                }
                Ok((DecoderState::Finished, Some(DecodeEvent::Finish)))
            }
            DecoderState::Finished => Err(RunnerError::Framing(
                "bytes after the postamble".to_string(),
            )),
            DecoderState::Failed => Err(RunnerError::Framing(
                "decoder already failed".to_string(),
            )),
        }
    }
}

fn read_len_and_digest(bytes: &[u8]) -> (usize, HashDigest) {
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&bytes[2..2 + DIGEST_LEN]);
    (len, digest)
}

fn verify(payload: &[u8], expected: &HashDigest, record: &str) -> Result<()> {
    if hash_digest(payload) != *expected {
        return Err(RunnerError::Integrity(format!(
            "{record} payload digest mismatch"
        )));
    }
    Ok(())
}

/// Cursor over a payload that reports short reads as framing errors.
struct Fields<'a> {
    bytes: &'a [u8],
    record: &'static str,
}

impl<'a> Fields<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(RunnerError::Framing(format!(
                "{} payload ends early",
                self.record
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn digest(&mut self) -> Result<HashDigest> {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(self.take(DIGEST_LEN)?);
        Ok(out)
    }

    fn sized(&mut self) -> Result<&'a [u8]> {
        let len = self.take(2)?;
        let len = u16::from_be_bytes([len[0], len[1]]) as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String> {
        let bytes = self.sized()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            RunnerError::Framing(format!("{} payload holds invalid UTF-8: {e}", self.record))
        })
    }

    fn end(self) -> Result<()> {
        if !self.bytes.is_empty() {
            return Err(RunnerError::Framing(format!(
                "{} trailing bytes in {} payload",
                self.bytes.len(),
                self.record
            )));
        }
        Ok(())
    }
}

fn parse_case_payload(bytes: &[u8]) -> Result<Case> {
    let mut fields = Fields { bytes, record: "case" };

    let case_hash_digest = fields.digest()?;
    let codemod_hash_digest = fields.digest()?;
    let created_at = fields.take(8)?;
    let mut ts = [0u8; 8];
    ts.copy_from_slice(created_at);
    let absolute_target_path = fields.string()?;
    let argument_record = parse_argument_record(fields.sized()?).map_err(RunnerError::Framing)?;
    fields.end()?;

    Ok(Case {
        case_hash_digest,
        codemod_hash_digest,
        created_at: i64::from_be_bytes(ts),
        absolute_target_path,
        argument_record,
    })
}

fn parse_job_payload(bytes: &[u8]) -> Result<Job> {
    let mut fields = Fields { bytes, record: "job" };

    let job_hash_digest = fields.digest()?;
    let kind = JobKind::try_from(fields.take(1)?[0])?;
    let uris = (0..kind.uri_count())
        .map(|_| fields.string())
        .collect::<Result<Vec<_>>>()?;
    fields.end()?;

    Ok(Job {
        job_hash_digest,
        payload: JobPayload::from_uris(kind, uris)?,
    })
}

/// A [`CaseDecoder`] behind a bounded ring buffer.
///
/// Bytes are accepted in arbitrary chunks; frames are decoded as soon as
/// enough bytes are buffered and otherwise the decoder simply waits for more.
pub struct StreamDecoder {
    ring: RingBuffer,
    decoder: CaseDecoder,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_ring(RingBuffer::default())
    }

    pub fn with_ring(ring: RingBuffer) -> Self {
        Self {
            ring,
            decoder: CaseDecoder::new(),
        }
    }

    /// How many bytes a reader may hand over without overflowing the ring.
    pub fn free_len(&self) -> usize {
        self.ring.free_len()
    }

    pub fn is_finished(&self) -> bool {
        self.decoder.is_finished()
    }

    pub fn state(&self) -> &DecoderState {
        self.decoder.state()
    }

    /// Buffer `bytes` and decode every frame that became complete.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<Vec<DecodeEvent>> {
        let mut events = Vec::new();
        loop {
            let written = self.ring.write(bytes);
            bytes = &bytes[written..];

            let drained = self.drain(&mut events)?;

            if self.decoder.is_finished() && (!self.ring.is_empty() || !bytes.is_empty()) {
                return Err(RunnerError::Framing("bytes after the postamble".to_string()));
            }
            if bytes.is_empty() {
                return Ok(events);
            }
            if written == 0 && !drained {
                return Err(RunnerError::Framing(format!(
                    "a {} byte record does not fit the {} byte buffer",
                    self.decoder.required_len(),
                    self.ring.capacity()
                )));
            }
        }
    }

    fn drain(&mut self, events: &mut Vec<DecodeEvent>) -> Result<bool> {
        let mut progressed = false;
        while !self.decoder.is_finished() {
            let need = self.decoder.required_len();
            let Some(chunk) = self.ring.take(need) else {
                break;
            };
            progressed = true;
            if let Some(event) = self.decoder.step(&chunk)? {
                events.push(event);
            }
        }
        Ok(progressed)
    }

    /// Signal that the byte source is gone.
    ///
    /// A log that ends anywhere other than after its postamble is truncated.
    pub fn close(&self) -> Result<()> {
        if self.decoder.is_finished() {
            return Ok(());
        }
        Err(RunnerError::Truncated(format!(
            "source closed in state {:?} with {} buffered bytes",
            self.decoder.state(),
            self.ring.len()
        )))
    }
}

/// A fully decoded log.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub case: Case,
    pub jobs: Vec<Job>,
}

/// Decode a complete log held in memory.
pub fn decode_all(bytes: &[u8]) -> Result<DecodedLog> {
    let mut stream = StreamDecoder::new();
    let events = stream.feed(bytes)?;
    stream.close()?;

    let mut case = None;
    let mut jobs = Vec::new();
    for event in events {
        match event {
            DecodeEvent::Case(c) => case = Some(c),
            DecodeEvent::Job(j) => jobs.push(j),
            DecodeEvent::Finish => {}
        }
    }
    let case = case.ok_or_else(|| RunnerError::Framing("log holds no case".to_string()))?;
    Ok(DecodedLog { case, jobs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::encode::{serialize_case, serialize_job, serialize_preamble};
    use crate::types::ArgumentRecord;

    fn case() -> Case {
        Case {
            case_hash_digest: [7; 20],
            codemod_hash_digest: [8; 20],
            created_at: 42,
            absolute_target_path: "/t".to_string(),
            argument_record: ArgumentRecord::new(),
        }
    }

    #[test]
    fn states_declare_their_spans() {
        let mut decoder = CaseDecoder::new();
        assert_eq!(decoder.required_len(), 8);

        decoder.step(&serialize_preamble()).unwrap();
        assert_eq!(*decoder.state(), DecoderState::BeforeOuterCase);
        assert_eq!(decoder.required_len(), 26);

        let frame = serialize_case(&case()).unwrap();
        decoder.step(&frame[..26]).unwrap();
        assert_eq!(decoder.required_len(), frame.len() - 26);

        let event = decoder.step(&frame[26..]).unwrap();
        assert_eq!(event, Some(DecodeEvent::Case(case())));
        assert_eq!(*decoder.state(), DecoderState::BeforeOuterJobOrPostamble);
        assert_eq!(decoder.required_len(), 4);
    }

    #[test]
    fn wrong_span_is_rejected_without_state_change() {
        let mut decoder = CaseDecoder::new();
        assert!(decoder.step(&[0xAA]).is_err());
        assert_eq!(*decoder.state(), DecoderState::BeforePreamble);
    }

    #[test]
    fn bad_version_is_a_framing_error() {
        let mut decoder = CaseDecoder::new();
        let err = decoder
            .step(&[0xAA, 0xBB, 0xCC, 0xDD, 2, 0, 0, 0])
            .unwrap_err();

        assert!(matches!(err, RunnerError::Framing(_)));
        assert_eq!(*decoder.state(), DecoderState::Failed);
        assert_eq!(decoder.required_len(), 0);
    }

    #[test]
    fn job_frame_after_preamble_is_a_framing_error() {
        let job = Job {
            job_hash_digest: [1; 20],
            payload: JobPayload::DeleteFile {
                path_uri: "/t/a".to_string(),
            },
        };
        let mut stream = StreamDecoder::new();
        let mut bytes = serialize_preamble();
        bytes.extend(serialize_job(&job).unwrap());

        assert!(matches!(stream.feed(&bytes), Err(RunnerError::Framing(_))));
    }

    #[test]
    fn byte_at_a_time_feeding_suspends_then_resumes() {
        let mut bytes = serialize_preamble();
        bytes.extend(serialize_case(&case()).unwrap());

        let mut stream = StreamDecoder::new();
        let mut events = Vec::new();
        for b in &bytes {
            events.extend(stream.feed(std::slice::from_ref(b)).unwrap());
        }

        assert_eq!(events, vec![DecodeEvent::Case(case())]);
        assert!(matches!(stream.close(), Err(RunnerError::Truncated(_))));
    }

    #[test]
    fn small_ring_still_decodes_in_rounds() {
        let mut bytes = serialize_preamble();
        bytes.extend(serialize_case(&case()).unwrap());

        // Smaller than preamble + case frame, larger than any single span.
        let mut stream = StreamDecoder::with_ring(RingBuffer::new(64));
        let events = stream.feed(&bytes).unwrap();

        assert_eq!(events, vec![DecodeEvent::Case(case())]);
    }
}
