// src/case/jobs.rs

//! Turning file commands into logged jobs.
//!
//! Jobs carry URIs, never file contents. New file data is stored next to the
//! log under a content-addressed name and the job points at it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use blake3::Hasher;
use ripemd::{Digest, Ripemd160};

use super::{DIGEST_LEN, HashDigest, Job, JobPayload, finalize, hash_digest};
use crate::commands::FormattedFileCommand;
use crate::errors::Result;
use crate::fs::FileSystem;

/// Digest identifying a codemod: ripemd160 of its source path, or of its
/// name when it has no single source (recipes).
pub fn codemod_hash_digest(identity: &str) -> HashDigest {
    hash_digest(identity.as_bytes())
}

/// Digest identifying one run of a codemod against a target.
pub fn derive_case_hash_digest(
    target: &Path,
    codemod_digest: &HashDigest,
    created_at: i64,
) -> HashDigest {
    let mut hasher = Hasher::new();
    hasher.update(target.to_string_lossy().as_bytes());
    hasher.update(codemod_digest);
    hasher.update(&created_at.to_be_bytes());

    let mut out = [0u8; DIGEST_LEN];
    hasher.finalize_xof().fill(&mut out);
    out
}

fn path_uri(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Builds jobs for one case, numbering them in emission order.
#[derive(Debug)]
pub struct JobBuilder {
    fs: Arc<dyn FileSystem>,
    data_dir: PathBuf,
    case_hash_digest: HashDigest,
    next_index: u32,
}

impl JobBuilder {
    pub fn new(fs: Arc<dyn FileSystem>, data_dir: impl Into<PathBuf>, case_hash_digest: HashDigest) -> Self {
        Self {
            fs,
            data_dir: data_dir.into(),
            case_hash_digest,
            next_index: 0,
        }
    }

    pub fn build(&mut self, command: &FormattedFileCommand) -> Result<Job> {
        let payload = match command {
            FormattedFileCommand::CreateFile { new_path, new_data } => JobPayload::CreateFile {
                path_uri: path_uri(new_path),
                data_uri: self.store_data(new_path, new_data)?,
            },
            FormattedFileCommand::UpdateFile { old_path, new_data } => JobPayload::UpdateFile {
                path_uri: path_uri(old_path),
                new_data_uri: self.store_data(old_path, new_data)?,
            },
            FormattedFileCommand::DeleteFile { old_path } => JobPayload::DeleteFile {
                path_uri: path_uri(old_path),
            },
            FormattedFileCommand::MoveFile { old_path, new_path } => JobPayload::MoveFile {
                old_path_uri: path_uri(old_path),
                new_path_uri: path_uri(new_path),
            },
            FormattedFileCommand::MoveAndUpdateFile {
                old_path,
                new_path,
                new_data,
            } => JobPayload::MoveAndUpdateFile {
                old_path_uri: path_uri(old_path),
                new_path_uri: path_uri(new_path),
                new_data_uri: self.store_data(new_path, new_data)?,
            },
            FormattedFileCommand::CopyFile {
                source_path,
                target_path,
            } => JobPayload::CopyFile {
                source_path_uri: path_uri(source_path),
                target_path_uri: path_uri(target_path),
            },
        };

        let job_hash_digest = self.job_digest(&payload);
        self.next_index += 1;
        Ok(Job {
            job_hash_digest,
            payload,
        })
    }

    fn job_digest(&self, payload: &JobPayload) -> HashDigest {
        let mut hasher = Ripemd160::new();
        hasher.update(self.case_hash_digest);
        hasher.update(self.next_index.to_be_bytes());
        hasher.update([payload.kind() as u8]);
        for uri in payload.uris() {
            hasher.update(uri.as_bytes());
            hasher.update([0u8]);
        }
        finalize(hasher)
    }

    /// Store `data` under `<data_dir>/<blake3>.<ext>` and return its URI.
    fn store_data(&self, path: &Path, data: &str) -> Result<String> {
        let mut name = blake3::hash(data.as_bytes()).to_hex().to_string();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        let target = self.data_dir.join(name);
        if !self.fs.is_file(&target) {
            self.fs
                .write(&target, data.as_bytes())
                .with_context(|| format!("storing job data for {:?}", path))?;
        }
        Ok(path_uri(&target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::VirtualFileSystem;

    #[test]
    fn data_is_stored_by_content_hash() {
        let fs = Arc::new(VirtualFileSystem::new());
        let mut builder = JobBuilder::new(fs.clone(), "/out", [0; 20]);

        let job = builder
            .build(&FormattedFileCommand::CreateFile {
                new_path: "/repo/a.ts".into(),
                new_data: "export {}".into(),
            })
            .unwrap();

        let JobPayload::CreateFile { path_uri, data_uri } = &job.payload else {
            panic!("unexpected payload {:?}", job.payload);
        };
        assert_eq!(path_uri, "/repo/a.ts");
        assert!(data_uri.starts_with("/out/") && data_uri.ends_with(".ts"));
        assert_eq!(fs.read_to_string(Path::new(data_uri)).unwrap(), "export {}");
    }

    #[test]
    fn identical_commands_get_distinct_digests() {
        let fs = Arc::new(VirtualFileSystem::new());
        let mut builder = JobBuilder::new(fs, "/out", [0; 20]);
        let cmd = FormattedFileCommand::DeleteFile {
            old_path: "/repo/a.ts".into(),
        };

        let first = builder.build(&cmd).unwrap();
        let second = builder.build(&cmd).unwrap();

        assert_eq!(first.payload, second.payload);
        assert_ne!(first.job_hash_digest, second.job_hash_digest);
    }

    #[test]
    fn case_digest_depends_on_every_input() {
        let codemod = codemod_hash_digest("transforms/a.sh");
        let base = derive_case_hash_digest(Path::new("/repo"), &codemod, 1);

        assert_eq!(base, derive_case_hash_digest(Path::new("/repo"), &codemod, 1));
        assert_ne!(base, derive_case_hash_digest(Path::new("/repo"), &codemod, 2));
        assert_ne!(base, derive_case_hash_digest(Path::new("/other"), &codemod, 1));
    }
}
