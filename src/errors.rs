// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// Bad magic, unsupported version, unknown job kind or malformed payload.
    #[error("Framing error: {0}")]
    Framing(String),

    /// A per-record or whole-log digest did not match.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// The byte source was closed in the middle of a record.
    #[error("Truncated log: {0}")]
    Truncated(String),

    #[error("Engine not supported: {0}")]
    EngineUnsupported(String),

    #[error("Transform error in codemod '{codemod}'{}: {message}", fmt_path(.path))]
    Transform {
        codemod: String,
        path: Option<PathBuf>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Field '{field}' is {len} bytes long, the maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" at {}", p.display()),
        None => String::new(),
    }
}

impl RunnerError {
    /// Errors that make a log untrustworthy from the failing record onwards.
    pub fn is_reader_fatal(&self) -> bool {
        matches!(
            self,
            RunnerError::Framing(_) | RunnerError::Integrity(_) | RunnerError::Truncated(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunnerError>;
