// src/commands.rs

//! File mutation commands.
//!
//! - [`FileCommand`] is what an engine reports for a single file; updates
//!   carry the data they replace so no-ops can be recognised.
//! - [`FormattedFileCommand`] is the normalised form that flows to the
//!   filesystem, the log encoder and the UI.
//! - [`ExternalFileCommand`] is the coarse upsert/delete vocabulary of
//!   filemods, resolved against the filesystem before it becomes a
//!   [`FormattedFileCommand`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCommand {
    CreateFile {
        new_path: PathBuf,
        new_data: String,
    },
    UpdateFile {
        old_path: PathBuf,
        old_data: String,
        new_data: String,
    },
    DeleteFile {
        old_path: PathBuf,
    },
    MoveFile {
        old_path: PathBuf,
        new_path: PathBuf,
    },
    MoveAndUpdateFile {
        old_path: PathBuf,
        new_path: PathBuf,
        old_data: String,
        new_data: String,
    },
    CopyFile {
        source_path: PathBuf,
        target_path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FormattedFileCommand {
    CreateFile {
        new_path: PathBuf,
        new_data: String,
    },
    UpdateFile {
        old_path: PathBuf,
        new_data: String,
    },
    DeleteFile {
        old_path: PathBuf,
    },
    MoveFile {
        old_path: PathBuf,
        new_path: PathBuf,
    },
    MoveAndUpdateFile {
        old_path: PathBuf,
        new_path: PathBuf,
        new_data: String,
    },
    CopyFile {
        source_path: PathBuf,
        target_path: PathBuf,
    },
}

impl FormattedFileCommand {
    /// Path the command reads from or replaces, if any.
    pub fn old_path(&self) -> Option<&Path> {
        match self {
            FormattedFileCommand::CreateFile { .. } => None,
            FormattedFileCommand::UpdateFile { old_path, .. }
            | FormattedFileCommand::DeleteFile { old_path }
            | FormattedFileCommand::MoveFile { old_path, .. }
            | FormattedFileCommand::MoveAndUpdateFile { old_path, .. } => Some(old_path),
            FormattedFileCommand::CopyFile { source_path, .. } => Some(source_path),
        }
    }

    /// Path that exists after the command, if any.
    pub fn new_path(&self) -> Option<&Path> {
        match self {
            FormattedFileCommand::CreateFile { new_path, .. }
            | FormattedFileCommand::MoveFile { new_path, .. }
            | FormattedFileCommand::MoveAndUpdateFile { new_path, .. } => Some(new_path),
            FormattedFileCommand::UpdateFile { old_path, .. } => Some(old_path),
            FormattedFileCommand::DeleteFile { .. } => None,
            FormattedFileCommand::CopyFile { target_path, .. } => Some(target_path),
        }
    }

    /// Path that no longer exists after the command, if any.
    pub fn removed_path(&self) -> Option<&Path> {
        match self {
            FormattedFileCommand::DeleteFile { old_path }
            | FormattedFileCommand::MoveFile { old_path, .. }
            | FormattedFileCommand::MoveAndUpdateFile { old_path, .. } => Some(old_path),
            _ => None,
        }
    }
}

/// Normalise an engine command, dropping updates that change nothing.
///
/// A move whose content is unchanged degrades to a plain move.
pub fn format_command(command: FileCommand) -> Option<FormattedFileCommand> {
    Some(match command {
        FileCommand::CreateFile { new_path, new_data } => {
            FormattedFileCommand::CreateFile { new_path, new_data }
        }
        FileCommand::UpdateFile {
            old_path,
            old_data,
            new_data,
        } => {
            if old_data == new_data {
                return None;
            }
            FormattedFileCommand::UpdateFile { old_path, new_data }
        }
        FileCommand::DeleteFile { old_path } => FormattedFileCommand::DeleteFile { old_path },
        FileCommand::MoveFile { old_path, new_path } => {
            FormattedFileCommand::MoveFile { old_path, new_path }
        }
        FileCommand::MoveAndUpdateFile {
            old_path,
            new_path,
            old_data,
            new_data,
        } => {
            if old_data == new_data {
                FormattedFileCommand::MoveFile { old_path, new_path }
            } else {
                FormattedFileCommand::MoveAndUpdateFile {
                    old_path,
                    new_path,
                    new_data,
                }
            }
        }
        FileCommand::CopyFile {
            source_path,
            target_path,
        } => FormattedFileCommand::CopyFile {
            source_path,
            target_path,
        },
    })
}

pub fn format_commands(commands: impl IntoIterator<Item = FileCommand>) -> Vec<FormattedFileCommand> {
    commands.into_iter().filter_map(format_command).collect()
}

/// Filemod output, one JSON object per line:
/// `{"kind":"upsertFile","path":"a.ts","data":"..."}` or
/// `{"kind":"deleteFile","path":"a.ts"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExternalFileCommand {
    UpsertFile { path: PathBuf, data: String },
    DeleteFile { path: PathBuf },
}

/// Resolve an upsert into a create or an update against the current tree.
pub fn resolve_external_command(
    fs: &dyn FileSystem,
    command: ExternalFileCommand,
) -> Result<FileCommand> {
    Ok(match command {
        ExternalFileCommand::UpsertFile { path, data } => {
            if fs.is_file(&path) {
                let old_data = fs.read_to_string(&path)?;
                FileCommand::UpdateFile {
                    old_path: path,
                    old_data,
                    new_data: data,
                }
            } else {
                FileCommand::CreateFile {
                    new_path: path,
                    new_data: data,
                }
            }
        }
        ExternalFileCommand::DeleteFile { path } => FileCommand::DeleteFile { old_path: path },
    })
}

/// Perform a command against a filesystem.
pub fn apply_command(fs: &dyn FileSystem, command: &FormattedFileCommand) -> Result<()> {
    match command {
        FormattedFileCommand::CreateFile { new_path, new_data } => fs
            .write(new_path, new_data.as_bytes())
            .with_context(|| format!("creating {:?}", new_path)),
        FormattedFileCommand::UpdateFile { old_path, new_data } => fs
            .write(old_path, new_data.as_bytes())
            .with_context(|| format!("updating {:?}", old_path)),
        FormattedFileCommand::DeleteFile { old_path } => fs.remove_file(old_path),
        FormattedFileCommand::MoveFile { old_path, new_path } => fs.rename(old_path, new_path),
        FormattedFileCommand::MoveAndUpdateFile {
            old_path,
            new_path,
            new_data,
        } => {
            fs.rename(old_path, new_path)?;
            fs.write(new_path, new_data.as_bytes())
                .with_context(|| format!("updating {:?}", new_path))
        }
        FormattedFileCommand::CopyFile {
            source_path,
            target_path,
        } => fs.copy(source_path, target_path),
    }
}
