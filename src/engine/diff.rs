// src/engine/diff.rs

//! Net effect of a dry-run recipe.
//!
//! Pure functions over two snapshots: the files matched before the first
//! step (the `FileMap`) and the virtual filesystem after the last one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::commands::FormattedFileCommand;
use crate::fs::FileSystem;

/// Path → content snapshot.
pub type FileMap = BTreeMap<PathBuf, String>;

/// Read every path into a snapshot, skipping files that aren't UTF-8 text.
pub fn snapshot(fs: &dyn FileSystem, paths: &[PathBuf]) -> FileMap {
    let mut map = FileMap::new();
    for path in paths {
        match fs.read_to_string(path) {
            Ok(data) => {
                map.insert(path.clone(), data);
            }
            Err(err) => debug!(path = ?path, error = %err, "not snapshotting unreadable file"),
        }
    }
    map
}

/// Commands that turn `original` into `final_files`, sorted by path.
///
/// - a final file whose content equals the original yields nothing;
/// - a final file that existed originally is an update, otherwise a create
///   (a delete followed by a re-create therefore collapses to one update);
/// - an original file that is gone and was deleted by a step is a delete.
pub fn net_commands(
    original: &FileMap,
    final_files: &BTreeMap<PathBuf, Vec<u8>>,
    deleted: &BTreeSet<PathBuf>,
) -> Vec<FormattedFileCommand> {
    let paths: BTreeSet<&Path> = original
        .keys()
        .chain(final_files.keys())
        .map(PathBuf::as_path)
        .collect();

    let mut commands = Vec::new();
    for path in paths {
        match (original.get(path), final_files.get(path)) {
            (Some(before), Some(after)) => {
                if before.as_bytes() != after.as_slice() {
                    commands.push(FormattedFileCommand::UpdateFile {
                        old_path: path.to_path_buf(),
                        new_data: String::from_utf8_lossy(after).into_owned(),
                    });
                }
            }
            (None, Some(after)) => commands.push(FormattedFileCommand::CreateFile {
                new_path: path.to_path_buf(),
                new_data: String::from_utf8_lossy(after).into_owned(),
            }),
            (Some(_), None) if deleted.contains(path) => {
                commands.push(FormattedFileCommand::DeleteFile {
                    old_path: path.to_path_buf(),
                })
            }
            _ => {}
        }
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(p, c)| (PathBuf::from(p), c.to_string()))
            .collect()
    }

    fn bytes(entries: &[(&str, &str)]) -> BTreeMap<PathBuf, Vec<u8>> {
        entries
            .iter()
            .map(|(p, c)| (PathBuf::from(p), c.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn untouched_files_produce_nothing() {
        let original = map(&[("/r/a.ts", "a")]);
        let commands = net_commands(&original, &bytes(&[("/r/a.ts", "a")]), &BTreeSet::new());
        assert!(commands.is_empty());
    }

    #[test]
    fn delete_then_recreate_collapses_to_update() {
        let original = map(&[("/r/a.ts", "a")]);
        let deleted = BTreeSet::from([PathBuf::from("/r/a.ts")]);

        let commands = net_commands(&original, &bytes(&[("/r/a.ts", "b")]), &deleted);

        assert_eq!(
            commands,
            vec![FormattedFileCommand::UpdateFile {
                old_path: "/r/a.ts".into(),
                new_data: "b".into(),
            }]
        );
    }

    #[test]
    fn results_are_sorted_by_path() {
        let original = map(&[("/r/b.ts", "b"), ("/r/c.ts", "c")]);
        let deleted = BTreeSet::from([PathBuf::from("/r/c.ts")]);
        let final_files = bytes(&[("/r/a.ts", "new"), ("/r/b.ts", "b2")]);

        let commands = net_commands(&original, &final_files, &deleted);

        assert_eq!(
            commands,
            vec![
                FormattedFileCommand::CreateFile {
                    new_path: "/r/a.ts".into(),
                    new_data: "new".into(),
                },
                FormattedFileCommand::UpdateFile {
                    old_path: "/r/b.ts".into(),
                    new_data: "b2".into(),
                },
                FormattedFileCommand::DeleteFile {
                    old_path: "/r/c.ts".into(),
                },
            ]
        );
    }
}
