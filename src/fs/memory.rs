// src/fs/memory.rs

//! Ephemeral in-memory filesystem.
//!
//! Used as the dry-run sandbox for recipes: a snapshot of the real tree is
//! materialised here once, every recipe step mutates it, and the final state
//! is diffed against the snapshot. Nothing ever reaches the disk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};

use super::FileSystem;

#[derive(Debug, Clone)]
enum Entry {
    File(Vec<u8>),
    Dir(BTreeSet<String>),
}

#[derive(Debug, Clone, Default)]
pub struct VirtualFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, Entry>>>,
}

/// Normalise an empty parent (relative single-segment path) to `.`.
fn parent_of(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Some(Path::new(".")),
        other => other,
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(PathBuf::from("."), Entry::Dir(BTreeSet::new()));

        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Materialise a path → content snapshot.
    pub fn from_file_map(files: &BTreeMap<PathBuf, String>) -> Self {
        let vfs = Self::new();
        for (path, content) in files {
            vfs.add_file(path, content.as_bytes());
        }
        vfs
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.lock();
        if let Some(parent) = parent_of(&path) {
            Self::ensure_dir_entry(&mut entries, parent);
            Self::link_child(&mut entries, parent, &path);
        }
        entries.insert(path, Entry::File(content.into()));
    }

    /// All files currently held, keyed by path.
    pub fn files(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.lock()
            .iter()
            .filter_map(|(path, entry)| match entry {
                Entry::File(data) => Some((path.clone(), data.clone())),
                Entry::Dir(_) => None,
            })
            .collect()
    }

    fn link_child(entries: &mut HashMap<PathBuf, Entry>, parent: &Path, child: &Path) {
        if let (Some(Entry::Dir(children)), Some(name)) = (entries.get_mut(parent), file_name(child)) {
            children.insert(name);
        }
    }

    fn ensure_dir_entry(entries: &mut HashMap<PathBuf, Entry>, path: &Path) {
        if entries.contains_key(path) {
            return;
        }
        entries.insert(path.to_path_buf(), Entry::Dir(BTreeSet::new()));
        if let Some(parent) = parent_of(path) {
            // `/` and `.` are their own roots.
            if parent != path {
                Self::ensure_dir_entry(entries, parent);
                Self::link_child(entries, parent, path);
            }
        }
    }

    fn take_file(entries: &mut HashMap<PathBuf, Entry>, path: &Path) -> Result<Vec<u8>> {
        match entries.get(path) {
            Some(Entry::File(_)) => {}
            Some(Entry::Dir(_)) => return Err(anyhow!("Is a directory: {:?}", path)),
            None => return Err(anyhow!("File not found: {:?}", path)),
        }
        let Some(Entry::File(data)) = entries.remove(path) else {
            return Err(anyhow!("File not found: {:?}", path));
        };
        if let (Some(parent), Some(name)) = (parent_of(path), file_name(path)) {
            if let Some(Entry::Dir(children)) = entries.get_mut(parent) {
                children.remove(&name);
            }
        }
        Ok(data)
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        match self.lock().get(path) {
            Some(Entry::File(content)) => Ok(content.clone()),
            Some(Entry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }
}

impl FileSystem for VirtualFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let content = self.read_bytes(path)?;
        String::from_utf8(content).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if self.is_dir(path) {
            return Err(anyhow!("Is a directory: {:?}", path));
        }
        self.add_file(path, contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut entries = self.lock();
        Self::take_file(&mut entries, path).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let data = {
            let mut entries = self.lock();
            Self::take_file(&mut entries, from)?
        };
        self.add_file(to, data);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let data = self.read_bytes(from)?;
        self.add_file(to, data);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(Entry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(Entry::Dir(_)))
    }

    fn is_symlink(&self, _path: &Path) -> bool {
        false
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // Paths are stored verbatim; callers use absolute paths.
        Ok(path.to_path_buf())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lock().get(path) {
            Some(Entry::Dir(children)) => Ok(children.iter().map(|name| path.join(name)).collect()),
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_files_create_parent_directories() {
        let fs = VirtualFileSystem::new();
        fs.add_file("/repo/src/a.ts", "a");

        assert!(fs.is_dir(Path::new("/repo")));
        assert!(fs.is_dir(Path::new("/repo/src")));
        assert_eq!(
            fs.read_dir(Path::new("/repo")).unwrap(),
            vec![PathBuf::from("/repo/src")]
        );
        assert_eq!(fs.read_to_string(Path::new("/repo/src/a.ts")).unwrap(), "a");
    }

    #[test]
    fn remove_unlinks_from_parent() {
        let fs = VirtualFileSystem::new();
        fs.add_file("/repo/a.ts", "a");
        fs.add_file("/repo/b.ts", "b");

        fs.remove_file(Path::new("/repo/a.ts")).unwrap();

        assert!(!fs.exists(Path::new("/repo/a.ts")));
        assert_eq!(
            fs.read_dir(Path::new("/repo")).unwrap(),
            vec![PathBuf::from("/repo/b.ts")]
        );
        assert!(fs.remove_file(Path::new("/repo/a.ts")).is_err());
    }

    #[test]
    fn rename_moves_content() {
        let fs = VirtualFileSystem::new();
        fs.add_file("/repo/a.ts", "a");

        fs.rename(Path::new("/repo/a.ts"), Path::new("/repo/lib/a.ts")).unwrap();

        assert!(!fs.is_file(Path::new("/repo/a.ts")));
        assert_eq!(fs.read_to_string(Path::new("/repo/lib/a.ts")).unwrap(), "a");
    }

    #[test]
    fn relative_paths_hang_off_dot() {
        let fs = VirtualFileSystem::new();
        fs.add_file("README.md", "# readme");

        assert_eq!(
            fs.read_dir(Path::new(".")).unwrap(),
            vec![PathBuf::from("./README.md")]
        );
    }

    #[test]
    fn snapshot_round_trips_through_files() {
        let mut map = BTreeMap::new();
        map.insert(PathBuf::from("/r/x.js"), "x".to_string());
        map.insert(PathBuf::from("/r/y/z.js"), "z".to_string());

        let fs = VirtualFileSystem::from_file_map(&map);
        let files = fs.files();

        assert_eq!(files.len(), 2);
        assert_eq!(files[&PathBuf::from("/r/y/z.js")], b"z".to_vec());
    }
}
