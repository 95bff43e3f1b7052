use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use codemod_runner::fs::{FileSystem, VirtualFileSystem};

/// A [`VirtualFileSystem`] whose listed directories can't be read.
#[derive(Debug)]
pub struct UnreadableDirs {
    inner: Arc<VirtualFileSystem>,
    unreadable: Vec<PathBuf>,
}

impl UnreadableDirs {
    pub fn new(inner: Arc<VirtualFileSystem>, unreadable: &[&str]) -> Self {
        Self {
            inner,
            unreadable: unreadable.iter().map(PathBuf::from).collect(),
        }
    }
}

impl FileSystem for UnreadableDirs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.inner.read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.inner.write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.inner.remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.inner.is_symlink(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.inner.canonicalize(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if self.unreadable.iter().any(|dir| dir == path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        self.inner.read_dir(path)
    }
}
