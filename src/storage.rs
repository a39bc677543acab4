//! File-backed artifact cache.
//!
//! Entries are addressed by identifier paths such as
//! `["e621", "123", "post.json"]` under a single root. Identifier segments
//! are sanitised so a hostile post id can never escape the root.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};

/// A rooted directory of cached files.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Creates a cache rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for an identifier. Empty, `.` and `..` segments are dropped and
    /// path separators inside a segment are replaced.
    pub fn path<S: AsRef<str>>(&self, identifier: &[S]) -> PathBuf {
        let mut path = self.root.clone();
        for segment in identifier {
            let segment = segment.as_ref();
            if segment.is_empty() || segment == "." || segment == ".." {
                continue;
            }
            path.push(segment.replace(['/', '\\'], "_"));
        }
        path
    }

    /// Whether an entry exists.
    pub fn exists<S: AsRef<str>>(&self, identifier: &[S]) -> bool {
        self.path(identifier).is_file()
    }

    /// Last modification time of an entry.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the entry is missing or unreadable.
    pub fn modified_time<S: AsRef<str>>(&self, identifier: &[S]) -> std::io::Result<DateTime<Local>> {
        let modified = std::fs::metadata(self.path(identifier))?.modified()?;
        Ok(DateTime::<Local>::from(modified))
    }

    /// Whether an entry exists and is younger than `ttl`. `None` never expires.
    pub fn is_fresh<S: AsRef<str>>(&self, identifier: &[S], ttl: Option<Duration>) -> bool {
        let Ok(meta) = std::fs::metadata(self.path(identifier)) else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        let Some(ttl) = ttl else {
            return true;
        };
        meta.modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .is_some_and(|age| age < ttl)
    }

    /// Reads an entry.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the entry is missing or unreadable.
    pub async fn read<S: AsRef<str>>(&self, identifier: &[S]) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.path(identifier)).await
    }

    /// Writes an entry, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory or file cannot be written.
    pub async fn write<S: AsRef<str>>(&self, identifier: &[S], data: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.path(identifier);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        tracing::trace!(path = %path.display(), bytes = data.len(), "cache entry written");
        Ok(path)
    }
}
