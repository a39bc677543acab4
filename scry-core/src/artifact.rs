//! Scoped temporary artifacts owned by a request.
//!
//! Backends download thumbnails and media while they run. Each download is
//! wrapped in a [`TempArtifact`] and handed to the request's
//! [`crate::Accumulator`] (or link preview), which releases every artifact
//! once rendering finishes. Release is idempotent and also happens on drop,
//! so early returns, errors and cancelled futures never leak files.
//!
//! Two kinds exist:
//!
//! - **owned** artifacts are private temp files and are deleted on release;
//! - **borrowed** artifacts point into a persistent cache and are only
//!   detached on release.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

/// A file referenced by a rendered document for the lifetime of one request.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    owned: bool,
    released: AtomicBool,
}

impl TempArtifact {
    /// Writes `bytes` to a new owned temp file in the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be created or written.
    pub fn from_bytes(bytes: &[u8]) -> std::io::Result<Self> {
        Self::from_bytes_in(&std::env::temp_dir(), bytes)
    }

    /// Writes `bytes` to a new owned temp file inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be created or written.
    pub fn from_bytes_in(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("scry-artifact-")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        tracing::trace!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(Self {
            path,
            owned: true,
            released: AtomicBool::new(false),
        })
    }

    /// Wraps an existing cache file. Releasing it never deletes the file.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: false,
            released: AtomicBool::new(false),
        }
    }

    /// Filesystem path of the artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether release deletes the file.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// `file://` URL the rendering collaborator can load.
    pub fn url(&self) -> String {
        Url::from_file_path(&self.path)
            .map(|u| u.to_string())
            .unwrap_or_else(|()| self.path.display().to_string())
    }

    /// Releases the artifact. Only the first call has an effect.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owned {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %self.path.display(), error = %e, "artifact cleanup failed");
                }
            }
        }
    }

    /// Whether [`TempArtifact::release`] has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.release();
    }
}

/// The artifacts owned by one accumulator or preview.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    items: Vec<TempArtifact>,
}

impl ArtifactSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of an artifact.
    pub fn push(&mut self, artifact: TempArtifact) {
        self.items.push(artifact);
    }

    /// Moves every artifact from `other` into this set.
    pub fn append(&mut self, other: &mut ArtifactSet) {
        self.items.append(&mut other.items);
    }

    /// Number of artifacts held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the set holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the held artifacts.
    pub fn iter(&self) -> impl Iterator<Item = &TempArtifact> {
        self.items.iter()
    }

    /// Acquires every artifact for the duration of the returned scope.
    ///
    /// All artifacts are released when the scope is dropped.
    pub fn scope(&self) -> ArtifactScope<'_> {
        tracing::trace!(count = self.items.len(), "artifacts acquired");
        ArtifactScope { set: self }
    }

    /// Releases every artifact now.
    pub fn release_all(&self) {
        for artifact in &self.items {
            artifact.release();
        }
    }
}

impl Extend<TempArtifact> for ArtifactSet {
    fn extend<T: IntoIterator<Item = TempArtifact>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

/// Guard returned by [`ArtifactSet::scope`].
#[derive(Debug)]
pub struct ArtifactScope<'a> {
    set: &'a ArtifactSet,
}

impl Drop for ArtifactScope<'_> {
    fn drop(&mut self) {
        self.set.release_all();
        tracing::trace!(count = self.set.len(), "artifacts released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_artifact_deleted_on_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = TempArtifact::from_bytes_in(dir.path(), b"thumb").expect("write");
        let path = artifact.path().to_path_buf();
        assert_eq!(std::fs::read(&path).expect("read"), b"thumb");
        artifact.release();
        assert!(!path.exists());
        assert!(artifact.is_released());
    }

    #[test]
    fn borrowed_artifact_survives_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("photo");
        std::fs::write(&path, b"cached").expect("write");
        let artifact = TempArtifact::borrowed(&path);
        artifact.release();
        assert!(path.exists());
        assert!(!artifact.is_owned());
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = TempArtifact::from_bytes_in(dir.path(), b"x").expect("write");
        artifact.release();
        artifact.release();
        assert!(artifact.is_released());
    }

    #[test]
    fn drop_releases_owned_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = {
            let artifact = TempArtifact::from_bytes_in(dir.path(), b"x").expect("write");
            artifact.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn scope_releases_every_artifact_even_on_early_exit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut set = ArtifactSet::new();
        set.push(TempArtifact::from_bytes_in(dir.path(), b"a").expect("write"));
        set.push(TempArtifact::from_bytes_in(dir.path(), b"b").expect("write"));

        let failing = |set: &ArtifactSet| -> Result<(), &'static str> {
            let _scope = set.scope();
            Err("render failed")
        };
        assert!(failing(&set).is_err());
        assert!(set.iter().all(TempArtifact::is_released));
    }

    #[test]
    fn append_moves_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut a = ArtifactSet::new();
        let mut b = ArtifactSet::new();
        b.push(TempArtifact::from_bytes_in(dir.path(), b"b").expect("write"));
        a.append(&mut b);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn url_is_file_scheme() {
        let artifact = TempArtifact::borrowed("/tmp/scry/photo.jpg");
        assert!(artifact.url().starts_with("file:///"));
    }
}
