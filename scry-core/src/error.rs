//! Error types for the scry-core crate.
//!
//! The variants separate failures that stay local to one backend from
//! failures that abort dispatch. Messages are stable and contain no
//! credentials, so they are safe to show to end users.

/// Errors produced while dispatching to, running or rendering backends.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// No backend is registered for the requested discriminator, or the
    /// requested backend is disabled.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The input locator is malformed (no host, no scheme, bad post id).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single backend failed while fetching or parsing.
    #[error("backend failure: {0}")]
    Backend(String),

    /// The input resolves to nothing renderable; callers should stay silent.
    #[error("skipped: {0}")]
    Skip(String),

    /// A scarce resource did not become ready before its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The rendering collaborator failed.
    #[error("render error: {0}")]
    Render(String),

    /// Invalid aggregation or render configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl BackendError {
    /// Returns `true` for [`BackendError::NotImplemented`].
    ///
    /// Link dispatch uses this to fall back from domain to scheme lookup.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }

    /// Returns `true` when the caller should suppress user-visible output.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

/// Convenience type alias for scry-core results.
pub type Result<T> = std::result::Result<T, BackendError>;
