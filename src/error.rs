//! Error types for scry.

use scry_core::BackendError;

/// Top-level error type for searches, previews and rendering.
#[derive(Debug, thiserror::Error)]
pub enum ScryError {
    /// Dispatch, backend or render failure from the aggregation core.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP client construction error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScryError {
    /// Returns `true` if no backend can handle the request.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_not_implemented())
    }

    /// Returns `true` if the request should end without user-visible output.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_skip())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ScryError>;
