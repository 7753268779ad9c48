//! Engine construction and reply errors.

use thiserror::Error;

use crate::multipart::FrameError;

/// Failures while building an [`Engine`](super::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    /// The configured multipart boundary is unusable.
    #[error("invalid boundary configuration: {0}")]
    Boundary(#[from] FrameError),
}

/// Failures while building a reply on the responding side.
#[derive(Debug, Error)]
pub enum ReplyError {
    /// Planning the reply body failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The status or a header value is not valid HTTP.
    #[error("invalid reply head: {0}")]
    Head(#[from] axum::http::Error),
}

impl ReplyError {
    /// Stable error code, as recorded for a transaction.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Frame(e) => e.code(),
            Self::Head(_) => "invalidReply",
        }
    }
}
