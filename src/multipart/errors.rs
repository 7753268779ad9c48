//! Error types for multipart framing and reply classification.

use thiserror::Error;
use tokio::io;

use super::SectionKind;
use crate::cloud::BlobError;

/// Errors raised while classifying, parsing, or producing a reply body.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The buffer did not start with the boundary separator or terminator.
    #[error("multipart data does not start with the boundary")]
    BoundaryMisaligned,
    /// No blank line ended the section header before the buffer limit.
    #[error("section header exceeds {limit} bytes")]
    HeaderTooLarge {
        /// Configured buffer limit.
        limit: usize,
    },
    /// A JSON section is larger than the buffer limit.
    #[error("JSON section of {declared} bytes exceeds {limit} byte buffer")]
    BufferLimit {
        /// Declared section length.
        declared: u64,
        /// Configured buffer limit.
        limit: usize,
    },
    /// A header line was not `Name: value` ASCII text.
    #[error("malformed section header line")]
    InvalidHeader,
    /// A section header carried no `Content-Length`.
    #[error("section is missing Content-Length")]
    MissingContentLength,
    /// A section `Content-Length` was not a decimal byte count.
    #[error("invalid section Content-Length {0:?}")]
    InvalidContentLength(String),
    /// A section content type was neither JSON nor binary.
    #[error("unrecognized section content type {0:?}")]
    UnrecognizedSection(String),
    /// More than one JSON section appeared in a reply.
    #[error("duplicate JSON section")]
    DuplicateJson,
    /// A multipart reply finished without a JSON section.
    #[error("multipart reply has no JSON section")]
    MissingJson,
    /// More bytes arrived than the reply declared.
    #[error("received {consumed} bytes but {declared} were declared")]
    Overflow {
        /// Bytes received or consumed so far.
        consumed: u64,
        /// Declared total length.
        declared: u64,
    },
    /// A boundary line appeared inside the declared JSON body.
    #[error("boundary found inside JSON section")]
    EmbeddedBoundary,
    /// JSON section bytes were not UTF-8.
    #[error("JSON body is not valid UTF-8")]
    InvalidUtf8,
    /// JSON section text did not parse.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// A section body was not followed by a blank line.
    #[error("section body is not followed by CRLF CRLF")]
    MissingTrailer,
    /// The stream ended before the boundary terminator.
    #[error("unexpected end of multipart stream")]
    UnexpectedEof,
    /// A binary section arrived with no destination file configured.
    #[error("no output file configured for {0} section")]
    MissingOutput(SectionKind),
    /// An attachment changed size between planning and writing.
    #[error("attachment changed size: expected {expected} bytes, found {actual}")]
    AttachmentChanged {
        /// Length used for `Content-Length`.
        expected: u64,
        /// Length observed while writing.
        actual: u64,
    },
    /// The reply content type header was absent or malformed.
    #[error("invalid content type {0:?}")]
    InvalidContentType(String),
    /// A multipart reply carried no boundary parameter.
    #[error("multipart content type has no boundary")]
    MissingBoundary,
    /// A JSON reply used a charset other than UTF-8.
    #[error("unsupported charset {0:?}")]
    UnsupportedCharset(String),
    /// The reply media type is neither JSON nor multipart/mixed.
    #[error("unsupported media type {0:?}")]
    UnsupportedMediaType(String),
    /// A boundary token is not usable in a delimiter line.
    #[error("invalid boundary token {0:?}")]
    InvalidBoundary(String),
    /// The transport failed while delivering the body.
    #[error("transport error: {0}")]
    Transport(io::Error),
    /// Attachment upload or download failed.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Stable error code recorded on the transaction.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BoundaryMisaligned => "boundaryMisaligned",
            Self::HeaderTooLarge { .. } => "headerTooLarge",
            Self::BufferLimit { .. } => "bufferLimit",
            Self::InvalidHeader => "invalidHeader",
            Self::MissingContentLength => "missingContentLength",
            Self::InvalidContentLength(_) => "invalidContentLength",
            Self::UnrecognizedSection(_) => "unrecognizedSection",
            Self::DuplicateJson => "duplicateJson",
            Self::MissingJson => "missingJson",
            Self::Overflow { .. } => "overflow",
            Self::EmbeddedBoundary => "embeddedBoundary",
            Self::InvalidUtf8 => "invalidUtf8",
            Self::InvalidJson(_) => "invalidJson",
            Self::MissingTrailer => "missingTrailer",
            Self::UnexpectedEof => "unexpectedEof",
            Self::MissingOutput(_) => "missingOutput",
            Self::AttachmentChanged { .. } => "attachmentChanged",
            Self::InvalidContentType(_) => "invalidContentType",
            Self::MissingBoundary => "missingBoundary",
            Self::UnsupportedCharset(_) => "unsupportedCharset",
            Self::UnsupportedMediaType(_) => "unsupportedMediaType",
            Self::InvalidBoundary(_) => "invalidBoundary",
            Self::Transport(_) => "communicationError",
            Self::Blob(_) => "blobTransfer",
            Self::Io(_) => "fileError",
        }
    }

    /// Whether the failure lies in the peer's framing rather than local I/O.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        !matches!(self, Self::Transport(_) | Self::Blob(_) | Self::Io(_))
    }
}
