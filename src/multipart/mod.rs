//! Multipart/mixed framing for TWAIN Local replies.
//!
//! A reply carrying attachments is framed as a sequence of sections:
//!
//! ```text
//! --<boundary>\r\n<headers>\r\n\r\n<body>\r\n\r\n
//! ```
//!
//! terminated by `--<boundary>--\r\n`. The JSON envelope is always present;
//! the thumbnail and image sections are optional. [`MultipartFrameReader`]
//! parses such a stream incrementally and [`MultipartFrameWriter`] produces
//! one with an exact `Content-Length`.

pub mod content_type;
mod errors;
mod header;
pub mod reader;
pub mod sink;
pub mod writer;

use std::fmt;

pub use content_type::{MediaType, ReplyFormat, classify_reply};
pub use errors::FrameError;
pub use header::SectionHeader;
pub use reader::{FrameEvent, MultipartFrameReader};
pub use sink::{MultipartPayload, OutputFiles, read_multipart};
pub use writer::{Attachments, MultipartFrameWriter, PreparedReply};

/// Boundary token used by TWAIN Direct devices.
pub const DEFAULT_BOUNDARY: &str = "WaFfLeSaReTaStY";

/// Blank line closing a header block and trailing every section body.
pub const CRLFCRLF: &[u8] = b"\r\n\r\n";

/// Content type of JSON bodies and JSON sections.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Content type of binary attachment sections.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Longest boundary token permitted by RFC 2046.
const MAX_BOUNDARY_LEN: usize = 70;

/// Content carried by one multipart section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// The JSON command reply.
    Json,
    /// The full page image.
    Image,
    /// The page thumbnail.
    Thumbnail,
}

impl SectionKind {
    /// Attachment filename advertised in `Content-Disposition`.
    #[must_use]
    pub const fn filename(self) -> &'static str {
        match self {
            Self::Json => "reply.json",
            Self::Image => "image.pdf",
            Self::Thumbnail => "thumbnail.pdf",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Image => "image",
            Self::Thumbnail => "thumbnail",
        })
    }
}

/// Boundary token with its precomputed separator and terminator lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Boundary {
    token: String,
    separator: Vec<u8>,
    terminator: Vec<u8>,
}

impl Boundary {
    /// Validate `token` and build its delimiter lines.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidBoundary`] if the token is empty, longer
    /// than 70 bytes, or contains characters that cannot appear unquoted in a
    /// delimiter line.
    pub fn new(token: impl Into<String>) -> Result<Self, FrameError> {
        let token = token.into();
        let valid = !token.is_empty()
            && token.len() <= MAX_BOUNDARY_LEN
            && token
                .bytes()
                .all(|b| (b.is_ascii_graphic() && b != b'"') || b == b' ')
            && !token.ends_with(' ');
        if !valid {
            return Err(FrameError::InvalidBoundary(token));
        }
        let separator = format!("--{token}\r\n").into_bytes();
        let terminator = format!("--{token}--\r\n").into_bytes();
        Ok(Self {
            token,
            separator,
            terminator,
        })
    }

    /// The bare boundary token.
    #[must_use]
    pub fn token(&self) -> &str { &self.token }

    /// `--token\r\n`, which opens every section.
    #[must_use]
    pub fn separator(&self) -> &[u8] { &self.separator }

    /// `--token--\r\n`, which ends the stream.
    #[must_use]
    pub fn terminator(&self) -> &[u8] { &self.terminator }
}

impl Default for Boundary {
    fn default() -> Self {
        let token = DEFAULT_BOUNDARY.to_owned();
        Self {
            separator: format!("--{token}\r\n").into_bytes(),
            terminator: format!("--{token}--\r\n").into_bytes(),
            token,
        }
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
