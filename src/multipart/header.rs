//! Parsing of a single section's header block.

use super::{FrameError, MediaType, SectionKind, content_type::parse_params};

/// Parsed header block of one multipart section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionHeader {
    kind: SectionKind,
    content_length: u64,
    lines: Vec<String>,
}

impl SectionHeader {
    /// Parse the CRLF-separated header lines between the separator and the
    /// blank line.
    ///
    /// `Content-Type` selects JSON versus binary content and
    /// `Content-Disposition` tells an image from a thumbnail; binary sections
    /// without a recognizable filename are treated as images.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidHeader`] for non-ASCII or malformed lines,
    /// [`FrameError::MissingContentLength`] or
    /// [`FrameError::InvalidContentLength`] for an unusable length, and
    /// [`FrameError::UnrecognizedSection`] for an unsupported content type.
    pub fn parse(block: &[u8]) -> Result<Self, FrameError> {
        if !block.is_ascii() {
            return Err(FrameError::InvalidHeader);
        }
        let text = std::str::from_utf8(block).map_err(|_| FrameError::InvalidHeader)?;

        let mut lines = Vec::new();
        let mut media = None;
        let mut content_length = None;
        let mut disposition = None;
        for line in text.split("\r\n").filter(|line| !line.is_empty()) {
            let (name, value) = line.split_once(':').ok_or(FrameError::InvalidHeader)?;
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "content-type" => media = Some(MediaType::parse(value)?),
                "content-length" => {
                    let length = value
                        .parse::<u64>()
                        .map_err(|_| FrameError::InvalidContentLength(value.to_owned()))?;
                    content_length = Some(length);
                }
                "content-disposition" => disposition = Some(value.to_owned()),
                _ => {}
            }
            lines.push(line.to_owned());
        }

        let media = media.ok_or_else(|| FrameError::UnrecognizedSection(String::new()))?;
        let kind = if media.is_json() {
            SectionKind::Json
        } else if media.is_binary() {
            binary_kind(disposition.as_deref())
        } else {
            return Err(FrameError::UnrecognizedSection(media.essence().to_owned()));
        };
        let content_length = content_length.ok_or(FrameError::MissingContentLength)?;
        Ok(Self {
            kind,
            content_length,
            lines,
        })
    }

    /// Content kind selected by the headers.
    #[must_use]
    pub const fn kind(&self) -> SectionKind { self.kind }

    /// Declared body length.
    #[must_use]
    pub const fn content_length(&self) -> u64 { self.content_length }

    /// Header lines as received.
    #[must_use]
    pub fn lines(&self) -> &[String] { &self.lines }

    /// Consume the header, keeping only its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> { self.lines }
}

fn binary_kind(disposition: Option<&str>) -> SectionKind {
    let is_thumbnail = disposition
        .map(|value| value.split_once(';').map_or("", |(_, rest)| rest))
        .map(parse_params)
        .is_some_and(|params| {
            params.iter().any(|(name, value)| {
                name == "filename" && value.to_ascii_lowercase().starts_with("thumbnail")
            })
        });
    if is_thumbnail {
        SectionKind::Thumbnail
    } else {
        SectionKind::Image
    }
}
