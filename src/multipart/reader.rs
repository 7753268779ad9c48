//! Incremental multipart/mixed reply parser.
//!
//! [`MultipartFrameReader`] is a sans-IO [`Decoder`]: the caller appends
//! whatever the transport delivered to a [`BytesMut`] and calls
//! [`Decoder::decode`] until it yields `None`. Reads of any size, down to a
//! single byte, produce the same event sequence. Unconsumed bytes stay in the
//! caller's buffer between calls, so a boundary split across reads is found
//! once its remainder arrives.

use bytes::{Buf, Bytes, BytesMut};
use serde::de::IgnoredAny;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use super::{Boundary, CRLFCRLF, FrameError, SectionHeader, SectionKind, find};
use crate::tally::TransferTally;

/// Default cap on bytes held while scanning a header or JSON section.
pub const DEFAULT_BUFFER_LIMIT: usize = 512 * 1024;

/// Output of the multipart decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// The validated JSON section text.
    Json(String),
    /// A slice of binary section body, in order.
    Binary {
        /// Section the bytes belong to.
        kind: SectionKind,
        /// Body bytes with framing removed.
        chunk: Bytes,
    },
    /// A binary section body and its trailing blank line were consumed.
    SectionComplete(SectionKind),
    /// The boundary terminator was consumed.
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadState {
    HeaderScan,
    Json { declared: usize },
    Binary { kind: SectionKind, remaining: u64 },
    Trailer { kind: SectionKind },
    Done,
}

enum Step {
    Emit(FrameEvent),
    Continue,
    NeedMore,
}

/// Streaming parser for a multipart/mixed reply body.
#[derive(Debug)]
pub struct MultipartFrameReader {
    boundary: Boundary,
    state: ReadState,
    tally: TransferTally,
    buffer_limit: usize,
    seen_json: bool,
}

impl MultipartFrameReader {
    /// Create a reader for a body split on `boundary`.
    ///
    /// `declared` is the reply's `Content-Length`, when the transport sent
    /// one; reads beyond it are reported as overflow.
    #[must_use]
    pub fn new(boundary: Boundary, declared: Option<u64>) -> Self {
        Self {
            boundary,
            state: ReadState::HeaderScan,
            tally: TransferTally::new(declared),
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            seen_json: false,
        }
    }

    /// Override the header and JSON buffering limit.
    #[must_use]
    pub const fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    /// Account `n` bytes received from the transport.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Overflow`] once more bytes have been read than
    /// the reply declared.
    pub fn note_read(&mut self, n: usize) -> Result<(), FrameError> {
        self.tally.add_read(len_u64(n));
        match self.tally.declared() {
            Some(declared) if self.tally.read() > declared => Err(FrameError::Overflow {
                consumed: self.tally.read(),
                declared,
            }),
            _ => Ok(()),
        }
    }

    /// Counters for this reply.
    #[must_use]
    pub const fn tally(&self) -> &TransferTally { &self.tally }

    /// Consume the reader, keeping its counters.
    #[must_use]
    pub fn into_tally(self) -> TransferTally { self.tally }

    /// Whether the boundary terminator has been consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.state == ReadState::Done }

    fn advance(
        &mut self,
        src: &mut BytesMut,
        at_eof: bool,
    ) -> Result<Option<FrameEvent>, FrameError> {
        loop {
            let step = match self.state {
                ReadState::HeaderScan => self.scan_header(src, at_eof)?,
                ReadState::Json { declared } => self.read_json(src, declared, at_eof)?,
                ReadState::Binary { kind, remaining } => self.read_binary(src, kind, remaining),
                ReadState::Trailer { kind } => self.read_trailer(src, kind)?,
                ReadState::Done => self.discard_epilogue(src),
            };
            match step {
                Step::Emit(event) => return Ok(Some(event)),
                Step::Continue => {}
                Step::NeedMore => return Ok(None),
            }
        }
    }

    fn scan_header(&mut self, src: &mut BytesMut, at_eof: bool) -> Result<Step, FrameError> {
        let separator = self.boundary.separator();
        let terminator = self.boundary.terminator();
        if src.starts_with(terminator) {
            let consumed = terminator.len();
            src.advance(consumed);
            self.tally.add_processed(len_u64(consumed));
            self.state = ReadState::Done;
            debug!(
                processed = self.tally.processed(),
                read = self.tally.read(),
                "multipart terminator reached"
            );
            return Ok(Step::Emit(FrameEvent::Finished));
        }
        if !src.starts_with(separator) {
            let partial =
                separator.starts_with(src.as_ref()) || terminator.starts_with(src.as_ref());
            if !partial {
                return Err(FrameError::BoundaryMisaligned);
            }
            if !at_eof {
                self.check_exhausted()?;
            }
            return Ok(Step::NeedMore);
        }

        // The separator's own CRLF may open the blank line of an empty header.
        let search_from = separator.len().saturating_sub(2);
        let separator_len = separator.len();
        let Some(offset) = src
            .get(search_from..)
            .and_then(|tail| find(tail, CRLFCRLF))
        else {
            if src.len() >= self.buffer_limit {
                return Err(FrameError::HeaderTooLarge {
                    limit: self.buffer_limit,
                });
            }
            if !at_eof {
                self.check_exhausted()?;
            }
            return Ok(Step::NeedMore);
        };
        let blank = search_from + offset;
        let header_end = blank + CRLFCRLF.len();
        let block = src.get(separator_len..blank).unwrap_or_default();
        let header = SectionHeader::parse(block)?;
        src.advance(header_end);
        self.tally.add_processed(len_u64(header_end));
        self.begin_section(header)
    }

    fn begin_section(&mut self, header: SectionHeader) -> Result<Step, FrameError> {
        let kind = header.kind();
        let declared = header.content_length();
        debug!(section = %kind, declared, "multipart section header");

        if let Some(total) = self.tally.declared() {
            let needed = self.tally.processed().saturating_add(declared);
            if needed > total {
                return Err(FrameError::Overflow {
                    consumed: needed,
                    declared: total,
                });
            }
        }

        self.state = match kind {
            SectionKind::Json => {
                if self.seen_json {
                    return Err(FrameError::DuplicateJson);
                }
                self.seen_json = true;
                ReadState::Json {
                    declared: self.json_window(declared)?,
                }
            }
            SectionKind::Image | SectionKind::Thumbnail => ReadState::Binary {
                kind,
                remaining: declared,
            },
        };
        self.tally.begin_section(kind, declared, header.into_lines());
        Ok(Step::Continue)
    }

    fn json_window(&self, declared: u64) -> Result<usize, FrameError> {
        let too_large = FrameError::BufferLimit {
            declared,
            limit: self.buffer_limit,
        };
        let Ok(length) = usize::try_from(declared) else {
            return Err(too_large);
        };
        let window = length
            .saturating_add(CRLFCRLF.len())
            .saturating_add(self.boundary.terminator().len());
        if window > self.buffer_limit {
            return Err(too_large);
        }
        Ok(length)
    }

    fn read_json(
        &mut self,
        src: &mut BytesMut,
        declared: usize,
        at_eof: bool,
    ) -> Result<Step, FrameError> {
        let trailer_end = declared + CRLFCRLF.len();
        // Hold back until the next boundary line could be inspected as well.
        let needed = if at_eof {
            trailer_end
        } else {
            trailer_end + self.boundary.terminator().len()
        };
        if src.len() < needed {
            return Ok(Step::NeedMore);
        }

        let body = src.get(..declared).unwrap_or_default();
        if find(body, self.boundary.separator()).is_some()
            || find(body, self.boundary.terminator()).is_some()
        {
            return Err(FrameError::EmbeddedBoundary);
        }
        let text = std::str::from_utf8(body).map_err(|_| FrameError::InvalidUtf8)?;
        serde_json::from_str::<IgnoredAny>(text)?;
        if src.get(declared..trailer_end) != Some(CRLFCRLF) {
            return Err(FrameError::MissingTrailer);
        }
        let json = text.to_owned();

        src.advance(trailer_end);
        self.tally.add_section_processed(len_u64(declared));
        self.tally.add_processed(len_u64(CRLFCRLF.len()));
        self.state = ReadState::HeaderScan;
        debug!(
            section_processed = declared,
            processed = self.tally.processed(),
            "JSON section read"
        );
        Ok(Step::Emit(FrameEvent::Json(json)))
    }

    fn read_binary(&mut self, src: &mut BytesMut, kind: SectionKind, remaining: u64) -> Step {
        if remaining == 0 {
            self.state = ReadState::Trailer { kind };
            return Step::Continue;
        }
        if src.is_empty() {
            return Step::NeedMore;
        }
        let take = usize::try_from(remaining).map_or(src.len(), |left| left.min(src.len()));
        let chunk = src.split_to(take).freeze();
        let taken = len_u64(take);
        self.tally.add_section_processed(taken);
        self.state = ReadState::Binary {
            kind,
            remaining: remaining - taken,
        };
        trace!(section = %kind, len = take, remaining = remaining - taken, "binary chunk");
        Step::Emit(FrameEvent::Binary { kind, chunk })
    }

    fn read_trailer(&mut self, src: &mut BytesMut, kind: SectionKind) -> Result<Step, FrameError> {
        if src.len() < CRLFCRLF.len() {
            return if CRLFCRLF.starts_with(src.as_ref()) {
                Ok(Step::NeedMore)
            } else {
                Err(FrameError::MissingTrailer)
            };
        }
        if !src.starts_with(CRLFCRLF) {
            return Err(FrameError::MissingTrailer);
        }
        src.advance(CRLFCRLF.len());
        self.tally.add_processed(len_u64(CRLFCRLF.len()));
        self.state = ReadState::HeaderScan;
        debug!(section = %kind, processed = self.tally.processed(), "binary section read");
        Ok(Step::Emit(FrameEvent::SectionComplete(kind)))
    }

    fn discard_epilogue(&mut self, src: &mut BytesMut) -> Step {
        if !src.is_empty() {
            let len = src.len();
            src.advance(len);
            self.tally.add_processed(len_u64(len));
            debug!(len, "discarded bytes after multipart terminator");
        }
        Step::NeedMore
    }

    /// Nothing declared is left to read, yet another section is expected.
    fn check_exhausted(&self) -> Result<(), FrameError> {
        match self.tally.declared() {
            Some(declared) if self.tally.processed() >= declared => Err(FrameError::Overflow {
                consumed: self.tally.processed(),
                declared,
            }),
            _ => Ok(()),
        }
    }
}

impl Decoder for MultipartFrameReader {
    type Error = FrameError;
    type Item = FrameEvent;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.advance(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.advance(src, true)? {
            Some(event) => Ok(Some(event)),
            None if self.is_finished() => Ok(None),
            None => Err(FrameError::UnexpectedEof),
        }
    }
}

pub(crate) fn len_u64(n: usize) -> u64 { u64::try_from(n).unwrap_or(u64::MAX) }
