//! Drive a [`MultipartFrameReader`] over a byte stream into output files.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_util::codec::Decoder;
use tracing::debug;

use super::{FrameError, FrameEvent, MultipartFrameReader, SectionKind};

/// Destinations for binary sections of a reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputFiles {
    image: Option<PathBuf>,
    thumbnail: Option<PathBuf>,
}

impl OutputFiles {
    /// No destinations; any binary section is an error.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            image: None,
            thumbnail: None,
        }
    }

    /// Write the image section to `path`.
    #[must_use]
    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image = Some(path.into());
        self
    }

    /// Write the thumbnail section to `path`.
    #[must_use]
    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail = Some(path.into());
        self
    }

    /// Destination for a section kind.
    #[must_use]
    pub fn path_for(&self, kind: SectionKind) -> Option<&Path> {
        match kind {
            SectionKind::Image => self.image.as_deref(),
            SectionKind::Thumbnail => self.thumbnail.as_deref(),
            SectionKind::Json => None,
        }
    }
}

/// What a multipart reply delivered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartPayload {
    /// JSON section text.
    pub json: String,
    /// Files written, in section order.
    pub files: Vec<(SectionKind, PathBuf)>,
}

#[derive(Default)]
struct OpenFiles {
    image: Option<File>,
    thumbnail: Option<File>,
}

impl OpenFiles {
    const fn slot(&mut self, kind: SectionKind) -> Option<&mut Option<File>> {
        match kind {
            SectionKind::Image => Some(&mut self.image),
            SectionKind::Thumbnail => Some(&mut self.thumbnail),
            SectionKind::Json => None,
        }
    }
}

/// Read a multipart body from `body`, writing binary sections to `outputs`.
///
/// Each transport chunk is accounted with [`MultipartFrameReader::note_read`]
/// before it is decoded. The reader keeps its tally for the caller.
///
/// # Errors
///
/// Returns [`FrameError::Transport`] when the stream fails, any framing error
/// raised by the reader, [`FrameError::MissingOutput`] for a binary section
/// without destination, [`FrameError::MissingJson`] for a reply without JSON,
/// and [`FrameError::Io`] when an output file cannot be written.
pub async fn read_multipart<S, E>(
    reader: &mut MultipartFrameReader,
    mut body: S,
    outputs: &OutputFiles,
) -> Result<MultipartPayload, FrameError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut buf = BytesMut::new();
    let mut open = OpenFiles::default();
    let mut json = None;
    let mut files = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| FrameError::Transport(std::io::Error::other(err)))?;
        reader.note_read(chunk.len())?;
        buf.extend_from_slice(&chunk);
        debug!(
            xfer = chunk.len(),
            read = reader.tally().read(),
            declared = ?reader.tally().declared(),
            "multipart read"
        );
        while let Some(event) = reader.decode(&mut buf)? {
            handle(event, outputs, &mut open, &mut json, &mut files).await?;
        }
    }
    while let Some(event) = reader.decode_eof(&mut buf)? {
        handle(event, outputs, &mut open, &mut json, &mut files).await?;
    }

    let json = json.ok_or(FrameError::MissingJson)?;
    Ok(MultipartPayload { json, files })
}

async fn handle(
    event: FrameEvent,
    outputs: &OutputFiles,
    open: &mut OpenFiles,
    json: &mut Option<String>,
    files: &mut Vec<(SectionKind, PathBuf)>,
) -> Result<(), FrameError> {
    match event {
        FrameEvent::Json(text) => *json = Some(text),
        FrameEvent::Binary { kind, chunk } => {
            let file = file_for(kind, outputs, open).await?;
            file.write_all(&chunk).await?;
        }
        FrameEvent::SectionComplete(kind) => {
            // Zero-length sections never produced a chunk; create the file anyway.
            let file = file_for(kind, outputs, open).await?;
            file.flush().await?;
            if let Some(path) = outputs.path_for(kind) {
                debug!(section = %kind, path = %path.display(), "attachment written");
                files.push((kind, path.to_path_buf()));
            }
            if let Some(slot) = open.slot(kind) {
                *slot = None;
            }
        }
        FrameEvent::Finished => {}
    }
    Ok(())
}

async fn file_for<'a>(
    kind: SectionKind,
    outputs: &OutputFiles,
    open: &'a mut OpenFiles,
) -> Result<&'a mut File, FrameError> {
    let path = outputs.path_for(kind).ok_or(FrameError::MissingOutput(kind))?;
    let slot = open.slot(kind).ok_or(FrameError::MissingOutput(kind))?;
    if slot.is_none() {
        *slot = Some(File::create(path).await?);
    }
    slot.as_mut().ok_or(FrameError::MissingOutput(kind))
}
