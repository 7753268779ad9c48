//! Reply framing for the responding side.
//!
//! [`MultipartFrameWriter::prepare`] inspects the attachments once and fixes
//! the reply's `Content-Type` and exact `Content-Length`;
//! [`MultipartFrameWriter::write_body`] then streams bytes that add up to
//! precisely that length. No chunked transfer coding is used.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{
    Boundary,
    CRLFCRLF,
    FrameError,
    JSON_CONTENT_TYPE,
    PDF_CONTENT_TYPE,
    SectionKind,
    reader::len_u64,
};
use crate::cloud::{BlobStore, BlockIds};

/// Default size of each streamed image write.
pub const DEFAULT_IMAGE_CHUNK: usize = 0x0020_0000;

/// Optional files sent alongside a JSON reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attachments {
    thumbnail: Option<PathBuf>,
    image: Option<PathBuf>,
}

impl Attachments {
    /// No attachments.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            thumbnail: None,
            image: None,
        }
    }

    /// Attach the page thumbnail.
    #[must_use]
    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail = Some(path.into());
        self
    }

    /// Attach the page image.
    #[must_use]
    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image = Some(path.into());
        self
    }

    /// Thumbnail path, if set.
    #[must_use]
    pub fn thumbnail(&self) -> Option<&Path> { self.thumbnail.as_deref() }

    /// Image path, if set.
    #[must_use]
    pub fn image(&self) -> Option<&Path> { self.image.as_deref() }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Part {
    Bytes(Bytes),
    Thumbnail { path: PathBuf, len: u64 },
    Image { path: PathBuf, len: u64 },
}

/// A framed reply whose headers are known before the body is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedReply {
    content_type: String,
    content_length: u64,
    parts: Vec<Part>,
}

impl PreparedReply {
    fn json_only(json: &str) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_owned(),
            content_length: len_u64(json.len()),
            parts: vec![Part::Bytes(Bytes::copy_from_slice(json.as_bytes()))],
        }
    }

    /// Value for the reply's `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> &str { &self.content_type }

    /// Exact number of body bytes [`MultipartFrameWriter::write_body`] emits.
    #[must_use]
    pub const fn content_length(&self) -> u64 { self.content_length }

    /// Whether the reply is framed as multipart/mixed.
    #[must_use]
    pub fn is_multipart(&self) -> bool { self.content_type.starts_with("multipart/") }
}

/// Produces JSON-only or multipart/mixed replies.
#[derive(Clone, Debug)]
pub struct MultipartFrameWriter {
    boundary: Boundary,
    chunk_size: usize,
}

impl Default for MultipartFrameWriter {
    fn default() -> Self { Self::new(Boundary::default()) }
}

impl MultipartFrameWriter {
    /// Create a writer framing sections with `boundary`.
    #[must_use]
    pub const fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            chunk_size: DEFAULT_IMAGE_CHUNK,
        }
    }

    /// Override the image streaming chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 { 1 } else { chunk_size };
        self
    }

    /// Plan a reply for `json` and whichever attachments exist on disk.
    ///
    /// Attachment paths that do not exist are ignored. Without attachments
    /// the reply is the bare JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] when an attachment exists but its metadata
    /// cannot be read.
    pub async fn prepare(
        &self,
        json: &str,
        attachments: &Attachments,
    ) -> Result<PreparedReply, FrameError> {
        let thumbnail = existing_len(attachments.thumbnail()).await?;
        let image = existing_len(attachments.image()).await?;
        if thumbnail.is_none() && image.is_none() {
            return Ok(PreparedReply::json_only(json));
        }

        let token = self.boundary.token();
        let mut parts = Vec::with_capacity(4);
        let mut json_frame = format!(
            "--{token}\r\nContent-Type: {JSON_CONTENT_TYPE}\r\nContent-Length: {}\r\n\r\n{json}",
            json.len()
        )
        .into_bytes();
        json_frame.extend_from_slice(CRLFCRLF);
        parts.push(Part::Bytes(Bytes::from(json_frame)));

        if let Some((path, len)) = thumbnail {
            parts.push(Part::Bytes(self.binary_header(SectionKind::Thumbnail, len)));
            parts.push(Part::Thumbnail { path, len });
        }
        if let Some((path, len)) = image {
            parts.push(Part::Bytes(self.binary_header(SectionKind::Image, len)));
            parts.push(Part::Image { path, len });
        }
        parts.push(Part::Bytes(Bytes::copy_from_slice(
            self.boundary.terminator(),
        )));

        let content_length = parts.iter().fold(0u64, |acc, part| {
            acc.saturating_add(match part {
                Part::Bytes(bytes) => len_u64(bytes.len()),
                Part::Thumbnail { len, .. } | Part::Image { len, .. } => {
                    len.saturating_add(len_u64(CRLFCRLF.len()))
                }
            })
        });
        debug!(content_length, "multipart reply prepared");
        Ok(PreparedReply {
            content_type: format!("multipart/mixed; boundary=\"{token}\""),
            content_length,
            parts,
        })
    }

    /// Upload attachments to `store` and plan a JSON-only reply naming them.
    ///
    /// The reply's `results.imageBlockId` and `results.thumbnailBlockId` are
    /// set whenever at least one attachment was uploaded; the missing one is
    /// `null`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidJson`] when `json` does not parse,
    /// [`FrameError::Io`] when an attachment cannot be read, and
    /// [`FrameError::Blob`] when an upload fails.
    pub async fn prepare_cloud(
        &self,
        json: &str,
        attachments: &Attachments,
        store: &dyn BlobStore,
    ) -> Result<PreparedReply, FrameError> {
        let mut reply: serde_json::Value = serde_json::from_str(json)?;
        let ids = BlockIds {
            image: upload(attachments.image(), store).await?,
            thumbnail: upload(attachments.thumbnail(), store).await?,
        };
        if ids.is_empty() {
            return Ok(PreparedReply::json_only(json));
        }
        ids.apply(&mut reply);
        debug!(image = ?ids.image, thumbnail = ?ids.thumbnail, "attachments uploaded");
        Ok(PreparedReply::json_only(&serde_json::to_string(&reply)?))
    }

    /// Write the planned body to `out`, returning the bytes written.
    ///
    /// The thumbnail is sent as one in-memory buffer with its trailing blank
    /// line appended. The image is streamed in chunks; the trailing blank line
    /// rides in the last chunk when it fits, or follows as a separate write.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::AttachmentChanged`] when an attachment shrank or
    /// grew after the size used for `Content-Length` was taken, or [`FrameError::Io`] when
    /// reading an attachment or writing to `out` fails.
    pub async fn write_body<W>(&self, reply: &PreparedReply, out: &mut W) -> Result<u64, FrameError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;
        for part in &reply.parts {
            let n = match part {
                Part::Bytes(bytes) => {
                    out.write_all(bytes).await?;
                    len_u64(bytes.len())
                }
                Part::Thumbnail { path, len } => write_thumbnail(path, *len, out).await?,
                Part::Image { path, len } => self.write_image(path, *len, out).await?,
            };
            written = written.saturating_add(n);
        }
        out.flush().await?;
        if written != reply.content_length {
            return Err(FrameError::AttachmentChanged {
                expected: reply.content_length,
                actual: written,
            });
        }
        Ok(written)
    }

    fn binary_header(&self, kind: SectionKind, len: u64) -> Bytes {
        Bytes::from(format!(
            "--{}\r\nContent-Type: {PDF_CONTENT_TYPE}\r\nContent-Length: \
             {len}\r\nContent-Transfer-Encoding: binary\r\nContent-Disposition: inline; \
             filename=\"{}\"\r\n\r\n",
            self.boundary.token(),
            kind.filename()
        ))
    }

    async fn write_image<W>(&self, path: &Path, len: u64, out: &mut W) -> Result<u64, FrameError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut file = tokio::fs::File::open(path).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent = 0u64;
        let mut trailer_inline = false;
        while sent < len {
            let want = usize::try_from(len - sent).map_or(buf.len(), |left| left.min(buf.len()));
            let Some(window) = buf.get_mut(..want) else {
                break;
            };
            let n = file.read(window).await?;
            if n == 0 {
                return Err(FrameError::AttachmentChanged {
                    expected: len,
                    actual: sent,
                });
            }
            sent = sent.saturating_add(len_u64(n));
            let end = n + CRLFCRLF.len();
            let tail = if sent == len { buf.get_mut(n..end) } else { None };
            if let Some(tail) = tail {
                tail.copy_from_slice(CRLFCRLF);
                trailer_inline = true;
                out.write_all(buf.get(..end).unwrap_or_default()).await?;
            } else {
                out.write_all(buf.get(..n).unwrap_or_default()).await?;
            }
        }
        let mut extra = [0u8; 1];
        if file.read(&mut extra).await? > 0 {
            let actual = file.metadata().await?.len();
            return Err(FrameError::AttachmentChanged {
                expected: len,
                actual,
            });
        }
        if !trailer_inline {
            out.write_all(CRLFCRLF).await?;
        }
        Ok(sent.saturating_add(len_u64(CRLFCRLF.len())))
    }
}

async fn existing_len(path: Option<&Path>) -> Result<Option<(PathBuf, u64)>, FrameError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some((path.to_path_buf(), meta.len()))),
        Ok(_) => {
            warn!(path = %path.display(), "attachment is not a regular file; skipping");
            Ok(None)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "attachment absent");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

async fn write_thumbnail<W>(path: &Path, len: u64, out: &mut W) -> Result<u64, FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut data = tokio::fs::read(path).await?;
    let actual = len_u64(data.len());
    if actual != len {
        return Err(FrameError::AttachmentChanged {
            expected: len,
            actual,
        });
    }
    data.extend_from_slice(CRLFCRLF);
    out.write_all(&data).await?;
    Ok(len_u64(data.len()))
}

async fn upload(path: Option<&Path>, store: &dyn BlobStore) -> Result<Option<String>, FrameError> {
    let Some((path, _)) = existing_len(path).await? else {
        return Ok(None);
    };
    let data = tokio::fs::read(&path).await?;
    Ok(Some(store.upload(Bytes::from(data)).await?))
}
