//! Server side of a transaction: answer one request exactly once.

use std::{future, io, sync::Arc};

use axum::{
    body::Body,
    http::{Response, StatusCode, header},
};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{Instrument, debug, info, warn};

use super::ReplyError;
use crate::{
    cloud::BlobStore,
    multipart::{Attachments, FrameError, MultipartFrameWriter, PreparedReply},
};

/// Body sent when the `X-Privet-Token` header is missing or wrong.
pub const INVALID_TOKEN_BODY: &str = "{\"error\":\"invalid_x_privet_token\",\"description\":\"\
                                      X-Privet-Token missing or invalid...\"}";

const PIPE_CAPACITY: usize = 64 * 1024;

/// Builds the one HTTP reply a request gets.
///
/// The reply head carries the exact `Content-Length` planned by the
/// [`MultipartFrameWriter`]; the body streams from a task writing the planned
/// sections. A responder is spent by its first reply; later attempts are
/// logged and yield `None`.
pub struct Responder {
    writer: MultipartFrameWriter,
    blobs: Option<Arc<dyn BlobStore>>,
    spent: bool,
}

impl Responder {
    pub(crate) const fn new(writer: MultipartFrameWriter, blobs: Option<Arc<dyn BlobStore>>) -> Self {
        Self {
            writer,
            blobs,
            spent: false,
        }
    }

    /// Whether a reply has been built.
    #[must_use]
    pub const fn is_spent(&self) -> bool { self.spent }

    /// Reply with `status`, the `json` payload and whichever attachments
    /// exist.
    ///
    /// Locally the attachments are framed as multipart/mixed; with a blob
    /// store they are uploaded and the JSON names them instead.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Frame`] when planning the reply fails and
    /// [`ReplyError::Head`] for a status outside `100..=999`. A failure while
    /// the body streams ends the body with an error instead.
    pub async fn respond(
        &mut self,
        status: u16,
        json: &str,
        attachments: &Attachments,
    ) -> Result<Option<Response<Body>>, ReplyError> {
        if !self.claim() {
            return Ok(None);
        }
        let reply = match self.blobs.as_deref() {
            Some(store) => self.writer.prepare_cloud(json, attachments, store).await?,
            None => self.writer.prepare(json, attachments).await?,
        };
        self.build(status, reply).map(Some)
    }

    /// Reply `400` with the fixed invalid-token body, ignoring attachments.
    ///
    /// # Errors
    ///
    /// As for [`Responder::respond`].
    pub async fn reject_invalid_token(&mut self) -> Result<Option<Response<Body>>, ReplyError> {
        if !self.claim() {
            return Ok(None);
        }
        let reply = self
            .writer
            .prepare(INVALID_TOKEN_BODY, &Attachments::none())
            .await?;
        self.build(StatusCode::BAD_REQUEST.as_u16(), reply).map(Some)
    }

    fn claim(&mut self) -> bool {
        if self.spent {
            warn!("reply already sent; ignoring second response");
            return false;
        }
        self.spent = true;
        true
    }

    fn build(&self, status: u16, reply: PreparedReply) -> Result<Response<Body>, ReplyError> {
        let code = StatusCode::from_u16(status).map_err(axum::http::Error::from)?;
        let content_length = reply.content_length();
        let head = Response::builder()
            .status(code)
            .header(header::CONTENT_TYPE, reply.content_type())
            .header(header::CONTENT_LENGTH, content_length);
        let multipart = reply.is_multipart();
        let response = head.body(self.stream_body(reply))?;
        info!(status, content_length, multipart, "reply ready");
        Ok(response)
    }

    fn stream_body(&self, reply: PreparedReply) -> Body {
        let (mut pipe, rx) = tokio::io::duplex(PIPE_CAPACITY);
        let writer = self.writer.clone();
        let task = tokio::spawn(
            async move {
                let written = writer.write_body(&reply, &mut pipe).await;
                match &written {
                    Ok(n) => debug!(written = n, "reply body written"),
                    Err(e) => warn!(error = %e, "reply body aborted"),
                }
                written
            }
            .in_current_span(),
        );
        let outcome = stream::once(body_outcome(task)).filter_map(future::ready);
        Body::from_stream(ReaderStream::new(rx).chain(outcome))
    }
}

async fn body_outcome(task: JoinHandle<Result<u64, FrameError>>) -> Option<io::Result<Bytes>> {
    match task.await {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(Err(io::Error::other(e))),
        Err(e) => Some(Err(io::Error::other(e))),
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("writer", &self.writer)
            .field("blob_store", &self.blobs.is_some())
            .field("spent", &self.spent)
            .finish_non_exhaustive()
    }
}
