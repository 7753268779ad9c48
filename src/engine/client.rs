//! Client side of a transaction: issue a command and classify its reply.

use std::{path::PathBuf, sync::Arc};

use reqwest::{
    Body,
    Client,
    Method,
    Response,
    StatusCode,
    header::{CONTENT_TYPE, HeaderMap},
};
use bytes::BytesMut;
use futures_util::StreamExt;
use serde::de::IgnoredAny;
use serde_json::Value;
use tokio::{fs::File, io::AsyncWriteExt, sync::oneshot};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{
    Engine,
    ErrorFacility,
    ReplyStyle,
    TransactionState,
    completion::{AbortHandle, Completion},
    outcome::{Record, Settled},
    pending::CloudReply,
    request::{CommandRequest, RequestBody},
};
use crate::{
    cloud::{BlobError, BlobStore, BlockIds, IMAGE_BLOCK_ID, THUMBNAIL_BLOCK_ID},
    endpoint::DeviceEndpoint,
    multipart::{
        FrameError,
        JSON_CONTENT_TYPE,
        MultipartFrameReader,
        OutputFiles,
        ReplyFormat,
        SectionKind,
        classify_reply,
        read_multipart,
        reader::len_u64,
    },
    session::{SessionFields, SessionSnapshot},
    tally::TransferTally,
};

/// Header carrying the per-request correlation id.
pub const CORRELATION_HEADER: &str = "X-TWAIN-Cloud-Request-Id";

const INVALID_TOKEN_ERROR: &str = "invalid_x_privet_token";

/// One request/response exchange and its outcome.
///
/// A transaction is issued once. Afterwards every accessor reports what
/// happened: the request as sent, the response, the byte tally, any files
/// written, the classified error, and the session snapshot the reply carried.
pub struct Transaction {
    engine: Engine,
    endpoint: DeviceEndpoint,
    completion: Arc<Completion>,
    settled_rx: Option<oneshot::Receiver<Settled>>,
    cancel: CancellationToken,
    reason: String,
    method: Option<Method>,
    url: Option<String>,
    correlation_id: Option<String>,
    request_headers: Vec<(String, String)>,
    record: Record,
    session: Option<SessionSnapshot>,
    final_state: Option<TransactionState>,
}

impl Transaction {
    pub(crate) fn new(engine: Engine, endpoint: DeviceEndpoint) -> Self {
        let (completion, settled_rx) = Completion::new();
        Self {
            engine,
            endpoint,
            completion,
            settled_rx: Some(settled_rx),
            cancel: CancellationToken::new(),
            reason: String::new(),
            method: None,
            url: None,
            correlation_id: None,
            request_headers: Vec::new(),
            record: Record::default(),
            session: None,
            final_state: None,
        }
    }

    /// Issue `request` and wait for it to settle.
    ///
    /// Returns `true` only when a well-formed reply with a status below 300
    /// arrived. Every failure is classified and recorded rather than
    /// returned; a transaction can be issued only once.
    pub async fn issue(&mut self, request: CommandRequest) -> bool {
        let Some(settled_rx) = self.settled_rx.take() else {
            warn!(reason = %request.reason, "transaction already issued");
            return false;
        };
        let correlation_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "transaction",
            reason = %request.reason,
            correlation_id = %correlation_id
        );
        self.run(request, correlation_id, settled_rx)
            .instrument(span)
            .await
    }

    async fn run(
        &mut self,
        request: CommandRequest,
        correlation_id: String,
        mut settled_rx: oneshot::Receiver<Settled>,
    ) -> bool {
        let config = self.engine.config();
        let url = self.endpoint.resolve(&request.uri, config.use_https);
        let timeout = request.timeout.unwrap_or_else(|| config.default_timeout());
        let buffer_limit = config.read_buffer_limit;
        self.reason.clone_from(&request.reason);
        self.method = Some(request.method.clone());
        self.url = Some(url.clone());
        self.correlation_id = Some(correlation_id.clone());

        let cloud = self.endpoint.is_cloud().then(|| CloudWait {
            reply: self.engine.pending().register(&correlation_id),
            blobs: self.engine.blobs(),
        });
        let prepared = outgoing_headers(&request, &correlation_id).await;

        if !self.completion.is_settled() {
            match prepared {
                Ok(headers) => {
                    self.request_headers.clone_from(&headers);
                    debug!(headers = ?headers, "request headers");
                    let exchange = Exchange {
                        client: self.engine.client().clone(),
                        method: request.method,
                        url,
                        headers,
                        body: request.body,
                        outputs: request.outputs,
                        buffer_limit,
                        cloud,
                        completion: Arc::clone(&self.completion),
                    };
                    self.spawn(exchange);
                }
                Err(record) => {
                    if self.completion.settle(Settled::finished(record)).is_err() {
                        debug!("upload failure ignored after abort");
                    }
                }
            }
        }

        let settled = if let Ok(delivered) = tokio::time::timeout(timeout, &mut settled_rx).await {
            delivered.unwrap_or_else(|_| lost())
        } else {
            self.abort(true);
            settled_rx.await.unwrap_or_else(|_| lost())
        };
        if self.endpoint.is_cloud() {
            self.engine.pending().remove(&correlation_id);
        }
        self.finish(settled, request.reply_style)
    }

    fn spawn(&self, exchange: Exchange) {
        let cancel = self.cancel.clone();
        let completion = Arc::clone(&self.completion);
        tokio::spawn(
            async move {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    record = exchange.run() => {
                        if let Err(late) = completion.settle(Settled::finished(record)) {
                            warn!(state = ?late.state, "late completion ignored");
                        }
                    }
                }
            }
            .in_current_span(),
        );
    }

    fn finish(&mut self, settled: Settled, style: ReplyStyle) -> bool {
        let Settled {
            mut state,
            mut record,
        } = settled;
        if state == TransactionState::Completed {
            let session = record
                .body
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .map_err(FrameError::from)
                .and_then(|body| {
                    body.map_or(Ok(None), |value| {
                        SessionSnapshot::from_reply(&value, style).map_err(FrameError::from)
                    })
                });
            match session {
                Ok(session) => self.session = session,
                Err(e) => {
                    record = record.fail(ErrorFacility::Protocol, e.code(), e.to_string());
                    state = TransactionState::Failed;
                }
            }
        }

        match state {
            TransactionState::Completed => {
                info!(status = ?record.status, read = record.tally.read(), "transaction completed");
            }
            TransactionState::Aborted => {
                info!(code = ?record.codes.first(), "transaction aborted");
            }
            _ => error!(
                facility = %record.facility,
                code = ?record.codes.first(),
                status = ?record.status,
                description = ?record.descriptions.first(),
                "transaction failed"
            ),
        }
        self.record = record;
        self.final_state = Some(state);
        state == TransactionState::Completed
    }

    /// Abort the transaction, classifying it as a timeout or an abort.
    ///
    /// Safe to call at any time. Returns `true` when this call decided the
    /// outcome; after the transaction settled it does nothing.
    pub fn abort(&self, is_timeout: bool) -> bool { self.abort_handle().abort(is_timeout) }

    /// Handle for aborting from another task while `issue` is pending.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(Arc::clone(&self.completion), self.cancel.clone())
    }

    /// Current progress.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.final_state.unwrap_or_else(|| self.completion.state())
    }

    /// Command name given to `issue`.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }

    /// Request method, once issued.
    #[must_use]
    pub const fn method(&self) -> Option<&Method> { self.method.as_ref() }

    /// Resolved request URL, once issued.
    #[must_use]
    pub fn url(&self) -> Option<&str> { self.url.as_deref() }

    /// Correlation id sent with the request.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> { self.correlation_id.as_deref() }

    /// Headers sent with the request.
    #[must_use]
    pub fn request_headers(&self) -> &[(String, String)] { &self.request_headers }

    /// HTTP status, or [`NON_HTTP_STATUS`](super::NON_HTTP_STATUS) when no
    /// response arrived.
    #[must_use]
    pub const fn status(&self) -> Option<u32> { self.record.status }

    /// Response headers.
    #[must_use]
    pub fn response_headers(&self) -> &[(String, String)] { &self.record.response_headers }

    /// First response header named `name`, compared case-insensitively.
    #[must_use]
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.record
            .response_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Response JSON text, if any.
    #[must_use]
    pub fn body(&self) -> Option<&str> { self.record.body.as_deref() }

    /// Byte accounting for the reply.
    #[must_use]
    pub const fn tally(&self) -> &TransferTally { &self.record.tally }

    /// Header lines of the multipart section of `kind`.
    #[must_use]
    pub fn multipart_headers(&self, kind: SectionKind) -> &[String] {
        self.record
            .tally
            .section(kind)
            .map_or(&[], |section| section.headers())
    }

    /// Files written from binary reply sections, in arrival order.
    #[must_use]
    pub fn files(&self) -> &[(SectionKind, PathBuf)] { &self.record.files }

    /// Layer that reported the failure.
    #[must_use]
    pub const fn error_facility(&self) -> ErrorFacility { self.record.facility }

    /// Error codes, in the order recorded.
    #[must_use]
    pub fn error_codes(&self) -> &[String] { &self.record.codes }

    /// Error descriptions, in the order recorded.
    #[must_use]
    pub fn error_descriptions(&self) -> &[String] { &self.record.descriptions }

    /// Session state carried by the reply.
    #[must_use]
    pub const fn session(&self) -> Option<&SessionSnapshot> { self.session.as_ref() }

    /// Wire fields of the session, with `imageBlocksComplete` included only
    /// when the engine's configuration asks for it.
    #[must_use]
    pub fn session_fields(&self) -> Option<SessionFields> {
        let include_complete = self.engine.config().use_image_blocks_complete;
        self.session
            .as_ref()
            .map(|session| session.wire_fields(include_complete))
    }

    /// Record the facility of a failure found by a calling layer.
    pub const fn set_error_facility(&mut self, facility: ErrorFacility) {
        self.record.facility = facility;
    }

    /// Append an error code found by a calling layer.
    pub fn add_error_code(&mut self, code: impl Into<String>) { self.record.codes.push(code.into()); }

    /// Append an error description found by a calling layer.
    pub fn add_error_description(&mut self, description: impl Into<String>) {
        self.record.descriptions.push(description.into());
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("reason", &self.reason)
            .field("url", &self.url)
            .field("state", &self.state())
            .field("status", &self.record.status)
            .field("facility", &self.record.facility)
            .finish_non_exhaustive()
    }
}

fn lost() -> Settled {
    Settled::finished(Record::unanswered(
        "communicationError",
        "transaction completion was lost",
    ))
}

async fn outgoing_headers(
    request: &CommandRequest,
    correlation_id: &str,
) -> Result<Vec<(String, String)>, Record> {
    let mut headers = request.headers.clone();
    headers.push((CORRELATION_HEADER.to_owned(), correlation_id.to_owned()));
    match &request.body {
        RequestBody::Empty => {}
        RequestBody::Json(json) => {
            if !request.has_header(CONTENT_TYPE.as_str()) {
                headers.push(("Content-Type".to_owned(), JSON_CONTENT_TYPE.to_owned()));
            }
            headers.push(("Content-Length".to_owned(), json.len().to_string()));
        }
        RequestBody::Upload(path) => {
            let meta = tokio::fs::metadata(path).await.map_err(|e| {
                Record::unanswered(
                    FrameError::Io(e).code(),
                    format!("cannot read upload {}", path.display()),
                )
            })?;
            headers.push(("Content-Length".to_owned(), meta.len().to_string()));
        }
    }
    Ok(headers)
}

struct CloudWait {
    reply: oneshot::Receiver<CloudReply>,
    blobs: Option<Arc<dyn BlobStore>>,
}

struct Exchange {
    client: Client,
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: RequestBody,
    outputs: OutputFiles,
    buffer_limit: usize,
    cloud: Option<CloudWait>,
    completion: Arc<Completion>,
}

impl Exchange {
    async fn run(self) -> Record {
        self.completion.advance(TransactionState::Sending);
        info!(method = %self.method, url = %self.url, "sending request");
        let mut builder = self.client.request(self.method.clone(), &self.url);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => builder.body(json.clone()),
            RequestBody::Upload(path) => match File::open(path).await {
                Ok(file) => builder.body(Body::wrap_stream(ReaderStream::new(file))),
                Err(e) => {
                    return Record::unanswered(
                        FrameError::Io(e).code(),
                        format!("cannot open upload {}", path.display()),
                    );
                }
            },
        };

        self.completion
            .advance(TransactionState::AwaitingResponseHeaders);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(&e),
        };
        let status = response.status();
        let record = Record {
            status: Some(u32::from(status.as_u16())),
            response_headers: header_pairs(response.headers()),
            ..Record::default()
        };
        info!(status = status.as_u16(), "response received");
        debug!(headers = ?record.response_headers, "response headers");

        if status.as_u16() >= 300 {
            let body = response.text().await.ok();
            return status_failure(record, status, body);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let received = match classify_reply(content_type.as_deref()) {
            Err(e) => return record.fail(ErrorFacility::Protocol, e.code(), e.to_string()),
            Ok(ReplyFormat::Json) => self.read_json(response, record).await,
            Ok(ReplyFormat::Multipart(boundary)) => {
                self.completion
                    .advance(TransactionState::ReadingMultipart);
                let mut reader = MultipartFrameReader::new(boundary, response.content_length())
                    .with_buffer_limit(self.buffer_limit);
                let outcome =
                    read_multipart(&mut reader, Box::pin(response.bytes_stream()), &self.outputs)
                        .await;
                let mut record = record;
                record.tally = reader.into_tally();
                match outcome {
                    Ok(payload) => {
                        record.body = Some(payload.json);
                        record.files = payload.files;
                        record
                    }
                    Err(e) => frame_failure(record, &e),
                }
            }
        };

        match self.cloud {
            Some(cloud) if received.facility == ErrorFacility::None => {
                cloud.receive(received, &self.outputs).await
            }
            _ => received,
        }
    }

    async fn read_json(&self, response: Response, mut record: Record) -> Record {
        self.completion.advance(TransactionState::ReadingJsonBody);
        let declared = response.content_length();
        let mut tally = TransferTally::new(declared);
        if let Some(length) = declared.filter(|length| *length > len_u64(self.buffer_limit)) {
            record.tally = tally;
            let e = FrameError::BufferLimit {
                declared: length,
                limit: self.buffer_limit,
            };
            return frame_failure(record, &e);
        }

        let mut body = BytesMut::new();
        let mut chunks = Box::pin(response.bytes_stream());
        while let Some(next) = chunks.next().await {
            let piece = match next {
                Ok(piece) => piece,
                Err(e) => {
                    record.tally = tally;
                    return record.fail(
                        ErrorFacility::HttpStatus,
                        "communicationError",
                        e.to_string(),
                    );
                }
            };
            tally.add_read(len_u64(piece.len()));
            debug!(xfer = piece.len(), read = tally.read(), declared = ?declared, "json body read");
            if body.len().saturating_add(piece.len()) > self.buffer_limit {
                let e = FrameError::BufferLimit {
                    declared: declared.unwrap_or_else(|| tally.read()),
                    limit: self.buffer_limit,
                };
                record.tally = tally;
                return frame_failure(record, &e);
            }
            body.extend_from_slice(&piece);
            tally.add_processed(len_u64(piece.len()));
        }
        if !tally.within_declared() || declared.is_some_and(|d| d != tally.read()) {
            warn!(declared = ?declared, read = tally.read(), "content length mismatch");
        }
        record.tally = tally;
        match json_text(body.to_vec()) {
            Ok(text) => {
                record.body = Some(text);
                record
            }
            Err(e) => frame_failure(record, &e),
        }
    }
}

impl CloudWait {
    async fn receive(mut self, mut record: Record, outputs: &OutputFiles) -> Record {
        let reply = match (&mut self.reply).await {
            Ok(reply) => reply,
            Err(_) => {
                return record.fail(
                    ErrorFacility::HttpStatus,
                    "communicationError",
                    "pending cloud reply was dropped",
                );
            }
        };
        debug!(status = reply.status, "cloud reply received");
        record.status = Some(u32::from(reply.status));
        record.response_headers = reply.headers;
        let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
        if reply.status >= 300 {
            return status_failure(record, status, Some(reply.body));
        }

        let mut tally = TransferTally::new(Some(len_u64(reply.body.len())));
        tally.add_read(len_u64(reply.body.len()));
        tally.add_processed(len_u64(reply.body.len()));
        let value: Value = match serde_json::from_str(&reply.body) {
            Ok(value) => value,
            Err(e) => {
                record.tally = tally;
                return frame_failure(record, &FrameError::from(e));
            }
        };
        record.body = Some(reply.body);

        let ids = BlockIds::from_reply(&value);
        let wanted = [
            (SectionKind::Thumbnail, THUMBNAIL_BLOCK_ID, ids.thumbnail),
            (SectionKind::Image, IMAGE_BLOCK_ID, ids.image),
        ];
        for (kind, field, id) in wanted {
            let Some(id) = id else { continue };
            match self.download(kind, &id, outputs).await {
                Ok((path, len)) => {
                    tally.add_read(len);
                    tally.begin_section(kind, len, vec![format!("{field}: {id}")]);
                    tally.add_section_processed(len);
                    debug!(section = %kind, len, path = %path.display(), "cloud attachment written");
                    record.files.push((kind, path));
                }
                Err(e) => {
                    record.tally = tally;
                    return frame_failure(record, &e);
                }
            }
        }
        record.tally = tally;
        record
    }

    async fn download(
        &self,
        kind: SectionKind,
        id: &str,
        outputs: &OutputFiles,
    ) -> Result<(PathBuf, u64), FrameError> {
        let store = self
            .blobs
            .as_deref()
            .ok_or_else(|| BlobError::Unavailable("no blob store configured".to_owned()))?;
        let path = outputs
            .path_for(kind)
            .ok_or(FrameError::MissingOutput(kind))?;
        let data = store.download(id).await?;
        let mut file = File::create(path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok((path.to_path_buf(), len_u64(data.len())))
    }
}

fn json_text(bytes: Vec<u8>) -> Result<String, FrameError> {
    let text = String::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
    serde_json::from_str::<IgnoredAny>(&text)?;
    Ok(text)
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn transport_failure(e: &reqwest::Error) -> Record {
    let code = if e.is_timeout() { "timeout" } else { "critical" };
    Record::unanswered(code, e.to_string())
}

fn status_failure(mut record: Record, status: StatusCode, body: Option<String>) -> Record {
    let security = body
        .as_deref()
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .filter(|value| value.get("error").and_then(Value::as_str) == Some(INVALID_TOKEN_ERROR))
        .map(|value| {
            value
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or(INVALID_TOKEN_ERROR)
                .to_owned()
        });
    record.body = body;
    match security {
        Some(description) => record.fail(ErrorFacility::Security, INVALID_TOKEN_ERROR, description),
        None => record.fail(
            ErrorFacility::HttpStatus,
            "critical",
            format!("HTTP status {status}"),
        ),
    }
}

fn frame_failure(record: Record, e: &FrameError) -> Record {
    let facility = if e.is_protocol() {
        ErrorFacility::Protocol
    } else {
        ErrorFacility::HttpStatus
    };
    record.fail(facility, e.code(), e.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::{
        config::{HttpsPolicy, TransportConfig},
        engine::NON_HTTP_STATUS,
        test_helpers::tracing::capture_events,
    };

    fn engine() -> Engine {
        Engine::new(TransportConfig {
            use_https: HttpsPolicy::No,
            ..TransportConfig::default()
        })
        .expect("engine")
    }

    fn unroutable() -> DeviceEndpoint { DeviceEndpoint::local("127.0.0.1", "", 9) }

    #[rstest]
    #[tokio::test]
    async fn json_bodies_get_a_default_content_type() {
        let request = CommandRequest::post("infoex", "/privet/infoex").with_json("{}");
        let headers = outgoing_headers(&request, "id-1").await.expect("headers");
        assert!(headers.contains(&("Content-Type".to_owned(), JSON_CONTENT_TYPE.to_owned())));
        assert!(headers.contains(&("Content-Length".to_owned(), "2".to_owned())));
        assert!(headers.contains(&(CORRELATION_HEADER.to_owned(), "id-1".to_owned())));
    }

    #[rstest]
    #[tokio::test]
    async fn explicit_content_type_is_kept() {
        let request = CommandRequest::post("infoex", "/privet/infoex")
            .with_header("content-type", "application/json")
            .with_json("{}");
        let headers = outgoing_headers(&request, "id").await.expect("headers");
        let types: Vec<_> = headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(types.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_upload_fails_before_sending() {
        let mut transaction = engine().transaction(unroutable());
        let request = CommandRequest::post("upload", "/upload").with_upload("/nonexistent/upload");
        assert!(!transaction.issue(request).await);
        assert_eq!(transaction.error_facility(), ErrorFacility::HttpStatus);
        assert_eq!(transaction.error_codes(), ["fileError"]);
        assert_eq!(transaction.state(), TransactionState::Failed);
    }

    #[rstest]
    #[tokio::test]
    async fn abort_before_issue_settles_as_aborted() {
        let mut transaction = engine().transaction(unroutable());
        assert!(transaction.abort(false));
        assert!(
            !transaction
                .issue(CommandRequest::get("info", "/privet/info"))
                .await
        );
        assert_eq!(transaction.state(), TransactionState::Aborted);
        assert_eq!(transaction.error_codes(), ["aborted"]);
        assert_eq!(transaction.status(), Some(NON_HTTP_STATUS));
    }

    #[rstest]
    #[tokio::test]
    async fn second_issue_is_refused() {
        let mut transaction = engine().transaction(unroutable());
        transaction.abort(true);
        assert!(
            !transaction
                .issue(CommandRequest::get("info", "/privet/info"))
                .await
        );
        let capture = capture_events();
        assert!(
            !transaction
                .issue(
                    CommandRequest::get("info", "/privet/info")
                        .with_timeout(Duration::from_millis(10))
                )
                .await
        );
        let events = capture.take();
        assert!(
            events
                .iter()
                .any(|event| event.message() == Some("transaction already issued"))
        );
    }

    #[rstest]
    fn invalid_token_is_a_security_failure() {
        let body = r#"{"error":"invalid_x_privet_token","description":"X-Privet-Token missing or invalid..."}"#;
        let record = status_failure(
            Record::default(),
            StatusCode::BAD_REQUEST,
            Some(body.to_owned()),
        );
        assert_eq!(record.facility, ErrorFacility::Security);
        assert_eq!(record.codes, vec![INVALID_TOKEN_ERROR.to_owned()]);
        assert_eq!(record.body.as_deref(), Some(body));
    }

    #[rstest]
    fn other_statuses_are_critical() {
        let record = status_failure(
            Record::default(),
            StatusCode::NOT_FOUND,
            Some("{}".to_owned()),
        );
        assert_eq!(record.facility, ErrorFacility::HttpStatus);
        assert_eq!(record.codes, vec!["critical".to_owned()]);
        assert_eq!(record.body.as_deref(), Some("{}"));
    }

    #[rstest]
    #[case::bad_utf8(vec![0xff, 0xfe], "invalidUtf8")]
    #[case::bad_json(b"{".to_vec(), "invalidJson")]
    fn json_text_validates(#[case] bytes: Vec<u8>, #[case] code: &str) {
        assert_eq!(json_text(bytes).expect_err("invalid").code(), code);
    }
}
