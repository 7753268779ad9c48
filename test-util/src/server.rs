//! HTTP servers for integration tests.
//!
//! [`ScriptedServer`] replays canned replies in order, optionally split into
//! small body fragments with pauses between them, so the client's reader sees
//! the worst-case read patterns. [`ResponderServer`] answers every request
//! through the crate's own reply writer.

use std::{
    collections::VecDeque,
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, warn};
use twainlink::{
    endpoint::DeviceEndpoint,
    engine::Engine,
    multipart::{Attachments, JSON_CONTENT_TYPE},
};

use crate::AnyError;

/// A request as the server received it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Headers in arrival order, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// First header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    async fn capture(request: Request) -> Self {
        let (parts, payload) = request.into_parts();
        let body = match axum::body::to_bytes(payload, usize::MAX).await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!(error = %e, "request body unreadable");
                Vec::new()
            }
        };
        Self {
            method: parts.method.as_str().to_owned(),
            path: parts.uri.path().to_owned(),
            headers: parts
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_owned(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body,
        }
    }
}

/// One canned reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedReply {
    status: StatusCode,
    content_type: String,
    body: Bytes,
    fragment: usize,
    stall: Duration,
    delay: Duration,
    declare_length: bool,
}

impl ScriptedReply {
    /// A reply with `status`, `content_type` and `body`.
    ///
    /// A status outside `100..=999` is served as `500`.
    #[must_use]
    pub fn new(status: u16, content_type: &str, body: &[u8]) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            content_type: content_type.to_owned(),
            body: Bytes::copy_from_slice(body),
            fragment: body.len().max(1),
            stall: Duration::ZERO,
            delay: Duration::ZERO,
            declare_length: true,
        }
    }

    /// A JSON reply.
    #[must_use]
    pub fn json(status: u16, body: &str) -> Self {
        Self::new(status, JSON_CONTENT_TYPE, body.as_bytes())
    }

    /// Send the body `size` bytes at a time.
    #[must_use]
    pub fn fragmented(mut self, size: usize) -> Self {
        self.fragment = size.max(1);
        self
    }

    /// Pause before each fragment.
    #[must_use]
    pub const fn stalling(mut self, pause: Duration) -> Self {
        self.stall = pause;
        self
    }

    /// Wait before sending the reply head.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Leave out `Content-Length`, so the body goes out chunked.
    #[must_use]
    pub const fn without_length(mut self) -> Self {
        self.declare_length = false;
        self
    }

    async fn render(self) -> Response {
        tokio::time::sleep(self.delay).await;
        let mut head = Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, self.content_type.as_str());
        if self.declare_length {
            head = head.header(header::CONTENT_LENGTH, self.body.len());
        }
        let total = self.body.len();
        let pieces: Vec<Bytes> = (0..total)
            .step_by(self.fragment)
            .map(|start| {
                self.body
                    .slice(start..start.saturating_add(self.fragment).min(total))
            })
            .collect();
        let stall = self.stall;
        let fragments = stream::iter(pieces).then(move |piece| async move {
            if !stall.is_zero() {
                tokio::time::sleep(stall).await;
            }
            Ok::<_, Infallible>(piece)
        });
        head.body(Body::from_stream(fragments)).unwrap_or_else(|e| {
            warn!(error = %e, "scripted reply head rejected");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn serve(router: Router) -> Result<(SocketAddr, JoinHandle<()>), AnyError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "test server stopped");
        }
    });
    Ok((addr, task))
}

#[derive(Debug, Default)]
struct Script {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

async fn scripted(State(script): State<Arc<Script>>, request: Request) -> Response {
    let recorded = RecordedRequest::capture(request).await;
    lock(&script.requests).push(recorded);
    let next = lock(&script.replies).pop_front();
    match next {
        Some(reply) => reply.render().await,
        None => {
            debug!("script exhausted");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Serves one scripted reply per request, in order.
///
/// Requests beyond the script get `503`.
#[derive(Debug)]
pub struct ScriptedServer {
    addr: SocketAddr,
    script: Arc<Script>,
    task: JoinHandle<()>,
}

impl ScriptedServer {
    /// Listen on a loopback port and serve `replies`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(replies: Vec<ScriptedReply>) -> Result<Self, AnyError> {
        let script = Arc::new(Script {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        });
        let router = Router::new()
            .fallback(scripted)
            .with_state(Arc::clone(&script));
        let (addr, task) = serve(router).await?;
        Ok(Self { addr, script, task })
    }

    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.addr.port() }

    /// Local endpoint addressing this server over plain HTTP.
    #[must_use]
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::local("127.0.0.1", "", self.port()).with_tls_advertised(false)
    }

    /// Base URL for a cloud endpoint routed to this server.
    #[must_use]
    pub fn base_url(&self) -> String { format!("http://{}", self.addr) }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> { lock(&self.script.requests).clone() }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) { self.task.abort(); }
}

/// Reply sent by a [`ResponderServer`].
#[derive(Clone, Debug)]
pub enum ServedReply {
    /// JSON payload with optional attachments.
    Json {
        /// HTTP status.
        status: u16,
        /// JSON payload.
        json: String,
        /// Files to frame alongside the payload.
        attachments: Attachments,
    },
    /// The fixed invalid-token rejection.
    InvalidToken,
}

#[derive(Debug)]
struct Responding {
    engine: Engine,
    reply: ServedReply,
    requests: Mutex<Vec<RecordedRequest>>,
}

async fn responding(State(state): State<Arc<Responding>>, request: Request) -> Response {
    let recorded = RecordedRequest::capture(request).await;
    lock(&state.requests).push(recorded);
    let mut responder = state.engine.responder();
    let built = match &state.reply {
        ServedReply::Json {
            status,
            json,
            attachments,
        } => responder.respond(*status, json, attachments).await,
        ServedReply::InvalidToken => responder.reject_invalid_token().await,
    };
    match built {
        Ok(Some(response)) => response,
        Ok(None) => StatusCode::CONFLICT.into_response(),
        Err(e) => {
            warn!(error = %e, code = e.code(), "responder server reply failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Answers every request through [`Engine::responder`].
#[derive(Debug)]
pub struct ResponderServer {
    addr: SocketAddr,
    state: Arc<Responding>,
    task: JoinHandle<()>,
}

impl ResponderServer {
    /// Listen on a loopback port and answer each request with `reply`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(engine: Engine, reply: ServedReply) -> Result<Self, AnyError> {
        let state = Arc::new(Responding {
            engine,
            reply,
            requests: Mutex::default(),
        });
        let router = Router::new()
            .fallback(responding)
            .with_state(Arc::clone(&state));
        let (addr, task) = serve(router).await?;
        Ok(Self { addr, state, task })
    }

    /// Local endpoint addressing this server over plain HTTP.
    #[must_use]
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::local("127.0.0.1", "", self.addr.port()).with_tls_advertised(false)
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> { lock(&self.state.requests).clone() }
}

impl Drop for ResponderServer {
    fn drop(&mut self) { self.task.abort(); }
}
