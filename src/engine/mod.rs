//! Transaction engine.
//!
//! An [`Engine`] owns the HTTP client and the settings shared by every
//! command. Each command runs in its own [`Transaction`], which issues the
//! request, reads the reply through the multipart pipeline when needed, and
//! keeps the classified outcome for the caller to inspect. The server role
//! answers requests through a [`Responder`].

use std::{fmt, sync::Arc};

use reqwest::Client;

use crate::{
    cloud::BlobStore,
    config::TransportConfig,
    endpoint::DeviceEndpoint,
    multipart::{Boundary, MultipartFrameWriter},
    session::{CaptureProbe, SessionBookkeeper},
};

mod client;
mod completion;
mod errors;
mod outcome;
mod pending;
mod request;
mod respond;

pub use client::{CORRELATION_HEADER, Transaction};
pub use completion::AbortHandle;
pub use errors::{EngineError, ReplyError};
pub use outcome::{ErrorFacility, NON_HTTP_STATUS, ReplyStyle, TransactionState};
pub use pending::{CloudReply, PendingReplies};
pub use request::{CommandRequest, RequestBody};
pub use respond::{INVALID_TOKEN_BODY, Responder};

/// Shared state for issuing and answering commands.
#[derive(Clone)]
pub struct Engine {
    client: Client,
    config: TransportConfig,
    boundary: Boundary,
    pending: PendingReplies,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl Engine {
    /// Build an engine from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Boundary`] for an unusable boundary token and
    /// [`EngineError::Client`] when the HTTP client cannot be built.
    pub fn new(config: TransportConfig) -> Result<Self, EngineError> {
        let boundary = config.boundary()?;
        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self {
            client,
            config,
            boundary,
            pending: PendingReplies::new(),
            blobs: None,
        })
    }

    /// Route cloud attachments through `store`.
    #[must_use]
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(store);
        self
    }

    /// Settings in effect.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig { &self.config }

    /// Cloud replies awaiting their transactions.
    #[must_use]
    pub const fn pending(&self) -> &PendingReplies { &self.pending }

    /// A fresh transaction against `endpoint`.
    #[must_use]
    pub fn transaction(&self, endpoint: DeviceEndpoint) -> Transaction {
        Transaction::new(self.clone(), endpoint)
    }

    /// A single-use responder for one incoming request.
    #[must_use]
    pub fn responder(&self) -> Responder {
        let writer = MultipartFrameWriter::new(self.boundary.clone())
            .with_chunk_size(self.config.image_chunk_size);
        Responder::new(writer, self.blobs.clone())
    }

    /// Session bookkeeping for the capture inspected by `probe`.
    #[must_use]
    pub fn bookkeeper(&self, probe: CaptureProbe) -> SessionBookkeeper {
        SessionBookkeeper::new(probe, &self.config)
    }

    pub(crate) const fn client(&self) -> &Client { &self.client }

    pub(crate) fn blobs(&self) -> Option<Arc<dyn BlobStore>> { self.blobs.clone() }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("blob_store", &self.blobs.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn rejects_bad_boundary() {
        let config = TransportConfig {
            boundary: String::new(),
            ..TransportConfig::default()
        };
        assert!(matches!(Engine::new(config), Err(EngineError::Boundary(_))));
    }

    #[rstest]
    fn transactions_start_idle() {
        let engine = Engine::new(TransportConfig::default()).expect("engine");
        let transaction = engine.transaction(DeviceEndpoint::local("127.0.0.1", "", 80));
        assert_eq!(transaction.state(), TransactionState::Idle);
        assert!(transaction.status().is_none());
    }
}
