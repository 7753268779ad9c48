//! Utilities for integration tests.
//!
//! The `test-util` crate provides a scripted `axum` server that replays
//! canned replies in configurable fragments, a server that answers through
//! the crate's own [`Responder`](twainlink::engine::Responder), and an
//! in-memory blob store for cloud attachments.

pub mod blob;
pub mod server;

pub use blob::MemoryBlobStore;
pub use server::{RecordedRequest, ResponderServer, ScriptedReply, ScriptedServer, ServedReply};

/// Error type used by fallible helpers.
pub type AnyError = anyhow::Error;
