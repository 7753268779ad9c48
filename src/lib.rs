//! Transaction layer for TWAIN Local and TWAIN Cloud scanners.
//!
//! This crate issues scanner commands over HTTP, reads their replies whether
//! they arrive as a single JSON body or as a multipart/mixed stream carrying
//! image and thumbnail attachments, and frames the symmetric replies on the
//! responding side. Every exchange keeps exact byte accounting and a
//! classified outcome, and session replies are folded into image-block
//! bookkeeping for the capture in progress.

pub mod cloud;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod multipart;
pub mod session;
pub mod tally;

#[cfg(test)]
pub(crate) mod test_helpers;
