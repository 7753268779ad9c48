//! Capture session bookkeeping.
//!
//! [`SessionSnapshot`] holds the session state reported by, or computed for,
//! a single transaction. [`CompletedRanges`] accumulates completed image
//! ranges for the lifetime of one capture, and [`CaptureProbe`] derives block
//! state from the capture directories. [`SessionBookkeeper`] ties the three
//! together under the transport configuration.

use std::{io, path::PathBuf};

use thiserror::Error;

mod bookkeeper;
pub mod probe;
mod ranges;
mod snapshot;

pub use bookkeeper::SessionBookkeeper;
pub use probe::{CaptureProbe, ProbeReport};
pub use ranges::CompletedRanges;
pub use snapshot::{ImageBlockRange, SessionFields, SessionSnapshot};

/// Failures while probing a capture.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A directory or file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// An `img*.meta` file name carries no block number.
    #[error("image block file without a block number: {0}")]
    BlockName(String),
    /// A block metadata file is not valid JSON.
    #[error("invalid block metadata in {path}: {source}")]
    Metadata {
        /// Metadata file.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
}
