//! Transport configuration.
//!
//! Settings are layered with `figment`: built-in defaults, then an optional
//! `twainlink.toml`, then `TWAINLINK_`-prefixed environment variables. The
//! camel-case key names used by TWAIN Direct configuration files
//! (`useHttps`, `useImageBlocksComplete`) are accepted as aliases.

use std::{path::Path, time::Duration};

#[cfg(feature = "toml")]
use figment::providers::{Format, Toml};
use figment::{Figment, providers::Env};
use serde::{Deserialize, Serialize};

use crate::multipart::{
    Boundary,
    DEFAULT_BOUNDARY,
    FrameError,
    reader::DEFAULT_BUFFER_LIMIT,
    writer::DEFAULT_IMAGE_CHUNK,
};

/// Name of the optional configuration file.
pub const CONFIG_FILE: &str = "twainlink.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "TWAINLINK_";

/// Whether requests to a device use TLS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpsPolicy {
    /// Always use HTTPS.
    #[default]
    Yes,
    /// Always use plain HTTP.
    No,
    /// Follow the TLS flag the device advertised.
    Auto,
}

impl HttpsPolicy {
    /// Decide TLS for a device that advertised `advertised`.
    #[must_use]
    pub const fn use_tls(self, advertised: bool) -> bool {
        match self {
            Self::Yes => true,
            Self::No => false,
            Self::Auto => advertised,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Auto => "auto",
        }
    }
}

/// Settings shared by every transaction an engine issues.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TLS policy for local devices.
    #[serde(alias = "useHttps")]
    pub use_https: HttpsPolicy,
    /// Report `imageBlocksComplete` ranges in session data.
    #[serde(alias = "useImageBlocksComplete")]
    pub use_image_blocks_complete: bool,
    /// Largest header block or JSON section held in memory.
    pub read_buffer_limit: usize,
    /// Size of each streamed image write.
    pub image_chunk_size: usize,
    /// Timeout applied when a request does not name one.
    pub default_timeout_ms: u64,
    /// Accept self-signed device certificates.
    pub accept_invalid_certs: bool,
    /// Boundary token for outgoing multipart replies.
    pub boundary: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            use_https: HttpsPolicy::Yes,
            use_image_blocks_complete: false,
            read_buffer_limit: DEFAULT_BUFFER_LIMIT,
            image_chunk_size: DEFAULT_IMAGE_CHUNK,
            default_timeout_ms: 30_000,
            accept_invalid_certs: false,
            boundary: DEFAULT_BOUNDARY.to_owned(),
        }
    }
}

impl TransportConfig {
    /// Load from `twainlink.toml` (when present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns the `figment` error when a source holds a value of the wrong
    /// type or an unknown enum variant.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::from_figment(Self::figment(None))
    }

    /// Load from an explicit file instead of `twainlink.toml`.
    ///
    /// # Errors
    ///
    /// As for [`TransportConfig::load`].
    pub fn load_from(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::from_figment(Self::figment(Some(path)))
    }

    /// Layered providers without extraction.
    #[must_use]
    #[cfg_attr(
        not(feature = "toml"),
        expect(unused_variables, reason = "the file layer needs the toml feature")
    )]
    pub fn figment(path: Option<&Path>) -> Figment {
        #[cfg(feature = "toml")]
        let layered =
            Figment::new().merge(Toml::file(path.unwrap_or_else(|| Path::new(CONFIG_FILE))));
        #[cfg(not(feature = "toml"))]
        let layered = Figment::new();
        layered.merge(Env::prefixed(ENV_PREFIX))
    }

    fn from_figment(figment: Figment) -> Result<Self, Box<figment::Error>> {
        figment.extract().map_err(Box::new)
    }

    /// Timeout for requests that do not set one.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration { Duration::from_millis(self.default_timeout_ms) }

    /// Boundary for outgoing replies.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidBoundary`] for an unusable token.
    pub fn boundary(&self) -> Result<Boundary, FrameError> { Boundary::new(self.boundary.clone()) }

    /// String lookup by either snake-case or TWAIN Direct key name.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        let value = match key {
            "useHttps" | "use_https" => self.use_https.as_str().to_owned(),
            "useImageBlocksComplete" | "use_image_blocks_complete" => {
                self.use_image_blocks_complete.to_string()
            }
            "read_buffer_limit" => self.read_buffer_limit.to_string(),
            "image_chunk_size" => self.image_chunk_size.to_string(),
            "default_timeout_ms" => self.default_timeout_ms.to_string(),
            "accept_invalid_certs" => self.accept_invalid_certs.to_string(),
            "boundary" => self.boundary.clone(),
            _ => return None,
        };
        Some(value)
    }
}
