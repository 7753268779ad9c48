//! Description of one command to issue.

use std::{path::PathBuf, time::Duration};

use reqwest::Method;

use super::ReplyStyle;
use crate::multipart::OutputFiles;

/// Body sent with a command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// JSON text.
    Json(String),
    /// Contents of a file, sent with its exact length.
    Upload(PathBuf),
}

/// A command ready to be issued by a [`Transaction`](super::Transaction).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub(crate) reason: String,
    pub(crate) method: Method,
    pub(crate) uri: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: RequestBody,
    pub(crate) outputs: OutputFiles,
    pub(crate) timeout: Option<Duration>,
    pub(crate) reply_style: ReplyStyle,
}

impl CommandRequest {
    /// A command named `reason` sending `method` to `uri`.
    ///
    /// `uri` may start with the `${prefix}` placeholder.
    #[must_use]
    pub fn new(reason: impl Into<String>, method: Method, uri: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            outputs: OutputFiles::new(),
            timeout: None,
            reply_style: ReplyStyle::SimpleReply,
        }
    }

    /// A `GET` command.
    #[must_use]
    pub fn get(reason: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::new(reason, Method::GET, uri)
    }

    /// A `POST` command.
    #[must_use]
    pub fn post(reason: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::new(reason, Method::POST, uri)
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send `json` as the body.
    #[must_use]
    pub fn with_json(mut self, json: impl Into<String>) -> Self {
        self.body = RequestBody::Json(json.into());
        self
    }

    /// Send the contents of `path` as the body.
    #[must_use]
    pub fn with_upload(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = RequestBody::Upload(path.into());
        self
    }

    /// Write binary reply sections to `outputs`.
    #[must_use]
    pub fn with_outputs(mut self, outputs: OutputFiles) -> Self {
        self.outputs = outputs;
        self
    }

    /// Override the engine's default timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Interpret the reply as `style`.
    #[must_use]
    pub const fn with_reply_style(mut self, style: ReplyStyle) -> Self {
        self.reply_style = style;
        self
    }

    /// Command name used in logs.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }

    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}
