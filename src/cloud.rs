//! Out-of-band attachment transfer for TWAIN Cloud.
//!
//! Cloud replies never carry binary sections. Attachments are uploaded to a
//! blob service and the JSON reply names them by `results.imageBlockId` and
//! `results.thumbnailBlockId`; the client downloads them by id.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field naming the uploaded image in a cloud reply.
pub const IMAGE_BLOCK_ID: &str = "imageBlockId";
/// Field naming the uploaded thumbnail in a cloud reply.
pub const THUMBNAIL_BLOCK_ID: &str = "thumbnailBlockId";

/// Failures reported by a [`BlobStore`].
#[derive(Debug, Error)]
pub enum BlobError {
    /// The service refused the transfer.
    #[error("blob service rejected {operation}: {reason}")]
    Rejected {
        /// `upload` or `download`.
        operation: &'static str,
        /// Service-supplied reason.
        reason: String,
    },
    /// No blob exists under the requested id.
    #[error("blob {0:?} not found")]
    NotFound(String),
    /// The service could not be reached.
    #[error("blob service unavailable: {0}")]
    Unavailable(String),
}

/// Blob transfer service used for cloud attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data`, returning an opaque id.
    async fn upload(&self, data: Bytes) -> Result<String, BlobError>;

    /// Fetch the blob named by `id`, which may be a URL.
    async fn download(&self, id: &str) -> Result<Bytes, BlobError>;
}

/// Block ids named by a cloud reply's `results` object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockIds {
    /// Id of the uploaded image, if any.
    pub image: Option<String>,
    /// Id of the uploaded thumbnail, if any.
    pub thumbnail: Option<String>,
}

impl BlockIds {
    /// Read the ids from a parsed reply.
    #[must_use]
    pub fn from_reply(reply: &Value) -> Self {
        let results = reply.get("results");
        let id = |field: &str| {
            results
                .and_then(|r| r.get(field))
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
        };
        Self {
            image: id(IMAGE_BLOCK_ID),
            thumbnail: id(THUMBNAIL_BLOCK_ID),
        }
    }

    /// Whether neither id is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.image.is_none() && self.thumbnail.is_none() }

    /// Write both ids into `results`, using `null` for an absent one.
    ///
    /// Leaves `reply` untouched when both ids are absent. A missing or
    /// non-object `results` member is replaced by an object.
    pub fn apply(&self, reply: &mut Value) {
        if self.is_empty() {
            return;
        }
        let Some(root) = reply.as_object_mut() else {
            return;
        };
        let results = root
            .entry("results")
            .or_insert_with(|| Value::Object(Map::new()));
        if !results.is_object() {
            *results = Value::Object(Map::new());
        }
        if let Some(fields) = results.as_object_mut() {
            let as_value = |id: &Option<String>| id.clone().map_or(Value::Null, Value::String);
            fields.insert(IMAGE_BLOCK_ID.to_owned(), as_value(&self.image));
            fields.insert(THUMBNAIL_BLOCK_ID.to_owned(), as_value(&self.thumbnail));
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn applies_ids_with_null_for_missing() {
        let mut reply = json!({"results": {"success": true}});
        BlockIds {
            image: Some("blob-1".to_owned()),
            thumbnail: None,
        }
        .apply(&mut reply);
        assert_eq!(
            reply,
            json!({"results": {"success": true, "imageBlockId": "blob-1", "thumbnailBlockId": null}})
        );
    }

    #[rstest]
    fn empty_ids_leave_reply_alone() {
        let mut reply = json!({"results": {"success": true}});
        BlockIds::default().apply(&mut reply);
        assert_eq!(reply, json!({"results": {"success": true}}));
    }

    #[rstest]
    fn creates_results_object() {
        let mut reply = json!({"kind": "twainlocalscanner"});
        BlockIds {
            image: None,
            thumbnail: Some("t".to_owned()),
        }
        .apply(&mut reply);
        assert_eq!(reply["results"]["thumbnailBlockId"], "t");
        assert_eq!(reply["results"]["imageBlockId"], Value::Null);
    }

    #[rstest]
    #[case::both(json!({"results": {"imageBlockId": "i", "thumbnailBlockId": "t"}}), Some("i"), Some("t"))]
    #[case::null(json!({"results": {"imageBlockId": null}}), None, None)]
    #[case::empty(json!({"results": {"imageBlockId": ""}}), None, None)]
    #[case::no_results(json!({}), None, None)]
    fn reads_ids(
        #[case] reply: Value,
        #[case] image: Option<&str>,
        #[case] thumbnail: Option<&str>,
    ) {
        let ids = BlockIds::from_reply(&reply);
        assert_eq!(ids.image.as_deref(), image);
        assert_eq!(ids.thumbnail.as_deref(), thumbnail);
    }
}
