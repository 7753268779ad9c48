//! Per-transaction view of capture session progress.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::probe::ProbeReport;
use crate::engine::ReplyStyle;

/// Inclusive span of image blocks that together form one logical image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageBlockRange {
    /// First block of the image.
    #[serde(rename = "f")]
    pub first: u64,
    /// Last block of the image.
    #[serde(rename = "l")]
    pub last: u64,
}

impl ImageBlockRange {
    /// Whether `block` falls inside the range.
    #[must_use]
    pub const fn contains(&self, block: u64) -> bool { self.first <= block && block <= self.last }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WireStatus {
    success: bool,
    detected: String,
}

impl Default for WireStatus {
    fn default() -> Self {
        Self {
            success: true,
            detected: "nominal".to_owned(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireSession {
    session_id: Option<String>,
    revision: u64,
    state: String,
    status: WireStatus,
    done_capturing: bool,
    image_blocks_drained: bool,
    image_blocks: Vec<u64>,
    image_blocks_complete: Vec<ImageBlockRange>,
    image_block_num: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    session: WireSession,
}

/// Session fields as they appear in a `results.session` object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFields {
    /// The device will produce no more image blocks.
    pub done_capturing: bool,
    /// No image blocks remain to be transferred.
    pub image_blocks_drained: bool,
    /// Image blocks available for transfer.
    pub image_blocks: Vec<u64>,
    /// Completed image ranges, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_blocks_complete: Option<Vec<ImageBlockRange>>,
}

/// Session state carried by, or computed for, one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    session_id: Option<String>,
    state: String,
    revision: u64,
    status_success: bool,
    status_detected: String,
    done_capturing: bool,
    image_blocks_drained: bool,
    image_blocks: Vec<u64>,
    image_blocks_complete: Vec<ImageBlockRange>,
    image_block_num: Option<u64>,
    event_name: Option<String>,
}

impl SessionSnapshot {
    /// An empty snapshot for a session in `state` at `revision`.
    #[must_use]
    pub fn new(state: impl Into<String>, revision: u64) -> Self {
        Self {
            session_id: None,
            state: state.into(),
            revision,
            status_success: true,
            status_detected: "nominal".to_owned(),
            done_capturing: false,
            image_blocks_drained: false,
            image_blocks: Vec::new(),
            image_blocks_complete: Vec::new(),
            image_block_num: None,
            event_name: None,
        }
    }

    fn from_wire(wire: WireSession, event_name: Option<String>) -> Self {
        Self {
            session_id: wire.session_id,
            state: wire.state,
            revision: wire.revision,
            status_success: wire.status.success,
            status_detected: wire.status.detected,
            done_capturing: wire.done_capturing,
            image_blocks_drained: wire.image_blocks_drained,
            image_blocks: wire.image_blocks,
            image_blocks_complete: wire.image_blocks_complete,
            image_block_num: wire.image_block_num,
            event_name,
        }
    }

    /// Parse a `session` object.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when a field has the wrong type.
    pub fn from_session(session: &Value) -> Result<Self, serde_json::Error> {
        WireSession::deserialize(session).map(|wire| Self::from_wire(wire, None))
    }

    /// Extract the snapshot a reply of `style` carries.
    ///
    /// Session replies read `results.session`; event replies read the
    /// session of the last entry in `results.events`. Simple replies and
    /// replies without the expected member yield `None`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the member has the wrong shape.
    pub fn from_reply(reply: &Value, style: ReplyStyle) -> Result<Option<Self>, serde_json::Error> {
        match style {
            ReplyStyle::SimpleReply => Ok(None),
            ReplyStyle::SimpleReplyWithSessionInfo => reply
                .pointer("/results/session")
                .map(Self::from_session)
                .transpose(),
            ReplyStyle::Event => {
                let last = reply
                    .pointer("/results/events")
                    .and_then(Value::as_array)
                    .and_then(|events| events.last());
                let Some(last) = last else {
                    return Ok(None);
                };
                let event = WireEvent::deserialize(last)?;
                Ok(Some(Self::from_wire(event.session, event.event)))
            }
        }
    }

    /// Whether an event should be ignored given the last revision seen.
    ///
    /// Inclusive: an event at exactly the last seen revision is discarded.
    #[must_use]
    pub const fn discard_event(&self, last_seen_revision: u64) -> bool {
        last_seen_revision >= self.revision
    }

    /// Replace block state with the result of a capture probe.
    pub fn apply_probe(&mut self, report: &ProbeReport) {
        self.done_capturing = report.done_capturing;
        self.image_blocks_drained = report.image_blocks_drained;
        self.image_blocks.clone_from(&report.image_blocks);
        self.image_blocks_complete.clone_from(&report.image_blocks_complete);
    }

    /// Wire form of the block state.
    ///
    /// Sessions in `noSession` or `ready` report nothing; drained sessions
    /// report their flags with empty lists.
    #[must_use]
    pub fn wire_fields(&self, include_complete: bool) -> SessionFields {
        let idle = matches!(self.state.as_str(), "noSession" | "ready");
        let (done_capturing, image_blocks_drained, image_blocks, complete) = if idle {
            (false, false, Vec::new(), Vec::new())
        } else if self.image_blocks_drained {
            (self.done_capturing, true, Vec::new(), Vec::new())
        } else {
            (
                self.done_capturing,
                false,
                self.image_blocks.clone(),
                self.image_blocks_complete.clone(),
            )
        };
        SessionFields {
            done_capturing,
            image_blocks_drained,
            image_blocks,
            image_blocks_complete: include_complete.then_some(complete),
        }
    }

    /// Session id, when the device sent one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }

    /// Session state name.
    #[must_use]
    pub fn state(&self) -> &str { &self.state }

    /// Session revision.
    #[must_use]
    pub const fn revision(&self) -> u64 { self.revision }

    /// `status.success` of the session.
    #[must_use]
    pub const fn status_success(&self) -> bool { self.status_success }

    /// `status.detected` of the session.
    #[must_use]
    pub fn status_detected(&self) -> &str { &self.status_detected }

    /// Whether capture has finished.
    #[must_use]
    pub const fn done_capturing(&self) -> bool { self.done_capturing }

    /// Whether every image block has been transferred.
    #[must_use]
    pub const fn image_blocks_drained(&self) -> bool { self.image_blocks_drained }

    /// Available image blocks in ascending order.
    #[must_use]
    pub fn image_blocks(&self) -> &[u64] { &self.image_blocks }

    /// Completed image ranges.
    #[must_use]
    pub fn image_blocks_complete(&self) -> &[ImageBlockRange] { &self.image_blocks_complete }

    /// Block addressed by a per-block command.
    #[must_use]
    pub const fn image_block_num(&self) -> Option<u64> { self.image_block_num }

    /// Set the block addressed by a per-block command.
    pub const fn set_image_block_num(&mut self, block: Option<u64>) { self.image_block_num = block; }

    /// Name of the event this snapshot came from.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> { self.event_name.as_deref() }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn capturing(revision: u64) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::new("capturing", revision);
        snapshot.apply_probe(&ProbeReport {
            image_blocks: vec![3, 4],
            image_blocks_complete: vec![ImageBlockRange { first: 1, last: 3 }],
            ..ProbeReport::default()
        });
        snapshot
    }

    #[rstest]
    #[case::older(4, false)]
    #[case::equal(5, true)]
    #[case::newer(6, true)]
    fn discard_is_inclusive(#[case] last_seen: u64, #[case] discard: bool) {
        assert_eq!(SessionSnapshot::new("capturing", 5).discard_event(last_seen), discard);
    }

    #[rstest]
    fn reads_session_reply() {
        let reply = json!({
            "results": {
                "success": true,
                "session": {
                    "sessionId": "abc",
                    "revision": 7,
                    "state": "capturing",
                    "status": {"success": false, "detected": "paperJam"},
                    "doneCapturing": false,
                    "imageBlocksDrained": false,
                    "imageBlocks": [2, 3],
                    "imageBlocksComplete": [{"f": 1, "l": 2}]
                }
            }
        });
        let snapshot = SessionSnapshot::from_reply(&reply, ReplyStyle::SimpleReplyWithSessionInfo)
            .expect("parse")
            .expect("present");
        assert_eq!(snapshot.session_id(), Some("abc"));
        assert_eq!(snapshot.revision(), 7);
        assert!(!snapshot.status_success());
        assert_eq!(snapshot.status_detected(), "paperJam");
        assert_eq!(snapshot.image_blocks(), &[2, 3]);
        assert_eq!(
            snapshot.image_blocks_complete(),
            &[ImageBlockRange { first: 1, last: 2 }]
        );
    }

    #[rstest]
    fn reads_last_event() {
        let reply = json!({
            "results": {
                "events": [
                    {"event": "imageBlocks", "session": {"revision": 3, "state": "capturing"}},
                    {"event": "sessionTimedOut", "session": {"revision": 4, "state": "noSession"}}
                ]
            }
        });
        let snapshot = SessionSnapshot::from_reply(&reply, ReplyStyle::Event)
            .expect("parse")
            .expect("present");
        assert_eq!(snapshot.event_name(), Some("sessionTimedOut"));
        assert_eq!(snapshot.state(), "noSession");
        assert_eq!(snapshot.revision(), 4);
        assert!(snapshot.status_success());
    }

    #[rstest]
    #[case::simple(ReplyStyle::SimpleReply)]
    #[case::session(ReplyStyle::SimpleReplyWithSessionInfo)]
    #[case::event(ReplyStyle::Event)]
    fn absent_members_yield_none(#[case] style: ReplyStyle) {
        let reply = json!({"results": {"success": true, "events": []}});
        assert_eq!(SessionSnapshot::from_reply(&reply, style).expect("parse"), None);
    }

    #[rstest]
    fn wrong_shape_is_an_error() {
        let reply = json!({"results": {"session": {"revision": "seven"}}});
        assert!(SessionSnapshot::from_reply(&reply, ReplyStyle::SimpleReplyWithSessionInfo).is_err());
    }

    #[rstest]
    fn capturing_serializes_blocks() {
        let fields = serde_json::to_value(capturing(1).wire_fields(true)).expect("serialize");
        assert_eq!(
            fields,
            json!({
                "doneCapturing": false,
                "imageBlocksDrained": false,
                "imageBlocks": [3, 4],
                "imageBlocksComplete": [{"f": 1, "l": 3}]
            })
        );
    }

    #[rstest]
    #[case::no_session("noSession")]
    #[case::ready("ready")]
    fn idle_states_serialize_empty(#[case] state: &str) {
        let mut snapshot = capturing(1);
        snapshot.state = state.to_owned();
        let fields = serde_json::to_value(snapshot.wire_fields(false)).expect("serialize");
        assert_eq!(
            fields,
            json!({"doneCapturing": false, "imageBlocksDrained": false, "imageBlocks": []})
        );
    }

    #[rstest]
    fn drained_sessions_keep_flags_only() {
        let mut snapshot = SessionSnapshot::new("draining", 9);
        snapshot.apply_probe(&ProbeReport {
            done_capturing: true,
            image_blocks_drained: true,
            image_blocks: vec![8],
            ..ProbeReport::default()
        });
        let fields = snapshot.wire_fields(true);
        assert!(fields.done_capturing);
        assert!(fields.image_blocks_drained);
        assert!(fields.image_blocks.is_empty());
        assert_eq!(fields.image_blocks_complete, Some(Vec::new()));
    }
}
