//! Block state for one capture session, as the configuration asks for it.

use serde_json::Value;
use tracing::debug;

use super::{
    CaptureProbe,
    CompletedRanges,
    ProbeReport,
    SessionError,
    SessionFields,
    SessionSnapshot,
};
use crate::config::TransportConfig;

/// Folds capture probes into session snapshots.
///
/// Range compaction and the `imageBlocksComplete` wire field are both gated
/// on [`TransportConfig::use_image_blocks_complete`]. With the switch off the
/// ledger is never touched.
#[derive(Debug)]
pub struct SessionBookkeeper {
    probe: CaptureProbe,
    ranges: CompletedRanges,
    report_complete: bool,
}

impl SessionBookkeeper {
    /// Track the capture inspected by `probe` under `config`.
    #[must_use]
    pub fn new(probe: CaptureProbe, config: &TransportConfig) -> Self {
        Self {
            probe,
            ranges: CompletedRanges::new(),
            report_complete: config.use_image_blocks_complete,
        }
    }

    /// Probe the capture and apply the result to `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] raised by [`CaptureProbe::scan`].
    pub fn refresh(
        &self,
        snapshot: &mut SessionSnapshot,
        progress: &Value,
        capturing: bool,
    ) -> Result<ProbeReport, SessionError> {
        let ledger = self.report_complete.then_some(&self.ranges);
        let report = self.probe.scan(progress, capturing, ledger)?;
        snapshot.apply_probe(&report);
        debug!(
            revision = snapshot.revision(),
            complete = report.image_blocks_complete.len(),
            "session refreshed"
        );
        Ok(report)
    }

    /// Wire fields for `snapshot`.
    #[must_use]
    pub fn wire_fields(&self, snapshot: &SessionSnapshot) -> SessionFields {
        snapshot.wire_fields(self.report_complete)
    }

    /// Whether completed ranges are compacted and reported.
    #[must_use]
    pub const fn reports_complete(&self) -> bool { self.report_complete }

    /// Ranges recorded so far in this capture.
    #[must_use]
    pub const fn ranges(&self) -> &CompletedRanges { &self.ranges }
}
