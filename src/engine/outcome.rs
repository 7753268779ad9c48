//! Classification of a finished transaction.

use std::{fmt, path::PathBuf};

use crate::{multipart::SectionKind, tally::TransferTally};

/// Status recorded when no HTTP status was received.
pub const NON_HTTP_STATUS: u32 = 999_999_999;

/// Layer that reported a failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ErrorFacility {
    /// No failure.
    #[default]
    None,
    /// No usable HTTP response, or a status of 300 or above.
    HttpStatus,
    /// The authorization token was missing or invalid.
    Security,
    /// Malformed framing or reply content type.
    Protocol,
    /// Command-language failure recorded by a calling layer.
    Language,
}

impl ErrorFacility {
    /// Wire name of the facility.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::HttpStatus => "httpStatus",
            Self::Security => "security",
            Self::Protocol => "protocol",
            Self::Language => "language",
        }
    }
}

impl fmt::Display for ErrorFacility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// How the reply to a command is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReplyStyle {
    /// Results only.
    #[default]
    SimpleReply,
    /// Results carry a `session` object.
    SimpleReplyWithSessionInfo,
    /// Results carry an `events` array from a long-lived wait.
    Event,
}

/// Progress of one transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Not yet issued.
    #[default]
    Idle,
    /// Building and sending the request.
    Sending,
    /// Request sent; waiting for the status line and headers.
    AwaitingResponseHeaders,
    /// Reading a JSON body.
    ReadingJsonBody,
    /// Reading a multipart body.
    ReadingMultipart,
    /// Finished with a successful reply.
    Completed,
    /// Finished with a classified failure.
    Failed,
    /// Stopped by abort or timeout.
    Aborted,
}

impl TransactionState {
    /// Whether the transaction has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Everything a finished exchange reports.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) status: Option<u32>,
    pub(crate) response_headers: Vec<(String, String)>,
    pub(crate) body: Option<String>,
    pub(crate) facility: ErrorFacility,
    pub(crate) codes: Vec<String>,
    pub(crate) descriptions: Vec<String>,
    pub(crate) tally: TransferTally,
    pub(crate) files: Vec<(SectionKind, PathBuf)>,
}

impl Record {
    /// A failure with no HTTP response.
    pub(crate) fn unanswered(code: &str, description: impl Into<String>) -> Self {
        Self {
            status: Some(NON_HTTP_STATUS),
            ..Self::default()
        }
        .fail(ErrorFacility::HttpStatus, code, description)
    }

    pub(crate) fn fail(
        mut self,
        facility: ErrorFacility,
        code: &str,
        description: impl Into<String>,
    ) -> Self {
        self.facility = facility;
        self.codes.push(code.to_owned());
        self.descriptions.push(description.into());
        self
    }
}

/// Terminal result delivered exactly once per transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Settled {
    pub(crate) state: TransactionState,
    pub(crate) record: Record,
}

impl Settled {
    pub(crate) fn aborted(is_timeout: bool) -> Self {
        let record = if is_timeout {
            Record::unanswered("timeout", "request timed out")
        } else {
            Record::unanswered("aborted", "request aborted")
        };
        Self {
            state: TransactionState::Aborted,
            record,
        }
    }

    pub(crate) fn finished(record: Record) -> Self {
        let state = if record.facility == ErrorFacility::None {
            TransactionState::Completed
        } else {
            TransactionState::Failed
        };
        Self { state, record }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::timeout(true, "timeout")]
    #[case::abort(false, "aborted")]
    fn aborts_use_sentinel_status(#[case] is_timeout: bool, #[case] code: &str) {
        let settled = Settled::aborted(is_timeout);
        assert_eq!(settled.state, TransactionState::Aborted);
        assert_eq!(settled.record.status, Some(NON_HTTP_STATUS));
        assert_eq!(settled.record.facility, ErrorFacility::HttpStatus);
        assert_eq!(settled.record.codes, vec![code.to_owned()]);
    }

    #[rstest]
    fn finished_state_follows_facility() {
        assert_eq!(
            Settled::finished(Record::default()).state,
            TransactionState::Completed
        );
        let failed = Record::default().fail(ErrorFacility::Protocol, "missingJson", "no json");
        assert_eq!(Settled::finished(failed).state, TransactionState::Failed);
    }

    #[rstest]
    #[case(TransactionState::Idle, false)]
    #[case(TransactionState::ReadingMultipart, false)]
    #[case(TransactionState::Completed, true)]
    #[case(TransactionState::Aborted, true)]
    fn terminal_states(#[case] state: TransactionState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }
}
