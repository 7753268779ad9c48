//! Byte and section accounting for a single transaction.
//!
//! A [`TransferTally`] tracks three totals for a reply body: the length the
//! peer declared, the bytes actually read off the wire, and the bytes the
//! parser has logically consumed. Multipart replies add one [`SectionTally`]
//! per section so diagnostics can show exactly where a stream went wrong.

use crate::multipart::SectionKind;

/// Counters for one multipart section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionTally {
    kind: SectionKind,
    declared: u64,
    processed: u64,
    headers: Vec<String>,
}

impl SectionTally {
    /// Section content kind.
    #[must_use]
    pub const fn kind(&self) -> SectionKind { self.kind }

    /// Body length announced by the section's `Content-Length` header.
    #[must_use]
    pub const fn declared(&self) -> u64 { self.declared }

    /// Body bytes consumed so far.
    #[must_use]
    pub const fn processed(&self) -> u64 { self.processed }

    /// Raw header lines captured for this section.
    #[must_use]
    pub fn headers(&self) -> &[String] { &self.headers }

    /// Whether the whole declared body has been consumed.
    #[must_use]
    pub const fn is_complete(&self) -> bool { self.processed == self.declared }
}

/// Hierarchical transfer counters for one reply.
///
/// Cloning a tally deep-copies the section list, so a clone taken as a
/// snapshot is unaffected by later updates to the live value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferTally {
    declared: Option<u64>,
    read: u64,
    processed: u64,
    sections: Vec<SectionTally>,
}

impl TransferTally {
    /// Create a tally for a body whose total length may be unknown.
    #[must_use]
    pub const fn new(declared: Option<u64>) -> Self {
        Self {
            declared,
            read: 0,
            processed: 0,
            sections: Vec::new(),
        }
    }

    /// Record `n` bytes received from the transport.
    pub const fn add_read(&mut self, n: u64) { self.read = self.read.saturating_add(n); }

    /// Record `n` bytes consumed outside any section body (framing, headers).
    pub const fn add_processed(&mut self, n: u64) {
        self.processed = self.processed.saturating_add(n);
    }

    /// Open a new section with its declared body length and header lines.
    pub fn begin_section(&mut self, kind: SectionKind, declared: u64, headers: Vec<String>) {
        self.sections.push(SectionTally {
            kind,
            declared,
            processed: 0,
            headers,
        });
    }

    /// Record `n` body bytes against the current section and the grand total.
    pub fn add_section_processed(&mut self, n: u64) {
        if let Some(section) = self.sections.last_mut() {
            section.processed = section.processed.saturating_add(n);
        }
        self.add_processed(n);
    }

    /// Total length declared by the transport, if any.
    #[must_use]
    pub const fn declared(&self) -> Option<u64> { self.declared }

    /// Bytes received from the transport.
    #[must_use]
    pub const fn read(&self) -> u64 { self.read }

    /// Bytes consumed by the parser.
    #[must_use]
    pub const fn processed(&self) -> u64 { self.processed }

    /// Per-section counters in arrival order.
    #[must_use]
    pub fn sections(&self) -> &[SectionTally] { &self.sections }

    /// The first section of the given kind, if one was seen.
    #[must_use]
    pub fn section(&self, kind: SectionKind) -> Option<&SectionTally> {
        self.sections.iter().find(|section| section.kind == kind)
    }

    /// Sum of body bytes consumed across all sections.
    #[must_use]
    pub fn section_total(&self) -> u64 {
        self.sections
            .iter()
            .fold(0u64, |acc, section| acc.saturating_add(section.processed))
    }

    /// Whether the processed count is still within the declared length.
    ///
    /// Always true when the transport did not declare a length.
    #[must_use]
    pub fn within_declared(&self) -> bool {
        self.declared.is_none_or(|declared| self.processed <= declared)
    }

    /// Deep copy suitable for read-only historical use.
    #[must_use]
    pub fn snapshot(&self) -> Self { self.clone() }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn section_progress_rolls_up_to_total() {
        let mut tally = TransferTally::new(Some(100));
        tally.add_read(100);
        tally.add_processed(20);
        tally.begin_section(SectionKind::Json, 7, vec!["Content-Length: 7".to_owned()]);
        tally.add_section_processed(7);
        tally.begin_section(SectionKind::Image, 50, Vec::new());
        tally.add_section_processed(30);

        assert_eq!(tally.processed(), 57);
        assert_eq!(tally.section_total(), 37);
        assert_eq!(tally.sections().len(), 2);
        assert!(tally.section(SectionKind::Json).is_some_and(SectionTally::is_complete));
        assert!(!tally.section(SectionKind::Image).is_some_and(SectionTally::is_complete));
        assert!(tally.within_declared());
    }

    #[rstest]
    fn snapshot_is_not_affected_by_later_updates() {
        let mut tally = TransferTally::new(None);
        tally.begin_section(SectionKind::Thumbnail, 10, Vec::new());
        let snapshot = tally.snapshot();

        tally.add_section_processed(10);
        tally.begin_section(SectionKind::Image, 5, Vec::new());

        assert_eq!(snapshot.sections().len(), 1);
        assert_eq!(snapshot.sections().first().map(SectionTally::processed), Some(0));
        assert_eq!(snapshot.processed(), 0);
    }

    #[rstest]
    #[case::under(Some(10), 9, true)]
    #[case::exact(Some(10), 10, true)]
    #[case::over(Some(10), 11, false)]
    #[case::undeclared(None, 1_000, true)]
    fn within_declared_bounds(
        #[case] declared: Option<u64>,
        #[case] processed: u64,
        #[case] expected: bool,
    ) {
        let mut tally = TransferTally::new(declared);
        tally.add_processed(processed);
        assert_eq!(tally.within_declared(), expected);
    }

    #[rstest]
    fn section_progress_without_open_section_counts_total_only() {
        let mut tally = TransferTally::new(None);
        tally.add_section_processed(3);
        assert_eq!(tally.processed(), 3);
        assert_eq!(tally.section_total(), 0);
    }
}
