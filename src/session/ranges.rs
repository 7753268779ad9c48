//! Completed image-block ranges shared across one capture session.
//!
//! A [`CompletedRanges`] handle is created when capture starts and passed to
//! every transaction of that session. All access goes through one lock, so
//! concurrent transactions observe a consistent ledger; compaction itself
//! assumes blocks are produced in ascending order by a single device.

use std::sync::{Arc, Mutex, MutexGuard};

use super::snapshot::ImageBlockRange;

#[derive(Debug)]
struct RangeLedger {
    ranges: Vec<ImageBlockRange>,
    first_unassigned: u64,
}

impl Default for RangeLedger {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            first_unassigned: 1,
        }
    }
}

/// Shared handle to the completed ranges of a capture session.
#[derive(Clone, Debug, Default)]
pub struct CompletedRanges {
    inner: Arc<Mutex<RangeLedger>>,
}

impl CompletedRanges {
    /// Empty ledger starting at block 1.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, RangeLedger> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Forget every range; called when a new capture starts.
    pub fn reset(&self) { *self.lock() = RangeLedger::default(); }

    /// Ranges currently held.
    #[must_use]
    pub fn ranges(&self) -> Vec<ImageBlockRange> { self.lock().ranges.clone() }

    /// Whether a recorded range covers `block`.
    #[must_use]
    pub fn covers(&self, block: u64) -> bool {
        self.lock().ranges.iter().any(|range| range.contains(block))
    }

    /// Fold the currently available `blocks` into the ledger.
    ///
    /// Blocks are visited in ascending order. Each block not already covered
    /// is passed to `is_last`; a block that ends a logical image closes the
    /// range from the first unassigned block up to it. Ranges that end before
    /// the oldest available block are pruned afterwards, and all ranges are
    /// pruned when no blocks remain.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by `is_last`. Ranges closed before the
    /// failure are kept.
    pub fn compact<F, E>(&self, blocks: &[u64], mut is_last: F) -> Result<Vec<ImageBlockRange>, E>
    where
        F: FnMut(u64) -> Result<bool, E>,
    {
        let mut sorted = blocks.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ledger = self.lock();
        for &block in &sorted {
            if block < ledger.first_unassigned
                || ledger.ranges.iter().any(|range| range.contains(block))
            {
                continue;
            }
            if is_last(block)? {
                let range = ImageBlockRange {
                    first: ledger.first_unassigned,
                    last: block,
                };
                ledger.ranges.push(range);
                ledger.first_unassigned = block.saturating_add(1);
            }
        }

        let oldest = sorted.first().copied().unwrap_or(u64::MAX);
        ledger.ranges.retain(|range| range.last >= oldest);
        Ok(ledger.ranges.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn last_parts(block: u64) -> Result<bool, Infallible> { Ok(block == 2 || block == 5) }

    fn range(first: u64, last: u64) -> ImageBlockRange { ImageBlockRange { first, last } }

    #[rstest]
    fn compacts_two_images() {
        let ledger = CompletedRanges::new();
        let ranges = ledger.compact(&[1, 2, 3, 4, 5], last_parts).expect("compact");
        assert_eq!(ranges, vec![range(1, 2), range(3, 5)]);
    }

    #[rstest]
    fn covered_blocks_are_not_rechecked() {
        let ledger = CompletedRanges::new();
        ledger.compact(&[1, 2], last_parts).expect("first pass");
        let mut checked = Vec::new();
        ledger
            .compact(&[1, 2, 3], |block| {
                checked.push(block);
                Ok::<_, Infallible>(false)
            })
            .expect("second pass");
        assert_eq!(checked, vec![3]);
        assert!(ledger.covers(2));
        assert!(!ledger.covers(3));
    }

    #[rstest]
    fn prunes_ranges_behind_oldest_block() {
        let ledger = CompletedRanges::new();
        ledger.compact(&[1, 2, 3], last_parts).expect("first pass");
        let ranges = ledger.compact(&[3, 4, 5], last_parts).expect("second pass");
        assert_eq!(ranges, vec![range(3, 5)]);
    }

    #[rstest]
    fn empty_blocks_prune_everything() {
        let ledger = CompletedRanges::new();
        ledger.compact(&[1, 2], last_parts).expect("first pass");
        assert!(ledger.compact(&[], last_parts).expect("drained").is_empty());
        let ranges = ledger.compact(&[3, 4, 5], last_parts).expect("next image");
        assert_eq!(ranges, vec![range(3, 5)]);
    }

    #[rstest]
    fn reset_restarts_at_block_one() {
        let ledger = CompletedRanges::new();
        ledger.compact(&[1, 2], last_parts).expect("compact");
        ledger.reset();
        assert!(ledger.ranges().is_empty());
        let ranges = ledger.compact(&[1, 2], last_parts).expect("compact");
        assert_eq!(ranges, vec![range(1, 2)]);
    }

    #[rstest]
    fn errors_propagate() {
        let ledger = CompletedRanges::new();
        let err = ledger
            .compact(&[1], |_| Err::<bool, _>("unreadable"))
            .expect_err("fails");
        assert_eq!(err, "unreadable");
    }

    proptest! {
        #[test]
        fn order_does_not_matter(blocks in Just(vec![1u64, 2, 3, 4, 5]).prop_shuffle()) {
            let ledger = CompletedRanges::new();
            let ranges = ledger.compact(&blocks, last_parts).expect("compact");
            prop_assert_eq!(ranges, vec![range(1, 2), range(3, 5)]);
        }
    }
}
