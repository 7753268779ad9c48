//! File-system probe of a capture in progress.
//!
//! The capture process writes one `img<N>.meta` file per image block into the
//! images directory, keeps intermediate `*.tw*` files in its work directory
//! while a block is being produced, and drops `imageBlocksDrained.meta` once
//! it will produce nothing more.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::debug;

use super::{CompletedRanges, ImageBlockRange, SessionError};

/// Marker written when capture has finished.
pub const DRAINED_MARKER: &str = "imageBlocksDrained.meta";

/// Values of `metadata.address.moreParts` that end a logical image.
pub const LAST_PART_MARKERS: [&str; 2] = ["lastPartInFile", "lastPartInFileMorePartsPending"];

/// Result of one probe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// The drained marker exists.
    pub done_capturing: bool,
    /// Nothing remains to be transferred.
    pub image_blocks_drained: bool,
    /// Available blocks in ascending order.
    pub image_blocks: Vec<u64>,
    /// Completed ranges, when a ledger was supplied.
    pub image_blocks_complete: Vec<ImageBlockRange>,
    /// Image file named by the progress payload.
    pub image_file: Option<String>,
    /// Thumbnail file named by the progress payload.
    pub thumbnail_file: Option<String>,
    /// Task reply carried by the progress payload.
    pub task_reply: Option<Value>,
}

/// Directories inspected by [`CaptureProbe::scan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureProbe {
    images_dir: PathBuf,
    work_dir: PathBuf,
}

impl CaptureProbe {
    /// Probe `images_dir` for blocks and `work_dir` for intermediate files.
    #[must_use]
    pub fn new(images_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Inspect the capture directories.
    ///
    /// Blocks are only listed while `capturing`. When `ranges` is supplied the
    /// available blocks are compacted into it, reading each new block's
    /// metadata file to find the last part of an image.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when a directory or metadata file cannot
    /// be read, [`SessionError::BlockName`] for an `img*.meta` file without a
    /// block number, and [`SessionError::Metadata`] for unparsable metadata.
    pub fn scan(
        &self,
        progress: &Value,
        capturing: bool,
        ranges: Option<&CompletedRanges>,
    ) -> Result<ProbeReport, SessionError> {
        let blocks = if capturing {
            self.list_blocks()?
        } else {
            Vec::new()
        };
        let pending_work = self.has_work_files()?;
        let marker = self.images_dir.join(DRAINED_MARKER);
        let done_capturing = marker.try_exists().map_err(|source| SessionError::Io {
            path: marker.clone(),
            source,
        })?;
        let image_blocks_drained =
            !(capturing && (!blocks.is_empty() || pending_work || !done_capturing));

        let numbers: Vec<u64> = blocks.iter().map(|(block, _)| *block).collect();
        let image_blocks_complete = match ranges {
            Some(ledger) => ledger.compact(&numbers, |block| {
                blocks
                    .iter()
                    .find(|(n, _)| *n == block)
                    .map_or(Ok(false), |(_, path)| is_last_part(path))
            })?,
            None => Vec::new(),
        };
        debug!(
            blocks = ?numbers,
            pending_work,
            done_capturing,
            image_blocks_drained,
            "capture probed"
        );

        Ok(ProbeReport {
            done_capturing,
            image_blocks_drained,
            image_blocks: numbers,
            image_blocks_complete,
            image_file: text(progress, "imageFile"),
            thumbnail_file: text(progress, "thumbnailFile"),
            task_reply: progress.get("taskReply").cloned(),
        })
    }

    fn list_blocks(&self) -> Result<Vec<(u64, PathBuf)>, SessionError> {
        let mut blocks = Vec::new();
        for path in entries(&self.images_dir)? {
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(number) = name
                .strip_prefix("img")
                .and_then(|rest| rest.strip_suffix(".meta"))
            else {
                continue;
            };
            let block = number
                .parse::<u64>()
                .map_err(|_| SessionError::BlockName(name.to_owned()))?;
            blocks.push((block, path));
        }
        blocks.sort_unstable_by_key(|(block, _)| *block);
        Ok(blocks)
    }

    fn has_work_files(&self) -> Result<bool, SessionError> {
        Ok(entries(&self.work_dir)?.iter().any(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.starts_with("tw"))
        }))
    }
}

fn entries(dir: &Path) -> Result<Vec<PathBuf>, SessionError> {
    let io_err = |source: io::Error| SessionError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };
    listing
        .map(|entry| entry.map(|entry| entry.path()).map_err(io_err))
        .collect()
}

fn is_last_part(path: &Path) -> Result<bool, SessionError> {
    let raw = fs::read_to_string(path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let meta: Value = serde_json::from_str(&raw).map_err(|source| SessionError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(meta
        .pointer("/metadata/address/moreParts")
        .and_then(Value::as_str)
        .is_some_and(|parts| LAST_PART_MARKERS.contains(&parts)))
}

fn text(progress: &Value, key: &str) -> Option<String> {
    progress.get(key).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    struct Dirs {
        _root: TempDir,
        images: PathBuf,
        work: PathBuf,
    }

    impl Dirs {
        fn probe(&self) -> CaptureProbe { CaptureProbe::new(&self.images, &self.work) }

        fn block(&self, n: u64, more_parts: &str) {
            let meta = json!({"metadata": {"address": {"moreParts": more_parts}}});
            fs::write(self.images.join(format!("img{n:06}.meta")), meta.to_string())
                .expect("write meta");
        }
    }

    #[fixture]
    fn dirs() -> Dirs {
        let root = TempDir::new().expect("tempdir");
        let images = root.path().join("tdimages");
        let work = root.path().join("twimages");
        fs::create_dir_all(&images).expect("images");
        fs::create_dir_all(&work).expect("work");
        Dirs {
            _root: root,
            images,
            work,
        }
    }

    #[rstest]
    fn lists_blocks_in_numeric_order(dirs: Dirs) {
        for n in [10, 2, 1] {
            dirs.block(n, "morePartsPending");
        }
        let report = dirs.probe().scan(&json!({}), true, None).expect("scan");
        assert_eq!(report.image_blocks, vec![1, 2, 10]);
        assert!(!report.image_blocks_drained);
        assert!(!report.done_capturing);
    }

    #[rstest]
    fn drained_once_marker_and_nothing_pending(dirs: Dirs) {
        fs::write(dirs.images.join(DRAINED_MARKER), "{}").expect("marker");
        let report = dirs.probe().scan(&json!({}), true, None).expect("scan");
        assert!(report.done_capturing);
        assert!(report.image_blocks_drained);
    }

    #[rstest]
    fn work_files_keep_session_undrained(dirs: Dirs) {
        fs::write(dirs.images.join(DRAINED_MARKER), "{}").expect("marker");
        fs::write(dirs.work.join("img000003.twpdf"), b"partial").expect("tw");
        let report = dirs.probe().scan(&json!({}), true, None).expect("scan");
        assert!(report.done_capturing);
        assert!(!report.image_blocks_drained);
    }

    #[rstest]
    fn not_capturing_is_drained(dirs: Dirs) {
        dirs.block(1, "lastPartInFile");
        let report = dirs.probe().scan(&json!({}), false, None).expect("scan");
        assert!(report.image_blocks.is_empty());
        assert!(report.image_blocks_drained);
    }

    #[rstest]
    fn compacts_from_metadata(dirs: Dirs) {
        for (n, parts) in [
            (1, "morePartsPending"),
            (2, "lastPartInFile"),
            (3, "morePartsPending"),
            (4, "morePartsPending"),
            (5, "lastPartInFileMorePartsPending"),
        ] {
            dirs.block(n, parts);
        }
        let ledger = CompletedRanges::new();
        let report = dirs.probe().scan(&json!({}), true, Some(&ledger)).expect("scan");
        assert_eq!(
            report.image_blocks_complete,
            vec![
                ImageBlockRange { first: 1, last: 2 },
                ImageBlockRange { first: 3, last: 5 },
            ]
        );
    }

    #[rstest]
    fn passes_progress_values_through(dirs: Dirs) {
        let progress = json!({
            "imageFile": "/tmp/img000001.pdf",
            "thumbnailFile": "/tmp/img000001_thumbnail.pdf",
            "taskReply": {"actions": []}
        });
        let report = dirs.probe().scan(&progress, true, None).expect("scan");
        assert_eq!(report.image_file.as_deref(), Some("/tmp/img000001.pdf"));
        assert_eq!(
            report.thumbnail_file.as_deref(),
            Some("/tmp/img000001_thumbnail.pdf")
        );
        assert_eq!(report.task_reply, Some(json!({"actions": []})));
    }

    #[rstest]
    fn bad_block_name_is_reported(dirs: Dirs) {
        fs::write(dirs.images.join("imgABC.meta"), "{}").expect("write");
        let err = dirs.probe().scan(&json!({}), true, None).expect_err("bad name");
        assert!(matches!(err, SessionError::BlockName(name) if name == "imgABC.meta"));
    }

    #[rstest]
    fn bad_metadata_is_reported(dirs: Dirs) {
        fs::write(dirs.images.join("img000001.meta"), "not json").expect("write");
        let ledger = CompletedRanges::new();
        let err = dirs
            .probe()
            .scan(&json!({}), true, Some(&ledger))
            .expect_err("bad metadata");
        assert!(matches!(err, SessionError::Metadata { .. }));
    }
}
