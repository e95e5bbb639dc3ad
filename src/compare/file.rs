//! Tiered content comparison of two regular files.
//!
//! Sizes are compared first. Files below the sampling threshold are hashed in
//! full; larger files only have their first and last sections hashed, so a
//! difference confined to the middle of two equally sized files is not seen.

use super::{CompareError, Difference};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Section size used when nothing else is configured.
pub const DEFAULT_SECTION_SIZE: u64 = 4;

/// Number of sections at or above which a file is sampled instead of fully hashed.
pub const DEFAULT_SAMPLE_THRESHOLD: u64 = 3;

/// How much of a pair of equally sized files gets hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStrategy {
    /// Hash the entire content.
    Full,
    /// Hash only the first and last `section_size` bytes.
    Sampled { section_size: u64 },
}

/// Which of the two compared inputs an I/O error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// An I/O failure on one of the two streams being compared.
#[derive(Debug, thiserror::Error)]
#[error("{side:?} stream: {source}")]
pub struct StreamError {
    pub side: Side,
    #[source]
    pub source: io::Error,
}

impl StreamError {
    fn left(source: io::Error) -> Self {
        Self {
            side: Side::Left,
            source,
        }
    }

    fn right(source: io::Error) -> Self {
        Self {
            side: Side::Right,
            source,
        }
    }
}

/// Chooses a [`HashStrategy`] from a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub section_size: u64,
    pub sample_threshold: u64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            section_size: DEFAULT_SECTION_SIZE,
            sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
        }
    }
}

impl SamplingPolicy {
    pub fn new(section_size: u64) -> Self {
        Self {
            section_size,
            ..Self::default()
        }
    }

    /// Strategy for a pair of files that are both `size` bytes long.
    pub fn strategy_for(&self, size: u64) -> HashStrategy {
        if size < self.sample_threshold.saturating_mul(self.section_size) {
            HashStrategy::Full
        } else {
            HashStrategy::Sampled {
                section_size: self.section_size,
            }
        }
    }
}

/// Compare two files on disk.
///
/// Returns `Ok(None)` when the files are judged equal. I/O failures are
/// returned as errors naming the file that failed, and never reported as a
/// content difference.
pub fn compare_files(
    left: &Path,
    right: &Path,
    policy: &SamplingPolicy,
) -> Result<Option<Difference>, CompareError> {
    let io_err = |path: &Path, source: io::Error| CompareError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut left_file = File::open(left).map_err(|e| io_err(left, e))?;
    let mut right_file = File::open(right).map_err(|e| io_err(right, e))?;
    compare_streams(
        &left.display().to_string(),
        &right.display().to_string(),
        &mut left_file,
        &mut right_file,
        policy,
    )
    .map_err(|e| match e.side {
        Side::Left => io_err(left, e.source),
        Side::Right => io_err(right, e.source),
    })
}

/// Compare two seekable streams, naming them `left_name` and `right_name` in
/// any reported difference.
pub fn compare_streams<L, R>(
    left_name: &str,
    right_name: &str,
    left: &mut L,
    right: &mut R,
    policy: &SamplingPolicy,
) -> Result<Option<Difference>, StreamError>
where
    L: Read + Seek,
    R: Read + Seek,
{
    let left_size = left.seek(SeekFrom::End(0)).map_err(StreamError::left)?;
    let right_size = right.seek(SeekFrom::End(0)).map_err(StreamError::right)?;

    if left_size != right_size {
        return Ok(Some(Difference::SizeDiffers {
            left: left_name.to_string(),
            right: right_name.to_string(),
            left_size,
            right_size,
        }));
    }

    match policy.strategy_for(left_size) {
        HashStrategy::Full => {
            let left_hash = hash_from(left, 0, u64::MAX).map_err(StreamError::left)?;
            let right_hash = hash_from(right, 0, u64::MAX).map_err(StreamError::right)?;
            if left_hash != right_hash {
                return Ok(Some(Difference::FullChecksumDiffers {
                    left: left_name.to_string(),
                    right: right_name.to_string(),
                }));
            }
            Ok(None)
        }
        HashStrategy::Sampled { section_size } => {
            let left_head = hash_from(left, 0, section_size).map_err(StreamError::left)?;
            let right_head = hash_from(right, 0, section_size).map_err(StreamError::right)?;
            if left_head != right_head {
                return Ok(Some(Difference::FirstPartDiffers {
                    left: left_name.to_string(),
                    right: right_name.to_string(),
                }));
            }

            // size >= threshold * section_size, so the offset stays in bounds
            let tail = left_size - section_size;
            let left_tail = hash_from(left, tail, section_size).map_err(StreamError::left)?;
            let right_tail = hash_from(right, tail, section_size).map_err(StreamError::right)?;
            if left_tail != right_tail {
                return Ok(Some(Difference::LastPartDiffers {
                    left: left_name.to_string(),
                    right: right_name.to_string(),
                }));
            }
            Ok(None)
        }
    }
}

/// Hash up to `len` bytes starting at `offset`.
fn hash_from<R: Read + Seek>(reader: &mut R, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut hasher = Sha256::new();
    io::copy(&mut reader.take(len), &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}
