//! Recursive comparison of two directory trees.
//!
//! Both trees are walked in lock-step, one directory level per call. Every
//! discrepancy found is appended to a caller-owned list of [`Difference`]s;
//! nothing is short-circuited unless `exit_on_first_difference` is set, and
//! even then only the current level stops.

pub mod file;

use file::SamplingPolicy;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

pub use file::compare_files;

/// Marker file placed in otherwise empty directories so version control keeps them.
pub const IGNORE_MARKER_FILE: &str = ".blackbox_ignore_this_file";

/// File names skipped at every level when nothing else is configured.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[".DS_Store", IGNORE_MARKER_FILE];

/// Error type for tree comparison.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// A directory handed to the comparator does not exist.
    #[error("directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    /// Listing or reading an entry failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One discrepancy between the two trees.
///
/// The `Display` rendering is what ends up in test reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Difference {
    SizeDiffers {
        left: String,
        right: String,
        left_size: u64,
        right_size: u64,
    },
    FullChecksumDiffers {
        left: String,
        right: String,
    },
    FirstPartDiffers {
        left: String,
        right: String,
    },
    LastPartDiffers {
        left: String,
        right: String,
    },
    /// Entries present on one side only, directories suffixed with `/`.
    Orphans {
        left_dir: PathBuf,
        right_dir: PathBuf,
        names: Vec<String>,
    },
    /// A name that is a file on one side and a directory on the other.
    TypeMismatch {
        name: String,
        left_dir: PathBuf,
        right_dir: PathBuf,
    },
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::SizeDiffers {
                left,
                right,
                left_size,
                right_size,
            } => write!(
                f,
                "* Size differs: {left} != {right}: {left} = {left_size}, {right} = {right_size}"
            ),
            Difference::FullChecksumDiffers { left, right } => {
                write!(f, "* Full file checksum differs: {left} != {right}")
            }
            Difference::FirstPartDiffers { left, right } => {
                write!(f, "* First part checksum mismatch: {left} and {right}")
            }
            Difference::LastPartDiffers { left, right } => {
                write!(f, "* Last part checksum mismatch: {left} and {right}")
            }
            Difference::Orphans {
                left_dir,
                right_dir,
                names,
            } => {
                let quoted: Vec<String> = names.iter().map(|n| quote_name(n)).collect();
                write!(
                    f,
                    "Between {} and {}, found orphan files/folders: [{}]",
                    left_dir.display(),
                    right_dir.display(),
                    quoted.join(", ")
                )
            }
            Difference::TypeMismatch {
                name,
                left_dir,
                right_dir,
            } => write!(
                f,
                "* One file, one folder: {name} in dirs {} and {}",
                left_dir.display(),
                right_dir.display()
            ),
        }
    }
}

/// Quote a name the way Python's `repr` quotes a string: single quotes unless
/// the name holds a `'` and no `"`.
fn quote_name(name: &str) -> String {
    let quote = if name.contains('\'') && !name.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(name.len() + 2);
    out.push(quote);
    for c in name.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Settings for one top-level comparison, shared unchanged by every level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareConfig {
    /// Stop scanning a directory level after its first difference.
    pub exit_on_first_difference: bool,
    /// Hashing tiers for regular files.
    pub sampling: SamplingPolicy,
    /// Names skipped on both sides at every level.
    pub ignore_files: BTreeSet<String>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            exit_on_first_difference: false,
            sampling: SamplingPolicy::default(),
            ignore_files: DEFAULT_IGNORE_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CompareConfig {
    pub fn with_section_size(mut self, section_size: u64) -> Self {
        self.sampling.section_size = section_size;
        self
    }

    pub fn with_exit_on_first_difference(mut self, exit: bool) -> Self {
        self.exit_on_first_difference = exit;
        self
    }
}

/// Compare two directory trees from their roots.
///
/// Both roots must exist; a missing root is an input error rather than a tree
/// full of orphans.
pub fn compare_trees(
    left: &Path,
    right: &Path,
    config: &CompareConfig,
) -> Result<Vec<Difference>, CompareError> {
    for root in [left, right] {
        if !root.is_dir() {
            return Err(CompareError::MissingDirectory(root.to_path_buf()));
        }
    }

    let mut differences = Vec::new();
    compare_folders(left, right, &mut differences, config)?;
    tracing::debug!(
        "compared {} with {}: {} difference(s)",
        left.display(),
        right.display(),
        differences.len()
    );
    Ok(differences)
}

/// Compare one directory level and recurse into directories common to both sides.
///
/// Differences are appended to `differences` in discovery order. With
/// `exit_on_first_difference` this level returns after its first file-level or
/// type difference; the caller one level up carries on with its own entries.
pub fn compare_folders(
    left: &Path,
    right: &Path,
    differences: &mut Vec<Difference>,
    config: &CompareConfig,
) -> Result<(), CompareError> {
    let left_names = list_names(left, &config.ignore_files)?;
    let right_names = list_names(right, &config.ignore_files)?;

    let mut orphans: Vec<String> = left_names
        .symmetric_difference(&right_names)
        .map(|name| {
            let shown = name.to_string_lossy();
            if left.join(name).is_dir() || right.join(name).is_dir() {
                format!("{shown}/")
            } else {
                shown.into_owned()
            }
        })
        .collect();

    if !orphans.is_empty() {
        orphans.sort();
        differences.push(Difference::Orphans {
            left_dir: left.to_path_buf(),
            right_dir: right.to_path_buf(),
            names: orphans,
        });
    }

    // BTreeSet intersection yields names in byte order
    for name in left_names.intersection(&right_names) {
        let left_path = left.join(name);
        let right_path = right.join(name);
        let dir_count = usize::from(left_path.is_dir()) + usize::from(right_path.is_dir());

        match dir_count {
            2 => compare_folders(&left_path, &right_path, differences, config)?,
            1 => {
                differences.push(Difference::TypeMismatch {
                    name: name.to_string_lossy().into_owned(),
                    left_dir: left.to_path_buf(),
                    right_dir: right.to_path_buf(),
                });
                if config.exit_on_first_difference {
                    return Ok(());
                }
            }
            _ => {
                let result = compare_files(&left_path, &right_path, &config.sampling)?;
                if let Some(difference) = result {
                    differences.push(difference);
                    if config.exit_on_first_difference {
                        return Ok(());
                    }
                }
            }
        }
    }

    Ok(())
}

/// Entry names of `dir`, kept as raw OS strings so names that are not valid
/// UTF-8 still join back onto their real paths.
fn list_names(dir: &Path, ignore: &BTreeSet<String>) -> Result<BTreeSet<OsString>, CompareError> {
    let io_err = |source: std::io::Error| CompareError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CompareError::MissingDirectory(dir.to_path_buf())
        } else {
            io_err(e)
        }
    })? {
        let name = entry.map_err(io_err)?.file_name();
        if !name.to_str().is_some_and(|n| ignore.contains(n)) {
            names.insert(name);
        }
    }
    Ok(names)
}
