//! Schema definitions for blackbox suite and case configuration.
//!
//! A suite is a directory of test cases with an optional `global.yaml`. Each
//! case directory holds a `config.yaml` whose settings fall back to the suite
//! values when missing.

use crate::compare::file::{DEFAULT_SAMPLE_THRESHOLD, SamplingPolicy};
use crate::compare::{CompareConfig, DEFAULT_IGNORE_FILES, IGNORE_MARKER_FILE};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Section size used by the harness when neither suite nor case sets one.
pub const HARNESS_SECTION_SIZE: u64 = 64 * 1024;

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Suite-level configuration loaded from `global.yaml` in the suite root.
///
/// Provides defaults that apply to every case in the suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SuiteConfig {
    /// Values substituted for `{name}` in commands, text input and descriptions.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(flatten)]
    pub defaults: CaseConfig,

    /// Run cases concurrently, each in its own working directory (default: false).
    #[serde(default)]
    pub parallel: bool,
}

/// Case-level configuration loaded from `config.yaml` in a case directory.
///
/// Every field is optional and falls back to the suite configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CaseConfig {
    /// Shell command run inside the working directory.
    #[serde(default)]
    pub command: Option<String>,

    /// Lines fed to the command's standard input, each terminated by a newline.
    #[serde(default)]
    pub text_input: Option<Vec<String>>,

    /// Human-readable description shown in reports.
    #[serde(default)]
    pub test_description: Option<String>,

    /// Bytes hashed from each end of large files.
    #[serde(default)]
    pub section_size: Option<u64>,

    /// File names ignored at every directory level, replacing `.DS_Store`.
    ///
    /// The empty-directory marker written by `record` is always ignored.
    #[serde(default)]
    pub ignore_files: Option<Vec<String>>,

    /// Stop comparing a directory level after its first difference.
    #[serde(default)]
    pub exit_on_first_difference: Option<bool>,

    /// Command timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl CaseConfig {
    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: &CaseConfig) -> CaseConfig {
        CaseConfig {
            command: self.command.or_else(|| fallback.command.clone()),
            text_input: self.text_input.or_else(|| fallback.text_input.clone()),
            test_description: self
                .test_description
                .or_else(|| fallback.test_description.clone()),
            section_size: self.section_size.or(fallback.section_size),
            ignore_files: self.ignore_files.or_else(|| fallback.ignore_files.clone()),
            exit_on_first_difference: self
                .exit_on_first_difference
                .or(fallback.exit_on_first_difference),
            timeout: self.timeout.or(fallback.timeout),
        }
    }

    /// Comparison settings for this case.
    pub fn compare_config(&self) -> CompareConfig {
        let mut ignore_files: BTreeSet<String> = match &self.ignore_files {
            Some(names) => names.iter().cloned().collect(),
            None => DEFAULT_IGNORE_FILES.iter().map(|s| s.to_string()).collect(),
        };
        ignore_files.insert(IGNORE_MARKER_FILE.to_string());
        CompareConfig {
            exit_on_first_difference: self.exit_on_first_difference.unwrap_or(false),
            sampling: SamplingPolicy {
                section_size: self.section_size.unwrap_or(HARNESS_SECTION_SIZE),
                sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
            },
            ignore_files,
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

/// Generate the JSON Schema for case configuration files.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(CaseConfig)
}
