//! Suite and case loader.
//!
//! Discovers test cases under a suite root and loads their configuration.

use crate::schema::{CaseConfig, SuiteConfig};
use crate::vars;
use std::path::{Path, PathBuf};

/// Error type for suite loading operations.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Failed to read the file.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse YAML.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Failed to parse TOML.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    /// Unsupported file extension.
    #[error("unsupported file format: {0} (expected .yaml, .yml, or .toml)")]
    UnsupportedFormat(String),
    /// No case config file in a case directory.
    #[error("no config.yaml found in {}", .0.display())]
    MissingConfig(PathBuf),
    /// Config parsed but its values cannot be used.
    #[error("invalid config in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Base names of the suite configuration file.
pub const SUITE_CONFIG_NAMES: &[&str] = &["global.yaml", "global.yml", "global.toml"];

/// Base names of a case configuration file, in lookup order.
pub const CASE_CONFIG_NAMES: &[&str] = &["config.yaml", "config.yml", "config.toml"];

/// Suite-level directories that never hold a case.
pub const IGNORED_DIRS: &[&str] = &["ignore_contents", ".git"];

/// Directory copied into the working directory before a run.
pub const INPUT_DIR: &str = "input";

/// Expected output tree.
pub const EXPECTED_OUTPUT_DIR: &str = "output";

/// Scratch directory the command runs in.
pub const WORKING_DIR: &str = "working";

/// Expected standard output, compared byte for byte.
pub const EXPECTED_STDOUT_FILE: &str = "stdout.txt";

/// Actual standard output, written when it did not match.
pub const STDOUT_WORKING_FILE: &str = "stdout_working.txt";

/// A fully resolved test case ready to run.
#[derive(Debug, Clone)]
pub struct Case {
    /// Directory name of the case.
    pub name: String,
    /// Path to the case directory.
    pub dir: PathBuf,
    /// Case config merged with suite defaults, variables substituted.
    pub config: CaseConfig,
}

impl Case {
    pub fn input_dir(&self) -> PathBuf {
        self.dir.join(INPUT_DIR)
    }

    pub fn expected_output_dir(&self) -> PathBuf {
        self.dir.join(EXPECTED_OUTPUT_DIR)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.dir.join(WORKING_DIR)
    }

    /// Command with variables substituted. Present for every loaded case.
    pub fn command(&self) -> &str {
        self.config.command.as_deref().unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.config.test_description.as_deref().unwrap_or_default()
    }

    /// Bytes written to the command's stdin, if any.
    pub fn stdin(&self) -> Option<Vec<u8>> {
        self.config.text_input.as_ref().map(|lines| {
            let mut input = lines.join("\n");
            input.push('\n');
            input.into_bytes()
        })
    }
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match ext {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&contents)?),
        "toml" => Ok(toml::from_str(&contents)?),
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|n| dir.join(n)).find(|p| p.is_file())
}

/// Load suite configuration from a suite root.
///
/// Returns `None` if no `global.yaml` exists, `Err` if it exists but is invalid.
pub fn load_suite_config(root: &Path) -> Result<Option<SuiteConfig>, LoadError> {
    let Some(path) = first_existing(root, SUITE_CONFIG_NAMES) else {
        return Ok(None);
    };
    tracing::debug!("loading suite config {}", path.display());

    // An empty global.yaml parses as null
    if std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(false) {
        return Ok(Some(SuiteConfig::default()));
    }
    parse_file(&path).map(Some)
}

/// Load the raw configuration of one case directory.
pub fn load_case_config(case_dir: &Path) -> Result<CaseConfig, LoadError> {
    let path = first_existing(case_dir, CASE_CONFIG_NAMES)
        .ok_or_else(|| LoadError::MissingConfig(case_dir.to_path_buf()))?;
    parse_file(&path)
}

/// Load one case and resolve it against the suite configuration.
pub fn load_case(case_dir: &Path, suite: &SuiteConfig) -> Result<Case, LoadError> {
    let raw = load_case_config(case_dir)?;
    let mut config = raw.or(&suite.defaults);

    let invalid = |reason: &str| LoadError::Invalid {
        path: case_dir.to_path_buf(),
        reason: reason.to_string(),
    };
    if config.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
        return Err(invalid("no command given in case or suite config"));
    }
    if config.section_size == Some(0) {
        return Err(invalid("section_size must be at least 1"));
    }

    let substitute = |s: &String| vars::substitute(s, &suite.variables);
    config.command = config.command.as_ref().map(substitute);
    config.test_description = config.test_description.as_ref().map(substitute);
    config.text_input = config
        .text_input
        .as_ref()
        .map(|lines| lines.iter().map(substitute).collect());

    let name = case_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| case_dir.display().to_string());

    Ok(Case {
        name,
        dir: case_dir.to_path_buf(),
        config,
    })
}

/// Find all case directories directly under the suite root, sorted by name.
pub fn find_cases(root: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut cases = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path
            .file_name()
            .is_some_and(|n| IGNORED_DIRS.iter().any(|d| n == *d))
        {
            continue;
        }
        cases.push(path);
    }
    cases.sort();
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn suite_with_tool() -> SuiteConfig {
        let mut suite = SuiteConfig::default();
        suite
            .variables
            .insert("tool".to_string(), "/opt/tool".to_string());
        suite
    }

    #[test]
    fn load_valid_case() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            r#"
command: "{tool} --fix"
test_description: "fixes {tool} input"
text_input: ["{tool}", "y"]
"#,
        )
        .unwrap();

        let case = load_case(dir.path(), &suite_with_tool()).unwrap();
        assert_eq!(case.command(), "/opt/tool --fix");
        assert_eq!(case.description(), "fixes /opt/tool input");
        assert_eq!(case.stdin(), Some(b"/opt/tool\ny\n".to_vec()));
    }

    #[test]
    fn load_valid_toml_case() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
command = "echo hi"
section_size = 16
"#,
        )
        .unwrap();

        let case = load_case(dir.path(), &SuiteConfig::default()).unwrap();
        assert_eq!(case.command(), "echo hi");
        assert_eq!(case.config.compare_config().sampling.section_size, 16);
        assert_eq!(case.stdin(), None);
    }

    #[test]
    fn load_invalid_yaml() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "invalid: [yaml: {").unwrap();

        let result = load_case_config(dir.path());
        assert!(matches!(result, Err(LoadError::Yaml(_))));
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "invalid = [toml").unwrap();

        let result = load_case_config(dir.path());
        assert!(matches!(result, Err(LoadError::Toml(_))));
    }

    #[test]
    fn missing_case_config() {
        let dir = tempdir().unwrap();
        let result = load_case_config(dir.path());
        assert!(matches!(result, Err(LoadError::MissingConfig(_))));
    }

    #[test]
    fn command_falls_back_to_suite() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "test_description: inherits\n").unwrap();

        let mut suite = suite_with_tool();
        suite.defaults.command = Some("{tool} default".to_string());

        let case = load_case(dir.path(), &suite).unwrap();
        assert_eq!(case.command(), "/opt/tool default");
    }

    #[test]
    fn case_without_any_command_is_invalid() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "test_description: nothing to run\n")
            .unwrap();

        let result = load_case(dir.path(), &SuiteConfig::default());
        assert!(matches!(result, Err(LoadError::Invalid { .. })));
    }

    #[test]
    fn zero_section_size_is_invalid() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "command: ls\nsection_size: 0\n",
        )
        .unwrap();

        let result = load_case(dir.path(), &SuiteConfig::default());
        assert!(matches!(result, Err(LoadError::Invalid { reason, .. }) if reason.contains("section_size")));
    }

    #[test]
    fn find_cases_skips_files_and_ignored_dirs() {
        let dir = tempdir().unwrap();
        for name in ["b_case", "a_case", "ignore_contents", ".git"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("global.yaml"), "").unwrap();

        let cases = find_cases(dir.path()).unwrap();
        let names: Vec<_> = cases
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_case", "b_case"]);
    }

    #[test]
    fn find_cases_in_missing_root() {
        let dir = tempdir().unwrap();
        assert!(find_cases(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn load_suite_config_not_found() {
        let dir = tempdir().unwrap();
        let result = load_suite_config(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_suite_config_empty_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("global.yaml"), "").unwrap();
        let config = load_suite_config(dir.path()).unwrap().unwrap();
        assert!(config.variables.is_empty());
    }

    #[test]
    fn load_suite_config_valid() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("global.yaml"),
            r#"
variables:
  MY_VAR: my_value
timeout: 10
"#,
        )
        .unwrap();

        let config = load_suite_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.defaults.timeout, Some(10));
        assert_eq!(config.variables.get("MY_VAR"), Some(&"my_value".to_string()));
    }

    #[test]
    fn load_suite_config_invalid() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("global.yaml"), "invalid: [yaml: {").unwrap();

        let result = load_suite_config(dir.path());
        assert!(matches!(result, Err(LoadError::Yaml(_))));
    }
}
