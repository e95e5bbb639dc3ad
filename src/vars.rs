//! `{name}` variable substitution.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// Placeholder replaced with the absolute working directory of a case.
pub const WORKING_PATH_VAR: &str = "WORKING_PATH";

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.-]*)\}").expect("placeholder pattern is valid")
    })
}

/// Replace every `{name}` whose name is in `vars` with its value.
///
/// Placeholders with no matching variable are left as written, so shell
/// brace syntax such as `{a,b}` passes through untouched.
///
/// # Examples
///
/// ```ignore
/// let mut vars = BTreeMap::new();
/// vars.insert("tool".to_string(), "/bin/mytool".to_string());
/// assert_eq!(substitute("{tool} --help", &vars), "/bin/mytool --help");
/// ```
pub fn substitute(s: &str, vars: &BTreeMap<String, String>) -> String {
    placeholder()
        .replace_all(s, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Replace `{WORKING_PATH}` with `working_dir`.
///
/// Runs after [`substitute`], so a suite variable may expand to a string that
/// itself contains `{WORKING_PATH}`.
pub fn substitute_working_path(s: &str, working_dir: &Path) -> String {
    s.replace(
        &format!("{{{WORKING_PATH_VAR}}}"),
        &working_dir.display().to_string(),
    )
}
