//! Result reporting: human-readable, JSON and JUnit XML.

use crate::runner::CaseResult;
use chrono::{DateTime, Local};
use colored::Colorize;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// Format results as indented, colored lines, one block per case.
pub fn format_human(results: &[CaseResult], verbose: bool) -> String {
    let mut out = String::new();
    for result in results {
        let label = if result.description.is_empty() {
            result.name.clone()
        } else {
            format!("{} \"{}\"", result.name, result.description)
        };

        if result.passed {
            let _ = writeln!(out, "  {} {label} ({:.2?})", "✓".green(), result.duration);
        } else {
            let _ = writeln!(
                out,
                "  {} {} ({:.2?})",
                "✗".red(),
                label.red(),
                result.duration
            );
            for failure in &result.failures {
                let _ = writeln!(out, "     {}", failure.yellow());
            }
        }

        if verbose {
            let _ = writeln!(out, "     in dir \"{}\"", result.dir.display());
        }
    }
    out
}

/// Closing summary line, e.g. `3 passed, 1 failed`.
pub fn format_summary(results: &[CaseResult], success_label: &str) -> String {
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    format!("{passed} {success_label}, {failed} failed")
}

/// Format results as a JSON document.
pub fn format_json(
    suite: &Path,
    results: &[CaseResult],
    started_at: DateTime<Local>,
) -> serde_json::Value {
    let passed = results.iter().filter(|r| r.passed).count();
    serde_json::json!({
        "suite": suite.display().to_string(),
        "started_at": started_at.to_rfc3339(),
        "passed": passed,
        "failed": results.len() - passed,
        "results": results,
    })
}

/// Format results as JUnit XML, one `<testsuite>` for the whole suite.
pub fn format_junit_xml(
    suite: &Path,
    results: &[CaseResult],
    total_time: Duration,
    started_at: DateTime<Local>,
) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let tests = results.len();
    let failures = results.iter().filter(|r| !r.passed).count();

    let _ = writeln!(
        xml,
        "<testsuites tests=\"{tests}\" failures=\"{failures}\" time=\"{:.3}\">",
        total_time.as_secs_f64()
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{tests}\" failures=\"{failures}\" time=\"{:.3}\" timestamp=\"{}\">",
        escape_xml(&suite.display().to_string()),
        total_time.as_secs_f64(),
        started_at.format("%Y-%m-%dT%H:%M:%S")
    );

    for result in results {
        let _ = writeln!(
            xml,
            "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\">",
            escape_xml(&result.name),
            escape_xml(&result.description),
            result.duration.as_secs_f64()
        );

        if !result.passed {
            let message = result
                .failures
                .first()
                .map(|s| s.as_str())
                .unwrap_or("Test failed");
            let _ = writeln!(xml, "      <failure message=\"{}\">", escape_xml(message));
            for failure in &result.failures {
                let _ = writeln!(xml, "{}", escape_xml(failure));
            }
            xml.push_str("      </failure>\n");
        }

        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
    xml.push_str("</testsuites>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn results() -> Vec<CaseResult> {
        vec![
            CaseResult {
                name: "copies".to_string(),
                dir: PathBuf::from("suite/copies"),
                description: "copies a file".to_string(),
                passed: true,
                duration: Duration::from_millis(5),
                failures: vec![],
            },
            CaseResult {
                name: "appends".to_string(),
                dir: PathBuf::from("suite/appends"),
                description: String::new(),
                passed: false,
                duration: Duration::from_millis(7),
                failures: vec![
                    "* Full file checksum differs: a<b> != c&d".to_string(),
                    "* One file, one folder: x in dirs l and r".to_string(),
                ],
            },
        ]
    }

    #[test]
    fn human_lists_failures_under_failed_case() {
        colored::control::set_override(false);
        let out = format_human(&results(), false);
        let lines: Vec<&str> = out.lines().collect();

        assert!(lines[0].starts_with("  ✓ copies \"copies a file\""));
        assert!(lines[1].starts_with("  ✗ appends"));
        assert_eq!(lines[2], "     * Full file checksum differs: a<b> != c&d");
        assert_eq!(lines[3], "     * One file, one folder: x in dirs l and r");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn human_verbose_shows_dirs() {
        colored::control::set_override(false);
        let out = format_human(&results(), true);
        assert!(out.contains("in dir \"suite/copies\""));
        assert!(out.contains("in dir \"suite/appends\""));
    }

    #[test]
    fn summary_counts() {
        assert_eq!(format_summary(&results(), "passed"), "1 passed, 1 failed");
        assert_eq!(format_summary(&[], "recorded"), "0 recorded, 0 failed");
    }

    #[test]
    fn json_has_totals_and_results() {
        let json = format_json(Path::new("suite"), &results(), Local::now());
        assert_eq!(json["passed"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][1]["name"], "appends");
        assert_eq!(json["results"][1]["failures"].as_array().unwrap().len(), 2);
        assert!(json["results"][0]["duration"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn junit_escapes_and_counts() {
        let xml = format_junit_xml(
            Path::new("suite"),
            &results(),
            Duration::from_millis(12),
            Local::now(),
        );
        assert!(xml.contains("<testsuites tests=\"2\" failures=\"1\" time=\"0.012\">"));
        assert!(xml.contains("<testcase name=\"copies\" classname=\"copies a file\""));
        assert!(xml.contains(
            "<failure message=\"* Full file checksum differs: a&lt;b&gt; != c&amp;d\">"
        ));
        assert_eq!(xml.matches("<failure ").count(), 1);
    }
}
