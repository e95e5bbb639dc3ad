//! Test execution engine.
//!
//! Runs every case of a suite in its own working directory and compares the
//! result against the recorded expectations.

use crate::compare::{self, IGNORE_MARKER_FILE};
use crate::loader::{
    self, Case, EXPECTED_OUTPUT_DIR, EXPECTED_STDOUT_FILE, LoadError, STDOUT_WORKING_FILE,
    WORKING_DIR,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Error type for problems that stop a whole suite from running.
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    /// The suite root does not exist.
    #[error("couldn't find test suite directory: {}", .0.display())]
    MissingSuite(PathBuf),
    /// `global.yaml` exists but could not be loaded.
    #[error("error loading suite config: {0}")]
    Config(#[from] LoadError),
    /// Listing the suite root failed.
    #[error("error finding cases in {}: {source}", path.display())]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Options shared by every case of a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only run cases whose directory name contains this substring.
    pub filter: Option<String>,
    /// Keep `working/` even when a case passes.
    pub keep_working: bool,
}

/// Result of running (or recording) a single case.
#[derive(Debug, serde::Serialize)]
pub struct CaseResult {
    pub name: String,
    pub dir: PathBuf,
    pub description: String,
    pub passed: bool,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub failures: Vec<String>,
}

impl CaseResult {
    fn load_failure(dir: &Path, error: &LoadError) -> Self {
        Self {
            name: case_name(dir),
            dir: dir.to_path_buf(),
            description: String::new(),
            passed: false,
            duration: Duration::ZERO,
            failures: vec![format!("Failed to load case: {error}")],
        }
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

fn case_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Run every case in the suite rooted at `root`.
pub fn run_suite(root: &Path, options: &RunOptions) -> Result<Vec<CaseResult>, SuiteError> {
    for_each_case(root, options, |case| run_case(case, options))
}

/// Run every case and store its output as the new expectation.
pub fn record_suite(root: &Path, options: &RunOptions) -> Result<Vec<CaseResult>, SuiteError> {
    for_each_case(root, options, record_case)
}

/// Load the suite, then apply `f` to every case matching the filter.
///
/// Cases run in directory-name order, or concurrently when the suite config
/// asks for it; results always come back in directory-name order.
fn for_each_case<F>(
    root: &Path,
    options: &RunOptions,
    f: F,
) -> Result<Vec<CaseResult>, SuiteError>
where
    F: Fn(&Case) -> CaseResult + Sync,
{
    if !root.is_dir() {
        return Err(SuiteError::MissingSuite(root.to_path_buf()));
    }

    let suite = loader::load_suite_config(root)?.unwrap_or_default();
    let case_dirs = loader::find_cases(root).map_err(|source| SuiteError::Discover {
        path: root.to_path_buf(),
        source,
    })?;

    let cases: Vec<(PathBuf, Result<Case, LoadError>)> = case_dirs
        .into_iter()
        .filter(|dir| {
            options
                .filter
                .as_deref()
                .is_none_or(|pattern| case_name(dir).contains(pattern))
        })
        .map(|dir| {
            let case = loader::load_case(&dir, &suite);
            (dir, case)
        })
        .collect();

    info!("found {} case(s) in {}", cases.len(), root.display());

    let run_one = |(dir, case): &(PathBuf, Result<Case, LoadError>)| match case {
        Ok(case) => f(case),
        Err(e) => {
            warn!("failed to load case {}: {e}", dir.display());
            CaseResult::load_failure(dir, e)
        }
    };

    if !suite.parallel {
        return Ok(cases.iter().map(run_one).collect());
    }

    let run_one = &run_one;
    let results: Vec<CaseResult> = thread::scope(|s| {
        let handles: Vec<_> = cases
            .iter()
            .map(|entry| (&entry.0, s.spawn(move || run_one(entry))))
            .collect();

        handles
            .into_iter()
            .map(|(dir, handle)| {
                handle.join().unwrap_or_else(|_| CaseResult {
                    name: case_name(dir),
                    dir: dir.clone(),
                    description: String::new(),
                    passed: false,
                    duration: Duration::ZERO,
                    failures: vec!["Case thread panicked".to_string()],
                })
            })
            .collect()
    });
    Ok(results)
}

/// Run a single case: prepare `working/`, run the command, compare.
pub fn run_case(case: &Case, options: &RunOptions) -> CaseResult {
    let start = Instant::now();
    let mut failures = Vec::new();
    info!("running case {}", case.name);

    match execute(case) {
        Err(e) => failures.push(e),
        Ok(output) => {
            if let Some(failure) = exit_failure(&output) {
                failures.push(failure);
            } else {
                check_stdout(case, &output.stdout, &mut failures);
                check_tree(case, &mut failures);
            }
        }
    }

    let passed = failures.is_empty();
    if passed && !options.keep_working {
        let working = case.working_dir();
        if let Err(e) = std::fs::remove_dir_all(&working) {
            warn!("failed to remove {}: {e}", working.display());
        }
    }

    CaseResult {
        name: case.name.clone(),
        dir: case.dir.clone(),
        description: case.description().to_string(),
        passed,
        duration: start.elapsed(),
        failures,
    }
}

/// Run a single case and replace its expected output with what the command produced.
///
/// A failing command leaves the existing expectations untouched.
pub fn record_case(case: &Case) -> CaseResult {
    let start = Instant::now();
    info!("recording case {}", case.name);

    let failures = match execute(case) {
        Err(e) => vec![e],
        Ok(output) => match exit_failure(&output) {
            Some(failure) => vec![failure],
            None => match store_expectations(case, &output.stdout) {
                Ok(()) => vec![],
                Err(e) => vec![format!("Failed to record expectations: {e}")],
            },
        },
    };

    CaseResult {
        name: case.name.clone(),
        dir: case.dir.clone(),
        description: case.description().to_string(),
        passed: failures.is_empty(),
        duration: start.elapsed(),
        failures,
    }
}

/// Copy `input/` to a fresh `working/` and run the case command inside it.
fn execute(case: &Case) -> Result<CommandOutput, String> {
    let input = case.input_dir();
    let working = case.working_dir();

    if !input.is_dir() {
        return Err(format!("Input directory not found: {}", input.display()));
    }
    if working.exists() {
        std::fs::remove_dir_all(&working)
            .map_err(|e| format!("Failed to remove stale {}: {e}", working.display()))?;
    }
    copy_dir_recursive(&input, &working).map_err(|e| {
        format!(
            "Failed to copy {} to {}: {e}",
            input.display(),
            working.display()
        )
    })?;

    let absolute = std::path::absolute(&working).unwrap_or_else(|_| working.clone());
    let command = crate::vars::substitute_working_path(case.command(), &absolute);
    let timeout = Duration::from_secs(case.config.timeout_secs());

    run_command(&command, &working, case.stdin().as_deref(), timeout)
}

fn exit_failure(output: &CommandOutput) -> Option<String> {
    match (output.exit_code, output.signal) {
        (Some(0), _) => None,
        (Some(code), _) => Some(format!("Running the command failed, status code: {code}")),
        (None, Some(signal)) => Some(format!(
            "Running the command failed, terminated by signal {signal}"
        )),
        (None, None) => Some("Running the command failed, unknown exit status".to_string()),
    }
}

fn check_stdout(case: &Case, stdout: &[u8], failures: &mut Vec<String>) {
    let expected_path = case.dir.join(EXPECTED_STDOUT_FILE);
    if !expected_path.is_file() {
        return;
    }

    match std::fs::read(&expected_path) {
        Ok(expected) if expected == stdout => {}
        Ok(_) => {
            failures.push(format!(
                "* standard out didn't match the output given in {EXPECTED_STDOUT_FILE}."
            ));
            let actual_path = case.dir.join(STDOUT_WORKING_FILE);
            if let Err(e) = std::fs::write(&actual_path, stdout) {
                warn!("failed to write {}: {e}", actual_path.display());
            }
        }
        Err(e) => failures.push(format!("Failed to read {}: {e}", expected_path.display())),
    }
}

fn check_tree(case: &Case, failures: &mut Vec<String>) {
    let config = case.config.compare_config();
    match compare::compare_trees(&case.working_dir(), &case.expected_output_dir(), &config) {
        Ok(differences) => failures.extend(differences.iter().map(ToString::to_string)),
        Err(e) => failures.push(format!("Failed to compare output: {e}")),
    }
}

/// Move `working/` into place as `output/` and write `stdout.txt`.
fn store_expectations(case: &Case, stdout: &[u8]) -> std::io::Result<()> {
    let working = case.working_dir();
    let expected = case.expected_output_dir();

    // Park the previous expectations so a failed move can put them back
    let previous = tempfile::Builder::new()
        .prefix(".blackbox-previous-")
        .tempdir_in(&case.dir)?;
    let parked = previous.path().join(EXPECTED_OUTPUT_DIR);
    let had_previous = expected.exists();
    if had_previous {
        std::fs::rename(&expected, &parked)?;
    }

    if let Err(e) = std::fs::rename(&working, &expected) {
        if had_previous {
            std::fs::rename(&parked, &expected)?;
        }
        return Err(e);
    }

    let marked = mark_empty_dirs(&expected)?;
    debug!("marked {marked} empty director(ies) in {}", expected.display());
    std::fs::write(case.dir.join(EXPECTED_STDOUT_FILE), stdout)
}

/// Put an ignore marker into every empty directory under `dir`, `dir` included.
///
/// Returns the number of directories marked.
pub fn mark_empty_dirs(dir: &Path) -> std::io::Result<usize> {
    let mut marked = 0;
    let mut is_empty = true;
    for entry in std::fs::read_dir(dir)? {
        is_empty = false;
        let path = entry?.path();
        if path.is_dir() {
            marked += mark_empty_dirs(&path)?;
        }
    }
    if is_empty {
        std::fs::write(dir.join(IGNORE_MARKER_FILE), "")?;
        marked += 1;
    }
    Ok(marked)
}

/// Artifacts removed by [`clean_suite`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub working_dirs: usize,
    pub stdout_files: usize,
}

/// Remove the `working/` directory and `stdout_working.txt` of every case under `root`.
pub fn clean_suite(root: &Path) -> std::io::Result<CleanSummary> {
    let mut summary = CleanSummary::default();
    for case_dir in loader::find_cases(root)? {
        let working = case_dir.join(WORKING_DIR);
        if working.is_dir() {
            debug!("removing {}", working.display());
            std::fs::remove_dir_all(&working)?;
            summary.working_dirs += 1;
        }

        let stdout = case_dir.join(STDOUT_WORKING_FILE);
        if stdout.is_file() {
            debug!("removing {}", stdout.display());
            std::fs::remove_file(&stdout)?;
            summary.stdout_files += 1;
        }
    }
    Ok(summary)
}

/// Recursively copy a directory tree.
fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if source.is_dir() {
            copy_dir_recursive(&source, &target)?;
        } else {
            std::fs::copy(&source, &target)?;
        }
    }
    Ok(())
}

struct CommandOutput {
    /// Exit code if process exited normally.
    exit_code: Option<i32>,
    /// Signal number if process was terminated by a signal (Unix only).
    signal: Option<i32>,
    stdout: Vec<u8>,
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn finished<T>(handle: &Option<thread::JoinHandle<T>>) -> bool {
    handle.as_ref().is_none_or(thread::JoinHandle::is_finished)
}

/// Kill the child and everything else in its process group, then reap it.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group was created for this child
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn run_command(
    command: &str,
    cwd: &Path,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput, String> {
    debug!("running `{command}` in {}", cwd.display());

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(cwd);
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // Own process group, so a timeout also takes down background jobs
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|e| format!("Failed to spawn: {e}"))?;
    let timed_out = || format!("Command timed out after {}s", timeout.as_secs());

    // Drain the pipes on their own threads so a chatty child cannot block
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let stdin_writer = match (stdin, child.stdin.take()) {
        (Some(data), Some(mut pipe)) => {
            let data = data.to_vec();
            Some(thread::spawn(move || {
                // The child may exit without reading; a broken pipe is not our failure
                let _ = pipe.write_all(&data);
            }))
        }
        _ => None,
    };

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill_process_group(&mut child);
                    return Err(timed_out());
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(format!("Failed to wait: {e}")),
        }
    };

    // A background job left behind by the shell can keep the pipes open
    while !(finished(&stdout_reader) && finished(&stderr_reader) && finished(&stdin_writer)) {
        if start.elapsed() >= timeout {
            kill_process_group(&mut child);
            return Err(timed_out());
        }
        thread::sleep(Duration::from_millis(10));
    }

    if let Some(writer) = stdin_writer {
        let _ = writer.join();
    }
    let stdout = stdout_reader
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();
    let stderr = stderr_reader
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();

    let exit_code = status.code();
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    debug!(
        "command exited with {:?}, {} byte(s) of stdout",
        exit_code,
        stdout.len()
    );
    if !stderr.is_empty() {
        debug!("stderr: {}", String::from_utf8_lossy(&stderr).trim_end());
    }

    Ok(CommandOutput {
        exit_code,
        signal,
        stdout,
    })
}
