mod compare;
mod loader;
mod report;
mod runner;
mod schema;
mod vars;

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with checkmarks
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// JUnit XML output for CI systems
    Junit,
}

#[derive(Parser)]
#[command(name = "blackbox")]
#[command(about = "Black-box regression tests: run a command on input files, compare against golden output")]
#[command(version)]
struct Cli {
    /// Log progress (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Log debug details, including command stderr
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every case in a test suite
    Run {
        /// Suite directory (one sub-directory per case)
        path: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
        /// Filter cases by directory name (substring match)
        #[arg(short, long)]
        filter: Option<String>,
        /// Keep working/ directories of passing cases
        #[arg(long)]
        keep_working: bool,
    },
    /// Run every case and store its output as the new expectation
    Record {
        /// Suite directory (one sub-directory per case)
        path: PathBuf,
        /// Filter cases by directory name (substring match)
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Remove working/ directories and stdout_working.txt files
    Clean {
        /// Suite directory
        path: PathBuf,
    },
    /// Validate case configs without running them
    Validate {
        /// Suite directory
        path: PathBuf,
    },
    /// Scaffold a new case directory
    Init {
        /// Directory to create
        path: PathBuf,
    },
    /// Output the case config schema
    Schema,
}

fn init_tracing(verbose: bool, debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    debug!("logging initialized at level: {level}");
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);

    match cli.command {
        Command::Run {
            path,
            output,
            filter,
            keep_working,
        } => run(&path, output, filter, keep_working, cli.verbose),
        Command::Record { path, filter } => record(&path, filter, cli.verbose),
        Command::Clean { path } => match runner::clean_suite(&path) {
            Ok(summary) => println!(
                "Removed {} working dir(s) and {} stdout file(s) from {}",
                summary.working_dirs,
                summary.stdout_files,
                path.display()
            ),
            Err(e) => {
                eprintln!("Error cleaning {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        Command::Validate { path } => validate(&path),
        Command::Init { path } => init(&path),
        Command::Schema => {
            let schema = schema::generate_schema();
            match serde_json::to_string_pretty(&schema) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing schema: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn run(
    path: &Path,
    output: OutputFormat,
    filter: Option<String>,
    keep_working: bool,
    verbose: bool,
) {
    // Stale artifacts from an earlier run would otherwise be mistaken for fresh ones
    if path.is_dir()
        && let Err(e) = runner::clean_suite(path)
    {
        eprintln!("Error cleaning {}: {e}", path.display());
        std::process::exit(1);
    }

    let options = runner::RunOptions {
        filter,
        keep_working,
    };
    let started_at = chrono::Local::now();
    let run_start = std::time::Instant::now();

    let results = match runner::run_suite(path, &options) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if results.is_empty() {
        eprintln!("No test cases found at: {}", path.display());
        std::process::exit(1);
    }

    let total_time = run_start.elapsed();
    match output {
        OutputFormat::Human => {
            println!("\n{}", path.display());
            print!("{}", report::format_human(&results, verbose));
            println!("\n{}", report::format_summary(&results, "passed"));
        }
        OutputFormat::Json => {
            let json = report::format_json(path, &results, started_at);
            match serde_json::to_string_pretty(&json) {
                Ok(s) => println!("{s}"),
                Err(e) => {
                    eprintln!("Error serializing results: {e}");
                    std::process::exit(1);
                }
            }
        }
        OutputFormat::Junit => {
            print!(
                "{}",
                report::format_junit_xml(path, &results, total_time, started_at)
            );
        }
    }

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
}

fn record(path: &Path, filter: Option<String>, verbose: bool) {
    let options = runner::RunOptions {
        filter,
        keep_working: false,
    };
    let results = match runner::record_suite(path, &options) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    println!("\n{}", path.display());
    print!("{}", report::format_human(&results, verbose));
    println!("\n{}", report::format_summary(&results, "recorded"));

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
}

fn validate(path: &Path) {
    let suite = match loader::load_suite_config(path) {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("✗ suite config: {e}");
            std::process::exit(1);
        }
    };

    let case_dirs = match loader::find_cases(path) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Error finding cases: {e}");
            std::process::exit(1);
        }
    };

    if case_dirs.is_empty() {
        eprintln!("No test cases found at: {}", path.display());
        std::process::exit(1);
    }

    let mut errors = 0;
    for dir in &case_dirs {
        match loader::load_case(dir, &suite) {
            Ok(case) => {
                let mut missing = Vec::new();
                if !case.input_dir().is_dir() {
                    missing.push(loader::INPUT_DIR);
                }
                if !case.expected_output_dir().is_dir() {
                    missing.push(loader::EXPECTED_OUTPUT_DIR);
                }
                if missing.is_empty() {
                    println!("✓ {} ({})", dir.display(), case.command());
                } else {
                    eprintln!("✗ {}: missing {}", dir.display(), missing.join(", "));
                    errors += 1;
                }
            }
            Err(e) => {
                eprintln!("✗ {}: {e}", dir.display());
                errors += 1;
            }
        }
    }

    if errors > 0 {
        eprintln!("\n{errors} case(s) failed validation");
        std::process::exit(1);
    }
    println!("\nAll {} case(s) valid", case_dirs.len());
}

fn init(path: &Path) {
    let template = r#"# Shell command run inside working/ (a fresh copy of input/).
# {WORKING_PATH} expands to the absolute path of working/.
command: "cp input.txt output.txt"

test_description: "copies input.txt to output.txt"

# Lines fed to the command's standard input.
# text_input:
#   - first line
#   - second line

# exit_on_first_difference: false
# section_size: 65536
# timeout: 60
"#;
    if path.exists() {
        eprintln!("Error: already exists: {}", path.display());
        std::process::exit(1);
    }

    let created = fs::create_dir_all(path.join(loader::INPUT_DIR))
        .and_then(|()| fs::create_dir_all(path.join(loader::EXPECTED_OUTPUT_DIR)))
        .and_then(|()| fs::write(path.join("config.yaml"), template))
        .and_then(|()| fs::write(path.join(loader::INPUT_DIR).join("input.txt"), "hello\n"))
        .and_then(|()| {
            let output = path.join(loader::EXPECTED_OUTPUT_DIR);
            fs::write(output.join("input.txt"), "hello\n")?;
            fs::write(output.join("output.txt"), "hello\n")
        });

    if let Err(e) = created {
        eprintln!("Error creating case: {e}");
        std::process::exit(1);
    }
    println!("Created: {}", path.display());
}
