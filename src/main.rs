//! Tree Validator CLI
//!
//! Validates a current directory tree against a master tree by content
//! fingerprint, optionally repairing mismatched files.

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use tree_validator::{
    benchmark, reset_indexes, validate, IndexConfig, Md5Fingerprinter, ValidatorConfig,
};

const ABOUT: &str = r#"
Tree Validator - validate and repair a directory tree against a master copy

Examples:
  tree_validator /path/to/master /path/to/current           report drifted files
  tree_validator /path/to/master /path/to/current -f        overwrite drifted files from master
  tree_validator /path/to/master /path/to/current -r        drop cached indexes first
  tree_validator /path/to/master /path/to/current -b        benchmark, files are not changed

Cached indexes are stored beside each tree: _index.json for master,
index.json for current.
"#;

/// Validate a directory tree against a master copy
#[derive(Parser)]
#[command(name = "tree_validator")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    /// Directory holding the reference files
    master: PathBuf,

    /// Directory to validate against the master
    current: PathBuf,

    /// Delete the cached MASTER and CURRENT indexes before running
    #[arg(short = 'r', long)]
    reset: bool,

    /// Repeatedly index both trees to measure throughput; files are not changed
    #[arg(short = 'b', long)]
    benchmark: bool,

    /// Overwrite mismatched current files with their master copies
    #[arg(short = 'f', long)]
    force: bool,

    /// Fingerprinting threads (0 = one per CPU)
    #[arg(short = 't', long, default_value = "0")]
    threads: usize,

    /// Number of benchmark passes
    #[arg(long, default_value = "10")]
    runs: usize,

    /// Neither read nor write cached indexes
    #[arg(long)]
    no_cache: bool,

    /// Emit JSON progress lines on stderr
    #[arg(long)]
    progress: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    for (name, dir) in [("MASTER", &cli.master), ("CURRENT", &cli.current)] {
        if !dir.is_dir() {
            eprintln!("Error: Invalid {} directory specified [{}].", name, dir.display());
            eprintln!("The directory does not exist or is not accessible.");
            return ExitCode::from(2);
        }
    }

    let config = ValidatorConfig::builder()
        .index(
            IndexConfig::builder()
                .num_threads(cli.threads)
                .show_progress(cli.progress)
                .build(),
        )
        .use_cache(!cli.no_cache)
        .repair(cli.force)
        .benchmark_runs(cli.runs)
        .build();

    if cli.reset {
        if let Err(e) = reset_indexes(&cli.master, &cli.current, &config) {
            error!("Failed to delete cached indexes: {}", e);
            return ExitCode::from(1);
        }
    }

    if cli.benchmark {
        return match benchmark(&cli.master, &cli.current, Md5Fingerprinter, &config) {
            Ok(summary) => {
                if cli.json {
                    print_json(&summary);
                } else {
                    println!(
                        "Validated {} bytes in {:.2}s",
                        summary.bytes_fingerprinted, summary.total_secs
                    );
                    println!(
                        "Average cycle time {:.2}s @ {:.0} bytes/s",
                        summary.average_secs,
                        summary.bytes_per_sec()
                    );
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Benchmark failed: {}", e);
                ExitCode::from(1)
            }
        };
    }

    info!("Validating {:?} against {:?}", cli.current, cli.master);
    let summary = match validate(&cli.master, &cli.current, Md5Fingerprinter, &config) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Validation failed: {}", e);
            return ExitCode::from(1);
        }
    };

    if cli.json {
        print_json(&summary);
    } else {
        for found in &summary.report.discrepancies {
            println!("{} NG", found.relative_path);
            println!(
                "\t{} -> {}",
                found.master_path.display(),
                found.current_path.display()
            );
        }
        for failure in &summary.report.repair_failures {
            println!("{} REPAIR FAILED: {}", failure.relative_path, failure.message);
        }

        let secs = summary.duration_ms as f64 / 1000.0;
        if summary.report.is_clean() {
            println!(
                "Validated {} files ({} bytes hashed) in {:.2}s",
                summary.master_files, summary.bytes_fingerprinted, secs
            );
        } else if summary.repair {
            println!("Found and fixed {} errors in {:.2}s", summary.error_count(), secs);
        } else {
            println!("Found {} errors in {:.2}s", summary.error_count(), secs);
        }
        if summary.index_errors > 0 {
            println!("{} files could not be indexed", summary.index_errors);
        }
    }

    if summary.report.repair_failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to encode result: {}", e),
    }
}
