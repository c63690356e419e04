// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `treewatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "treewatch",
    version,
    about = "Watch directory trees and print per-file change events.",
    long_about = None
)]
pub struct CliArgs {
    /// Directories to watch as one extra stream.
    ///
    /// With neither paths nor `--config`, the current directory is watched.
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Path to a config file (TOML) with `[[stream]]` tables.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Synthesize typed per-file events for the command-line stream.
    #[arg(long)]
    pub file_events: bool,

    /// Coalescing latency for the command-line stream, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub latency_ms: Option<u64>,

    /// Ask for file-granular raw notifications (ignored with `--file-events`).
    #[arg(long)]
    pub raw_file_events: bool,

    /// Attach event ids to raw notifications.
    #[arg(long)]
    pub ids: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TREEWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the configuration, print the resolved streams and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
