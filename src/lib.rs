// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod fs;
pub mod logging;
pub mod observer;
pub mod source;
pub mod stream;
pub mod types;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_from_path;
use crate::config::model::{ConfigFile, RawConfigFile, StreamConfig};

pub use crate::errors::TreewatchError;
pub use crate::events::{Diagnostic, FileEvent, FileEventKind, StreamEvent};
pub use crate::observer::{Observer, ObserverOptions, ObserverState};
pub use crate::stream::{Stream, StreamId, StreamOptions};
pub use crate::types::Since;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file plus command-line stream)
/// - one observer with every configured stream scheduled on it
/// - printing events to stdout
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let observer = Observer::with_options(cfg.observer_options());
    for (index, stream_cfg) in cfg.stream.iter().enumerate() {
        let stream = Stream::new(
            |event: StreamEvent| println!("{event}"),
            stream_cfg.paths.iter().cloned(),
            cfg.stream_options(stream_cfg),
        )
        .with_context(|| format!("building stream #{index}"))?;
        observer
            .schedule(&stream)
            .with_context(|| format!("scheduling stream #{index}"))?;
        info!(stream = %stream.id(), roots = ?stream.roots(), "stream configured");
    }
    observer.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Ctrl+C received; stopping observer");

    // Joining the dispatch thread blocks.
    tokio::task::spawn_blocking(move || observer.stop()).await??;
    Ok(())
}

/// Merge the optional config file with the stream given on the command
/// line, then validate.
pub fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = match &args.config {
        Some(path) => {
            load_from_path(path).with_context(|| format!("loading config {:?}", path))?
        }
        None => RawConfigFile::default(),
    };

    if let Some(stream) = cli_stream(args) {
        raw.stream.push(stream);
    }

    Ok(ConfigFile::try_from(raw)?)
}

/// The stream described by positional paths and stream flags.
///
/// Without paths it exists only when no config file was given, and then
/// watches the current directory.
fn cli_stream(args: &CliArgs) -> Option<StreamConfig> {
    let paths = if !args.paths.is_empty() {
        args.paths.clone()
    } else if args.config.is_none() {
        vec![PathBuf::from(".")]
    } else {
        return None;
    };

    Some(StreamConfig {
        paths,
        file_events: args.file_events,
        latency_ms: args.latency_ms,
        since: Since::Now,
        ids: args.ids,
        raw_file_events: args.raw_file_events,
    })
}

fn print_dry_run(cfg: &ConfigFile) {
    println!("treewatch dry-run");
    println!("  observer.latency_ms = {}", cfg.observer.latency_ms);
    println!("  observer.process_asap = {}", cfg.observer.process_asap);
    println!();

    println!("streams ({}):", cfg.stream.len());
    for (index, stream) in cfg.stream.iter().enumerate() {
        let options = cfg.stream_options(stream);
        println!("  - #{index}");
        for path in &stream.paths {
            println!("      path: {}", path.display());
        }
        println!(
            "      mode: {}",
            if options.file_events { "file events" } else { "raw" }
        );
        println!("      latency: {:?}", options.latency);
        println!("      since: {}", options.since);
        if options.ids {
            println!("      ids: true");
        }
        if !options.flags.is_empty() {
            println!("      flags: {:?}", options.flags);
        }
    }

    debug!("dry-run complete (nothing watched)");
}
