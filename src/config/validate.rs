// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile, StreamConfig};
use crate::errors::{Result, TreewatchError};

/// Upper bound for any latency; anything longer is almost certainly a typo
/// (seconds given where milliseconds were meant).
pub const MAX_LATENCY: Duration = Duration::from_secs(60);

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TreewatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.observer, raw.stream))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_streams(cfg)?;
    validate_latency("[observer].latency_ms", cfg.observer.latency_ms)?;
    for (index, stream) in cfg.stream.iter().enumerate() {
        validate_stream(index, stream)?;
    }
    Ok(())
}

fn ensure_has_streams(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stream.is_empty() {
        return Err(TreewatchError::InvalidConfiguration(
            "config must contain at least one [[stream]] (or paths on the command line)"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_stream(index: usize, stream: &StreamConfig) -> Result<()> {
    if stream.paths.is_empty() {
        return Err(TreewatchError::InvalidConfiguration(format!(
            "stream #{index} must list at least one path"
        )));
    }
    if stream.paths.iter().any(|p| p.as_os_str().is_empty()) {
        return Err(TreewatchError::InvalidConfiguration(format!(
            "stream #{index} contains an empty path"
        )));
    }
    if let Some(ms) = stream.latency_ms {
        validate_latency(&format!("stream #{index} latency_ms"), ms)?;
    }
    if stream.file_events && stream.raw_file_events {
        tracing::warn!(
            stream = index,
            "raw_file_events has no effect on a stream with file_events enabled"
        );
    }
    Ok(())
}

fn validate_latency(what: &str, ms: u64) -> Result<()> {
    if Duration::from_millis(ms) > MAX_LATENCY {
        return Err(TreewatchError::InvalidConfiguration(format!(
            "{what} must be at most {} ms (got {ms})",
            MAX_LATENCY.as_millis()
        )));
    }
    Ok(())
}
