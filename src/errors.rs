// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::stream::StreamId;

#[derive(Error, Debug)]
pub enum TreewatchError {
    /// A stream or config was rejected before anything was registered
    /// (no root paths, empty path, out-of-range latency, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Stream {0} is already scheduled on this observer")]
    AlreadyScheduled(StreamId),

    #[error("Stream {0} is not scheduled on this observer")]
    NotScheduled(StreamId),

    /// An observer API was called in a lifecycle state that does not allow
    /// it (e.g. `schedule` after `stop`). Not retryable.
    #[error("Programmer misuse: {0}")]
    ProgrammerMisuse(String),

    #[error("Dispatch thread panicked")]
    DispatchPanicked,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Notify error: {0}")]
    NotifyError(#[from] notify::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TreewatchError>;
