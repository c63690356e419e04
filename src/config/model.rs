// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::observer::ObserverOptions;
use crate::source::CreateFlags;
use crate::stream::{DEFAULT_LATENCY, StreamOptions};
use crate::types::Since;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [observer]
/// latency_ms = 10
/// process_asap = false
///
/// [[stream]]
/// paths = ["/var/tmp/project"]
/// file_events = true
/// latency_ms = 50
/// since = "now"
/// ```
///
/// All sections are optional here; [`ConfigFile`] is the validated form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub observer: ObserverSection,

    /// One entry per `[[stream]]` table.
    #[serde(default)]
    pub stream: Vec<StreamConfig>,
}

/// `[observer]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObserverSection {
    /// Latency for streams that do not set their own.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Seed and register streams on the scheduling thread.
    #[serde(default)]
    pub process_asap: bool,
}

fn default_latency_ms() -> u64 {
    DEFAULT_LATENCY.as_millis() as u64
}

impl Default for ObserverSection {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            process_asap: false,
        }
    }
}

/// `[[stream]]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    pub paths: Vec<PathBuf>,

    /// Typed per-file events instead of raw notifications.
    #[serde(default)]
    pub file_events: bool,

    /// Overrides `[observer].latency_ms`.
    #[serde(default)]
    pub latency_ms: Option<u64>,

    #[serde(default)]
    pub since: Since,

    #[serde(default)]
    pub ids: bool,

    /// File-granular raw notifications (pass-through streams only).
    #[serde(default)]
    pub raw_file_events: bool,
}

/// Validated configuration. Built from [`RawConfigFile`] via `TryFrom`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub observer: ObserverSection,
    pub stream: Vec<StreamConfig>,
}

impl ConfigFile {
    /// Only called after validation succeeded.
    pub(crate) fn new_unchecked(observer: ObserverSection, stream: Vec<StreamConfig>) -> Self {
        Self { observer, stream }
    }

    pub fn observer_options(&self) -> ObserverOptions {
        ObserverOptions {
            process_asap: self.observer.process_asap,
            ..ObserverOptions::default()
        }
    }

    /// Effective latency of `stream`.
    pub fn latency_of(&self, stream: &StreamConfig) -> Duration {
        Duration::from_millis(stream.latency_ms.unwrap_or(self.observer.latency_ms))
    }

    pub fn stream_options(&self, stream: &StreamConfig) -> StreamOptions {
        let mut flags = CreateFlags::empty();
        flags.set(CreateFlags::FILE_EVENTS, stream.raw_file_events);
        StreamOptions {
            file_events: stream.file_events,
            latency: self.latency_of(stream),
            since: stream.since,
            flags,
            ids: stream.ids,
        }
    }
}
