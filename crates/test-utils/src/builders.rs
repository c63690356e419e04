#![allow(dead_code)]

use std::path::PathBuf;

use treewatch::config::{ConfigFile, ObserverSection, RawConfigFile, StreamConfig};
use treewatch::types::Since;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                observer: ObserverSection::default(),
                stream: Vec::new(),
            },
        }
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.config.stream.push(stream);
        self
    }

    pub fn with_latency_ms(mut self, ms: u64) -> Self {
        self.config.observer.latency_ms = ms;
        self
    }

    pub fn with_process_asap(mut self, val: bool) -> Self {
        self.config.observer.process_asap = val;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StreamConfig`.
pub struct StreamConfigBuilder {
    stream: StreamConfig,
}

impl StreamConfigBuilder {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            stream: StreamConfig {
                paths: vec![path.into()],
                ..StreamConfig::default()
            },
        }
    }

    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.stream.paths.push(path.into());
        self
    }

    pub fn file_events(mut self, val: bool) -> Self {
        self.stream.file_events = val;
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.stream.latency_ms = Some(ms);
        self
    }

    pub fn since(mut self, since: Since) -> Self {
        self.stream.since = since;
        self
    }

    pub fn ids(mut self, val: bool) -> Self {
        self.stream.ids = val;
        self
    }

    pub fn raw_file_events(mut self, val: bool) -> Self {
        self.stream.raw_file_events = val;
        self
    }

    pub fn build(self) -> StreamConfig {
        self.stream
    }
}
