// src/watch/processor.rs

//! Per-stream batch handling, chosen when the stream is built.

use std::path::PathBuf;
use std::sync::Arc;

use super::synthesizer::EventSynthesizer;
use crate::events::StreamEvent;
use crate::fs::FileSystem;
use crate::source::RawBatch;

/// Turns one raw batch into what the stream callback sees.
///
/// Implementations live on the dispatch thread that owns the stream and are
/// never called concurrently.
pub trait BatchProcessor: Send {
    fn process(&mut self, batch: &RawBatch) -> Vec<StreamEvent>;
}

/// Which [`BatchProcessor`] a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    /// Diff directories and emit typed file events.
    Synthesizing,
    /// Hand every raw notification to the callback unchanged.
    Passthrough,
}

impl ProcessorKind {
    /// Instantiate the processor. For synthesis this seeds the snapshot of
    /// every root, so it performs filesystem I/O.
    pub fn build(self, fs: Arc<dyn FileSystem>, roots: &[PathBuf]) -> Box<dyn BatchProcessor> {
        match self {
            ProcessorKind::Synthesizing => Box::new(SynthesizingProcessor::new(fs, roots)),
            ProcessorKind::Passthrough => Box::new(PassthroughProcessor),
        }
    }
}

#[derive(Debug)]
pub struct SynthesizingProcessor {
    synthesizer: EventSynthesizer,
}

impl SynthesizingProcessor {
    pub fn new(fs: Arc<dyn FileSystem>, roots: &[PathBuf]) -> Self {
        Self {
            synthesizer: EventSynthesizer::new(fs, roots),
        }
    }
}

impl BatchProcessor for SynthesizingProcessor {
    fn process(&mut self, batch: &RawBatch) -> Vec<StreamEvent> {
        let synthesis = self.synthesizer.synthesize(batch);
        synthesis
            .diagnostics
            .into_iter()
            .map(StreamEvent::Diagnostic)
            .chain(synthesis.events.into_iter().map(StreamEvent::File))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct PassthroughProcessor;

impl BatchProcessor for PassthroughProcessor {
    fn process(&mut self, batch: &RawBatch) -> Vec<StreamEvent> {
        batch
            .notifications
            .iter()
            .cloned()
            .map(StreamEvent::Raw)
            .collect()
    }
}
