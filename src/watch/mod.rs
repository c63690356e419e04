// src/watch/mod.rs

//! Change synthesis.
//!
//! This module is responsible for:
//! - Keeping a snapshot of every directory under a stream's roots.
//! - Re-listing the directories a raw batch names and diffing them against
//!   that snapshot.
//! - Pairing vanished and appeared names that share an inode into moves.
//!
//! It does **not** know about threads or observers; the dispatch loop feeds
//! it batches one at a time.

pub mod correlator;
pub mod path_utils;
pub mod processor;
pub mod snapshot;
pub mod synthesizer;

pub use processor::{BatchProcessor, PassthroughProcessor, ProcessorKind, SynthesizingProcessor};
pub use snapshot::{Listing, SnapshotStore};
pub use synthesizer::{EventSynthesizer, Synthesis};
