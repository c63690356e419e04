// src/source/mod.rs

//! Raw notification sources.
//!
//! A source turns OS change notifications into coarse [`RawBatch`]es of
//! "something changed in this directory" and posts them through the
//! [`BatchSink`] it was given at registration. The sink belongs to an
//! observer's dispatch loop, so every batch is handled on that observer's
//! thread regardless of which thread the source produced it on.
//!
//! - [`notify_source::NotifySource`] is the production backend (`notify`).
//! - [`manual::ManualSource`] lets tests and embedders inject batches.

pub mod flags;
pub mod manual;
pub mod notify_source;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::Result;
use crate::stream::StreamId;
use crate::types::Since;

pub use flags::{CreateFlags, EventFlags};
pub use manual::ManualSource;
pub use notify_source::NotifySource;

/// One `(changed_path, flags[, id])` entry of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub path: PathBuf,
    pub flags: EventFlags,
    pub id: Option<u64>,
}

impl RawNotification {
    pub fn new(path: impl Into<PathBuf>, flags: EventFlags) -> Self {
        Self {
            path: path.into(),
            flags,
            id: None,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

impl fmt::Display for RawNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raw {:#010x}", self.flags.bits())?;
        if let Some(id) = self.id {
            write!(f, " id={id}")?;
        }
        write!(f, " {}", self.path.display())
    }
}

/// Everything a source delivered in one callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBatch {
    pub notifications: Vec<RawNotification>,
}

impl RawBatch {
    pub fn new(notifications: Vec<RawNotification>) -> Self {
        Self { notifications }
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }
}

impl FromIterator<RawNotification> for RawBatch {
    fn from_iter<I: IntoIterator<Item = RawNotification>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Where a source posts the batches of one registration.
///
/// `deliver` returns `false` once the receiving dispatch loop is gone; the
/// source should then stop producing for this registration.
#[derive(Clone)]
pub struct BatchSink {
    stream: StreamId,
    deliver: Arc<dyn Fn(RawBatch) -> bool + Send + Sync>,
}

impl BatchSink {
    pub fn new<F>(stream: StreamId, deliver: F) -> Self
    where
        F: Fn(RawBatch) -> bool + Send + Sync + 'static,
    {
        Self {
            stream,
            deliver: Arc::new(deliver),
        }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn deliver(&self, batch: RawBatch) -> bool {
        (self.deliver)(batch)
    }
}

impl fmt::Debug for BatchSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSink")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`NotificationSource::register_watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Parameters of one registration.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// Canonical, absolute roots.
    pub roots: Vec<PathBuf>,
    pub latency: Duration,
    pub since: Since,
    pub flags: CreateFlags,
    /// Attach event ids to notifications.
    pub ids: bool,
    pub sink: BatchSink,
}

/// Trait abstracting the OS-level change notification facility.
///
/// Production code uses [`NotifySource`]; tests can use [`ManualSource`]
/// and decide exactly which batches are delivered and when.
pub trait NotificationSource: Send + Sync + fmt::Debug {
    /// Start watching `request.roots`; batches go to `request.sink` until the
    /// watch is deregistered.
    fn register_watch(&self, request: WatchRequest) -> Result<WatchId>;

    /// Stop a watch. Batches already in flight may still reach the sink.
    fn deregister_watch(&self, watch: WatchId) -> Result<()>;
}
