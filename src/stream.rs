// src/stream.rs

//! Streams: what to watch and who to tell.

use std::fmt;
use std::path::{self, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::{Result, TreewatchError};
use crate::events::StreamEvent;
use crate::source::CreateFlags;
use crate::types::Since;
use crate::watch::processor::ProcessorKind;

/// Default coalescing latency handed to the notification source.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(10);

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    fn next() -> Self {
        StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Per-stream options.
///
/// `since`, `flags` and `ids` only matter to the notification source; the
/// synthesizer ignores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// Synthesize typed per-file events instead of passing raw directory
    /// notifications through.
    pub file_events: bool,
    pub latency: Duration,
    pub since: Since,
    pub flags: CreateFlags,
    pub ids: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            file_events: false,
            latency: DEFAULT_LATENCY,
            since: Since::Now,
            flags: CreateFlags::empty(),
            ids: false,
        }
    }
}

impl StreamOptions {
    pub fn file_events(mut self, enabled: bool) -> Self {
        self.file_events = enabled;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn since(mut self, since: Since) -> Self {
        self.since = since;
        self
    }

    pub fn flags(mut self, flags: CreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn ids(mut self, enabled: bool) -> Self {
        self.ids = enabled;
        self
    }

    /// Ask the source for file-granular raw notifications.
    pub fn raw_file_events(mut self, enabled: bool) -> Self {
        self.flags.set(CreateFlags::FILE_EVENTS, enabled);
        self
    }
}

type Callback = Box<dyn FnMut(StreamEvent) + Send + 'static>;

struct StreamInner {
    id: StreamId,
    roots: Vec<PathBuf>,
    options: StreamOptions,
    processor: ProcessorKind,
    // Only ever locked on the dispatch thread.
    callback: Mutex<Callback>,
}

/// A set of watched roots plus the callback that receives their events.
///
/// Cloning is cheap and yields a handle to the same stream; identity (for
/// scheduling) is the [`StreamId`].
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    /// Build a stream.
    ///
    /// Relative roots are made absolute against the current directory and
    /// duplicates are dropped (first occurrence wins). Fails with
    /// `InvalidConfiguration` when no roots are given or a root is empty.
    pub fn new<F, I, P>(callback: F, roots: I, options: StreamOptions) -> Result<Self>
    where
        F: FnMut(StreamEvent) + Send + 'static,
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut resolved: Vec<PathBuf> = Vec::new();
        for root in roots {
            let root: PathBuf = root.into();
            if root.as_os_str().is_empty() {
                return Err(TreewatchError::InvalidConfiguration(
                    "stream root paths must not be empty".to_string(),
                ));
            }
            let absolute = path::absolute(&root).map_err(|err| {
                TreewatchError::InvalidConfiguration(format!(
                    "cannot make {:?} absolute: {err}",
                    root
                ))
            })?;
            if !resolved.contains(&absolute) {
                resolved.push(absolute);
            }
        }

        if resolved.is_empty() {
            return Err(TreewatchError::InvalidConfiguration(
                "stream needs at least one root path".to_string(),
            ));
        }

        let processor = if options.file_events {
            ProcessorKind::Synthesizing
        } else {
            ProcessorKind::Passthrough
        };

        Ok(Self {
            inner: Arc::new(StreamInner {
                id: StreamId::next(),
                roots: resolved,
                options,
                processor,
                callback: Mutex::new(Box::new(callback)),
            }),
        })
    }

    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.inner.roots
    }

    pub fn options(&self) -> &StreamOptions {
        &self.inner.options
    }

    pub fn processor_kind(&self) -> ProcessorKind {
        self.inner.processor
    }

    /// Create flags actually sent to the source. Synthesis needs directory
    /// granular notifications, so `FILE_EVENTS` is dropped for it.
    pub fn source_flags(&self) -> CreateFlags {
        match self.inner.processor {
            ProcessorKind::Synthesizing => self.inner.options.flags - CreateFlags::FILE_EVENTS,
            ProcessorKind::Passthrough => self.inner.options.flags,
        }
    }

    /// Invoke the callback. Called on the dispatch thread only.
    pub(crate) fn deliver(&self, event: StreamEvent) {
        let mut callback = self
            .inner
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (callback)(event);
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Stream {}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("roots", &self.inner.roots)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
