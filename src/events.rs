// src/events.rs

//! Event vocabulary handed to stream callbacks.
//!
//! File events mimic the inotify vocabulary (and its numeric masks) so that
//! consumers written against inotify can reuse their dispatch tables.

use std::fmt;
use std::path::PathBuf;

use crate::source::RawNotification;

pub const IN_MODIFY: u32 = 0x0000_0002;
pub const IN_ATTRIB: u32 = 0x0000_0004;
pub const IN_MOVED_FROM: u32 = 0x0000_0040;
pub const IN_MOVED_TO: u32 = 0x0000_0080;
pub const IN_CREATE: u32 = 0x0000_0100;
pub const IN_DELETE: u32 = 0x0000_0200;
pub const IN_ISDIR: u32 = 0x4000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Created,
    Modified,
    /// Metadata-only change (permissions, ownership, xattrs).
    AttributeChanged,
    Deleted,
    MovedFrom,
    MovedTo,
}

impl FileEventKind {
    /// Stable numeric code (the matching inotify `IN_*` constant).
    pub fn code(self) -> u32 {
        match self {
            FileEventKind::Created => IN_CREATE,
            FileEventKind::Modified => IN_MODIFY,
            FileEventKind::AttributeChanged => IN_ATTRIB,
            FileEventKind::Deleted => IN_DELETE,
            FileEventKind::MovedFrom => IN_MOVED_FROM,
            FileEventKind::MovedTo => IN_MOVED_TO,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code & !IN_ISDIR {
            IN_CREATE => Some(FileEventKind::Created),
            IN_MODIFY => Some(FileEventKind::Modified),
            IN_ATTRIB => Some(FileEventKind::AttributeChanged),
            IN_DELETE => Some(FileEventKind::Deleted),
            IN_MOVED_FROM => Some(FileEventKind::MovedFrom),
            IN_MOVED_TO => Some(FileEventKind::MovedTo),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileEventKind::Created => "created",
            FileEventKind::Modified => "modified",
            FileEventKind::AttributeChanged => "attrib",
            FileEventKind::Deleted => "deleted",
            FileEventKind::MovedFrom => "moved_from",
            FileEventKind::MovedTo => "moved_to",
        }
    }
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synthesized, per-file event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    /// Shared by exactly one `MovedFrom`/`MovedTo` pair; `None` otherwise.
    pub cookie: Option<u64>,
    pub path: PathBuf,
    pub is_dir: bool,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            kind,
            cookie: None,
            path: path.into(),
            is_dir,
        }
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = Some(cookie);
        self
    }

    /// inotify-style mask: the kind's code, plus `IN_ISDIR` for directories.
    pub fn mask(&self) -> u32 {
        if self.is_dir {
            self.kind.code() | IN_ISDIR
        } else {
            self.kind.code()
        }
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10} {:#06x}", self.kind, self.mask())?;
        if let Some(cookie) = self.cookie {
            write!(f, " cookie={cookie}")?;
        }
        write!(f, " {}", self.path.display())
    }
}

/// Out-of-band conditions the consumer should know about.
///
/// After `EventsDropped` the synthesizer has already rescanned the affected
/// root, but events that happened and were undone inside the gap are lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The source lost notifications (queue overflow, kernel drop).
    EventsDropped { path: PathBuf },
    /// A watched root itself was moved or deleted.
    RootChanged { path: PathBuf },
    /// Registering the stream with the notification source failed.
    WatchFailed { reason: String },
    /// A directory changed before it had a baseline. It was re-baselined;
    /// changes made in it before that point were not reported.
    Unseeded { path: PathBuf },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::EventsDropped { path } => {
                write!(f, "events dropped under {}; rescanned", path.display())
            }
            Diagnostic::RootChanged { path } => {
                write!(f, "watched root changed: {}", path.display())
            }
            Diagnostic::WatchFailed { reason } => write!(f, "watch failed: {reason}"),
            Diagnostic::Unseeded { path } => {
                write!(f, "no baseline for {}; re-baselined", path.display())
            }
        }
    }
}

/// What a stream callback receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Synthesized per-file event (streams with `file_events` enabled).
    File(FileEvent),
    /// Untouched source notification (pass-through streams).
    Raw(RawNotification),
    Diagnostic(Diagnostic),
}

impl StreamEvent {
    pub fn as_file(&self) -> Option<&FileEvent> {
        match self {
            StreamEvent::File(event) => Some(event),
            _ => None,
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEvent::File(event) => write!(f, "{event}"),
            StreamEvent::Raw(raw) => write!(f, "{raw}"),
            StreamEvent::Diagnostic(diag) => write!(f, "!! {diag}"),
        }
    }
}
