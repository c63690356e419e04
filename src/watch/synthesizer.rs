// src/watch/synthesizer.rs

//! Turning coarse "directory changed" notifications into per-file events.
//!
//! For every directory named in a batch the synthesizer lists it again,
//! compares the result against the stored snapshot and emits one event per
//! difference:
//!
//! - a name in both listings with a new modify time is `Modified`, one with
//!   only a newer change time is `AttributeChanged`;
//! - a name only in the old listing is `Deleted`, unless a name only in the
//!   new listing carries the same inode, in which case the two become a
//!   `MovedFrom`/`MovedTo` pair sharing a fresh cookie;
//! - any other new name is `Created`.
//!
//! New directories (created or moved in) are seeded right away so changes
//! inside them diff against a baseline. Moves are only correlated within
//! one directory pass; a move across directories shows up as `Deleted` in
//! the old parent and `Created` in the new one; the old listing of a
//! deleted directory is dropped once the batch is done.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use super::correlator::{Correlator, DeleteTable};
use super::path_utils::{normalize, root_of};
use super::snapshot::{SnapshotStore, capture_listing};
use crate::events::{Diagnostic, FileEvent, FileEventKind};
use crate::fs::FileSystem;
use crate::source::{EventFlags, RawBatch};

/// Output of one batch: file events plus any out-of-band diagnostics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub diagnostics: Vec<Diagnostic>,
    pub events: Vec<FileEvent>,
}

/// Snapshot/diff engine for one stream.
///
/// Owned by exactly one dispatch loop; not shared between threads.
#[derive(Debug)]
pub struct EventSynthesizer {
    fs: Arc<dyn FileSystem>,
    roots: Vec<PathBuf>,
    snapshots: SnapshotStore,
    correlator: Correlator,
}

impl EventSynthesizer {
    /// Create a synthesizer over `roots` and seed a snapshot of each.
    ///
    /// `roots` are expected to be canonical already; notifications are
    /// matched against them verbatim.
    pub fn new(fs: Arc<dyn FileSystem>, roots: &[PathBuf]) -> Self {
        let mut synthesizer = Self {
            fs,
            roots: roots.iter().map(|root| normalize(root)).collect(),
            snapshots: SnapshotStore::new(),
            correlator: Correlator::new(),
        };
        for root in synthesizer.roots.clone() {
            synthesizer.snapshots.seed(synthesizer.fs.as_ref(), &root);
        }
        synthesizer
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Diff every directory named in `batch` and return the file events.
    pub fn process(&mut self, batch: &RawBatch) -> Vec<FileEvent> {
        self.synthesize(batch).events
    }

    /// Like [`process`](Self::process), also returning diagnostics.
    pub fn synthesize(&mut self, batch: &RawBatch) -> Synthesis {
        let mut out = Synthesis::default();

        // Sorted and deduplicated; a parent is always diffed before anything
        // below it, so new subdirectories are seeded before they are needed.
        let mut targets: BTreeMap<PathBuf, EventFlags> = BTreeMap::new();
        let mut rescans: Vec<PathBuf> = Vec::new();

        for notification in &batch.notifications {
            let path = normalize(&notification.path);
            let Some(root) = root_of(&self.roots, &path).map(Path::to_path_buf) else {
                debug!(path = ?path, "notification outside watched roots; ignored");
                continue;
            };

            let flags = notification.flags;
            if flags.contains(EventFlags::ROOT_CHANGED) {
                out.diagnostics.push(Diagnostic::RootChanged { path: path.clone() });
            }
            if flags.is_dropped() {
                warn!(root = ?root, "source dropped events; rescanning root");
                out.diagnostics.push(Diagnostic::EventsDropped { path: root.clone() });
                rescans.push(root);
            } else if flags.contains(EventFlags::MUST_SCAN_SUBDIRS) {
                rescans.push(path.clone());
            }

            *targets.entry(path).or_default() |= flags;
        }

        let named: BTreeSet<PathBuf> = targets.keys().cloned().collect();
        for dir in rescans {
            for known in self.snapshots.directories_under(&dir) {
                targets.entry(known).or_default();
            }
        }

        // Directories reported `Deleted` in this batch. A rescan does not
        // descend into them, and their stale listings are dropped once the
        // batch is done.
        let mut gone: Vec<PathBuf> = Vec::new();
        for (dir, flags) in targets {
            if !named.contains(&dir) && gone.iter().any(|g| dir.starts_with(g)) {
                trace!(dir = ?dir, "rescan skips a directory deleted in this batch");
                continue;
            }
            let deleted = self.diff_directory(&dir, flags, &mut out);
            gone.extend(deleted);
        }
        for dir in &gone {
            self.snapshots.forget_subtree(dir);
        }

        trace!(
            events = out.events.len(),
            diagnostics = out.diagnostics.len(),
            "batch synthesized"
        );
        out
    }

    /// Diff one directory and update its snapshot. Returns the child
    /// directories reported as plain `Deleted`.
    fn diff_directory(
        &mut self,
        dir: &Path,
        flags: EventFlags,
        out: &mut Synthesis,
    ) -> Vec<PathBuf> {
        let current = capture_listing(self.fs.as_ref(), dir);

        let Some(previous) = self.snapshots.get(dir) else {
            // Every directory under a root is seeded before any notification
            // can name it, so this is a bookkeeping bug. Re-baseline and tell
            // the consumer that changes here may have been missed.
            error!(dir = ?dir, "directory changed before it was seeded");
            self.snapshots.seed(self.fs.as_ref(), dir);
            out.diagnostics.push(Diagnostic::Unseeded {
                path: dir.to_path_buf(),
            });
            return Vec::new();
        };

        let events = &mut out.events;
        let mut vanished = DeleteTable::new();
        let mut deleted_dirs: Vec<PathBuf> = Vec::new();

        for (name, before) in previous {
            let path = dir.join(name);
            match current.get(name) {
                Some(now) if now.modify_time != before.modify_time => {
                    if !flags.contains(EventFlags::ITEM_MODIFIED) {
                        debug!(path = ?path, ?flags, "modified without a modify flag");
                    }
                    events.push(FileEvent::new(FileEventKind::Modified, path, now.is_directory));
                }
                Some(now) if now.change_time > before.change_time => {
                    if !flags.is_metadata() {
                        debug!(path = ?path, ?flags, "attribute change without a metadata flag");
                    }
                    events.push(FileEvent::new(
                        FileEventKind::AttributeChanged,
                        path,
                        now.is_directory,
                    ));
                }
                Some(_) => {}
                None => {
                    if before.is_directory {
                        deleted_dirs.push(path.clone());
                    }
                    vanished.record(before.inode, events.len());
                    events.push(FileEvent::new(FileEventKind::Deleted, path, before.is_directory));
                }
            }
        }

        let mut new_dirs: Vec<PathBuf> = Vec::new();
        let mut moved_away: Vec<PathBuf> = Vec::new();

        for (name, now) in &current {
            if previous.contains_key(name) {
                continue;
            }
            let path = dir.join(name);
            match vanished.claim(now.inode) {
                Some(slot) => {
                    if !flags.contains(EventFlags::ITEM_RENAMED) {
                        debug!(path = ?path, ?flags, "move without a rename flag");
                    }
                    let cookie = self.correlator.next_cookie();
                    let from = &mut events[slot];
                    from.kind = FileEventKind::MovedFrom;
                    from.cookie = Some(cookie);
                    if from.is_dir {
                        moved_away.push(from.path.clone());
                    }
                    events.push(
                        FileEvent::new(FileEventKind::MovedTo, path.clone(), now.is_directory)
                            .with_cookie(cookie),
                    );
                }
                None => {
                    if !flags.contains(EventFlags::ITEM_CREATED) {
                        debug!(path = ?path, ?flags, "created without a create flag");
                    }
                    events.push(FileEvent::new(FileEventKind::Created, path.clone(), now.is_directory));
                }
            }
            if now.is_directory {
                new_dirs.push(path);
            }
        }

        for path in &moved_away {
            self.snapshots.forget_subtree(path);
        }
        for path in &new_dirs {
            self.snapshots.seed(self.fs.as_ref(), path);
        }
        self.snapshots.replace(dir.to_path_buf(), current);

        deleted_dirs.retain(|path| !moved_away.contains(path));
        deleted_dirs
    }
}
