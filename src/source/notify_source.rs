// src/source/notify_source.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::{
    BatchSink, CreateFlags, EventFlags, NotificationSource, RawBatch, RawNotification, WatchId,
    WatchRequest,
};
use crate::errors::Result;
use crate::types::Since;

/// Notification source backed by the `notify` crate.
///
/// Each registration gets its own recursive `RecommendedWatcher` plus a
/// small coalescing thread. The thread collects notify events for
/// `latency`, folds them into one entry per directory (or per file with
/// [`CreateFlags::FILE_EVENTS`]) and posts the result as a single batch, so
/// consumers see the same coarse, coalesced shape FSEvents produces.
#[derive(Default)]
pub struct NotifySource {
    watches: Mutex<HashMap<WatchId, RecommendedWatcher>>,
    next_watch: AtomicU64,
    /// Event ids are unique across all registrations of this source.
    event_ids: Arc<AtomicU64>,
}

impl fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifySource")
            .field("watches", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl NotifySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WatchId, RecommendedWatcher>> {
        self.watches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationSource for NotifySource {
    fn register_watch(&self, request: WatchRequest) -> Result<WatchId> {
        let id = WatchId(self.next_watch.fetch_add(1, Ordering::Relaxed) + 1);

        if request.since != Since::Now {
            warn!(
                %id,
                since = %request.since,
                "notify backend keeps no event history; starting from now"
            );
        }

        // Channel from the notify callback into the coalescing thread.
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Receiver gone means the registration is being torn down.
                let _ = event_tx.send(res);
            },
            Config::default(),
        )?;

        for root in &request.roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        let coalescer = Coalescer {
            roots: request.roots.clone(),
            latency: request.latency,
            flags: request.flags,
            ids: request.ids.then(|| Arc::clone(&self.event_ids)),
            sink: request.sink,
        };
        thread::Builder::new()
            .name(format!("treewatch-coalesce-{}", id.0))
            .spawn(move || coalescer.run(event_rx))?;

        info!(%id, roots = ?request.roots, latency = ?request.latency, "notify watch registered");
        self.lock().insert(id, watcher);
        Ok(id)
    }

    fn deregister_watch(&self, watch: WatchId) -> Result<()> {
        // Dropping the watcher drops its callback, which disconnects the
        // coalescing thread's channel and lets it exit.
        match self.lock().remove(&watch) {
            Some(_) => {
                info!(id = %watch, "notify watch deregistered");
                Ok(())
            }
            None => {
                debug!(id = %watch, "deregister for unknown notify watch");
                Ok(())
            }
        }
    }
}

struct Coalescer {
    roots: Vec<PathBuf>,
    latency: Duration,
    flags: CreateFlags,
    ids: Option<Arc<AtomicU64>>,
    sink: BatchSink,
}

impl Coalescer {
    fn run(self, rx: Receiver<notify::Result<Event>>) {
        let mut last_flush: Option<Instant> = None;

        while let Ok(first) = rx.recv() {
            let mut pending: BTreeMap<PathBuf, EventFlags> = BTreeMap::new();
            self.absorb(&mut pending, first);

            // NO_DEFER: the first change after a quiet period goes out at once.
            let quiet = last_flush.is_none_or(|t| t.elapsed() >= self.latency);
            let deadline = if self.flags.contains(CreateFlags::NO_DEFER) && quiet {
                Instant::now()
            } else {
                Instant::now() + self.latency
            };

            let mut disconnected = false;
            loop {
                match rx.recv_deadline(deadline) {
                    Ok(res) => self.absorb(&mut pending, res),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }

            if !pending.is_empty() {
                let batch = self.build_batch(pending);
                debug!(stream = %self.sink.stream(), len = batch.len(), "posting coalesced batch");
                if !self.sink.deliver(batch) {
                    debug!(stream = %self.sink.stream(), "dispatch loop gone; coalescer exiting");
                    return;
                }
                last_flush = Some(Instant::now());
            }
            if disconnected {
                break;
            }
        }
        debug!(stream = %self.sink.stream(), "coalescer finished");
    }

    fn absorb(&self, pending: &mut BTreeMap<PathBuf, EventFlags>, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!(stream = %self.sink.stream(), error = %err, "notify reported an error");
                // Paths attached to an error are unreliable; rescan them.
                for path in &err.paths {
                    if let Some(dir) = self.report_path(path) {
                        *pending.entry(dir).or_default() |=
                            EventFlags::MUST_SCAN_SUBDIRS | EventFlags::USER_DROPPED;
                    }
                }
                return;
            }
        };

        if event.need_rescan() {
            warn!(stream = %self.sink.stream(), "notify queue overflowed; requesting rescan");
            for root in &self.roots {
                *pending.entry(root.clone()).or_default() |=
                    EventFlags::MUST_SCAN_SUBDIRS | EventFlags::USER_DROPPED;
            }
            return;
        }

        let Some(item_flags) = flags_for_kind(&event.kind) else {
            return;
        };

        for path in &event.paths {
            let mut flags = item_flags;
            if self.roots.iter().any(|root| root == path) {
                if !matches!(event.kind, EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))) {
                    continue;
                }
                if !self.flags.contains(CreateFlags::WATCH_ROOT) {
                    continue;
                }
                flags |= EventFlags::ROOT_CHANGED;
            }
            if let Some(reported) = self.report_path(path) {
                *pending.entry(reported).or_default() |= flags;
            }
        }
    }

    /// The path a notification is filed under: the parent directory for
    /// directory-granular streams, the item itself for file-granular ones.
    /// A root is always reported as itself so it never escapes the tree.
    fn report_path(&self, path: &Path) -> Option<PathBuf> {
        if self.flags.contains(CreateFlags::FILE_EVENTS)
            || self.roots.iter().any(|root| root == path)
        {
            return Some(path.to_path_buf());
        }
        path.parent().map(Path::to_path_buf)
    }

    fn build_batch(&self, pending: BTreeMap<PathBuf, EventFlags>) -> RawBatch {
        pending
            .into_iter()
            .map(|(path, flags)| {
                let notification = RawNotification::new(path, flags);
                match &self.ids {
                    Some(counter) => notification.with_id(counter.fetch_add(1, Ordering::Relaxed) + 1),
                    None => notification,
                }
            })
            .collect()
    }
}

/// Map a notify event kind onto FSEvents-style item flags.
///
/// `None` means the event does not describe a change (pure access).
fn flags_for_kind(kind: &EventKind) -> Option<EventFlags> {
    let flags = match kind {
        EventKind::Access(_) => return None,
        EventKind::Create(CreateKind::File) => EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_FILE,
        EventKind::Create(CreateKind::Folder) => EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_DIR,
        EventKind::Create(_) => EventFlags::ITEM_CREATED,
        EventKind::Modify(ModifyKind::Name(_)) => EventFlags::ITEM_RENAMED,
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership)) => {
            EventFlags::ITEM_CHANGE_OWNER
        }
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Extended)) => {
            EventFlags::ITEM_XATTR_MOD
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => EventFlags::ITEM_INODE_META_MOD,
        EventKind::Modify(_) => EventFlags::ITEM_MODIFIED,
        EventKind::Remove(RemoveKind::File) => EventFlags::ITEM_REMOVED | EventFlags::ITEM_IS_FILE,
        EventKind::Remove(RemoveKind::Folder) => EventFlags::ITEM_REMOVED | EventFlags::ITEM_IS_DIR,
        EventKind::Remove(_) => EventFlags::ITEM_REMOVED,
        EventKind::Any | EventKind::Other => EventFlags::empty(),
    };
    Some(flags)
}
