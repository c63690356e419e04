// src/source/manual.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::{
    BatchSink, CreateFlags, EventFlags, NotificationSource, RawBatch, RawNotification, WatchId,
    WatchRequest,
};
use crate::errors::{Result, TreewatchError};

#[derive(Debug)]
struct ManualWatch {
    roots: Vec<PathBuf>,
    flags: CreateFlags,
    ids: bool,
    sink: BatchSink,
}

#[derive(Debug, Default)]
struct ManualState {
    next_watch: u64,
    next_event_id: u64,
    watches: BTreeMap<WatchId, ManualWatch>,
}

/// A notification source driven by hand.
///
/// Nothing is observed on its own: callers change the filesystem (real or
/// mock) and then [`emit`](ManualSource::emit) the batch the OS would have
/// produced. Each notification is routed to every registration whose roots
/// contain its path.
#[derive(Debug, Default)]
pub struct ManualSource {
    state: Mutex<ManualState>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live registrations.
    pub fn watch_count(&self) -> usize {
        self.lock().watches.len()
    }

    /// Roots of every live registration, in registration order.
    pub fn watched_roots(&self) -> Vec<Vec<PathBuf>> {
        self.lock().watches.values().map(|w| w.roots.clone()).collect()
    }

    /// Create flags of every live registration, in registration order.
    pub fn watch_flags(&self) -> Vec<CreateFlags> {
        self.lock().watches.values().map(|w| w.flags).collect()
    }

    /// Deliver `(path, flags)` pairs as one batch.
    ///
    /// Returns the number of registrations that received something.
    pub fn emit<I, P>(&self, notifications: I) -> usize
    where
        I: IntoIterator<Item = (P, EventFlags)>,
        P: Into<PathBuf>,
    {
        self.emit_batch(
            notifications
                .into_iter()
                .map(|(path, flags)| RawNotification::new(path, flags))
                .collect(),
        )
    }

    pub fn emit_batch(&self, batch: RawBatch) -> usize {
        let deliveries: Vec<(BatchSink, RawBatch)> = {
            let mut state = self.lock();
            let mut next_event_id = state.next_event_id;
            let routed = state
                .watches
                .values()
                .filter_map(|watch| {
                    let notifications: Vec<RawNotification> = batch
                        .notifications
                        .iter()
                        .filter(|n| watch.roots.iter().any(|root| n.path.starts_with(root)))
                        .map(|n| {
                            if watch.ids && n.id.is_none() {
                                next_event_id += 1;
                                n.clone().with_id(next_event_id)
                            } else {
                                n.clone()
                            }
                        })
                        .collect();
                    if notifications.is_empty() {
                        None
                    } else {
                        Some((watch.sink.clone(), RawBatch::new(notifications)))
                    }
                })
                .collect();
            state.next_event_id = next_event_id;
            routed
        };

        // Deliver outside the lock; a sink may be arbitrary caller code.
        let mut delivered = 0;
        for (sink, batch) in deliveries {
            debug!(stream = %sink.stream(), len = batch.len(), "manual source delivering batch");
            if sink.deliver(batch) {
                delivered += 1;
            }
        }
        delivered
    }
}

impl NotificationSource for ManualSource {
    fn register_watch(&self, request: WatchRequest) -> Result<WatchId> {
        if request.roots.is_empty() {
            return Err(TreewatchError::InvalidConfiguration(
                "watch request has no roots".to_string(),
            ));
        }
        let mut state = self.lock();
        state.next_watch += 1;
        let id = WatchId(state.next_watch);
        state.watches.insert(
            id,
            ManualWatch {
                roots: request.roots,
                flags: request.flags,
                ids: request.ids,
                sink: request.sink,
            },
        );
        Ok(id)
    }

    fn deregister_watch(&self, watch: WatchId) -> Result<()> {
        match self.lock().watches.remove(&watch) {
            Some(_) => Ok(()),
            None => Err(TreewatchError::ProgrammerMisuse(format!(
                "{watch} is not registered"
            ))),
        }
    }
}
