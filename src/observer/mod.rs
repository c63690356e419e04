// src/observer/mod.rs

//! Observers: a dispatch thread plus the streams scheduled on it.
//!
//! [`Observer`] is the IO shell around the pure [`lifecycle::Lifecycle`]:
//! it takes the mutex, asks the lifecycle what an operation means, and then
//! carries out the returned action (wake the thread, post to the loop,
//! register with the source, join).

pub mod dispatcher;
pub mod lifecycle;
pub mod runloop;

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::errors::{Result, TreewatchError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::source::{NotificationSource, NotifySource, WatchRequest};
use crate::stream::Stream;
use crate::watch::path_utils::canonical_roots;

use self::lifecycle::{
    Generation, Lifecycle, ScheduleAction, StopAction, Ticket, UnscheduleAction,
};
use self::runloop::{Message, RunLoopHandle};

pub use lifecycle::ObserverState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverOptions {
    /// Seed and register streams on the thread calling `schedule` (while
    /// it holds the observer lock) instead of on the dispatch thread.
    /// Events may then be delivered before `schedule` returns.
    pub process_asap: bool,
    /// Name of the dispatch thread.
    pub thread_name: String,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            process_asap: false,
            thread_name: "treewatch-dispatch".to_string(),
        }
    }
}

/// State shared between the public handle and the dispatch thread.
#[derive(Debug)]
pub(crate) struct Shared {
    lifecycle: Mutex<Lifecycle>,
    wake: Condvar,
    runloop: RunLoopHandle,
    pub(crate) source: Arc<dyn NotificationSource>,
    pub(crate) fs: Arc<dyn FileSystem>,
    options: ObserverOptions,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn watch_request(&self, stream: &Stream, roots: Vec<PathBuf>) -> WatchRequest {
        let options = stream.options();
        WatchRequest {
            roots,
            latency: options.latency,
            since: options.since,
            flags: stream.source_flags(),
            ids: options.ids,
            sink: self.runloop.sink_for(stream.id()),
        }
    }
}

/// Owns one dispatch thread and the streams scheduled on it.
///
/// All callbacks of all streams on an observer run on its dispatch thread,
/// one at a time. Dropping a running observer stops it.
#[derive(Debug)]
pub struct Observer {
    shared: Arc<Shared>,
    inbox: Mutex<Option<Receiver<Message>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer {
    /// Observer over the real filesystem and the `notify` backend.
    pub fn new() -> Self {
        Self::with_options(ObserverOptions::default())
    }

    pub fn with_options(options: ObserverOptions) -> Self {
        Self::with_backend(
            Arc::new(NotifySource::new()),
            Arc::new(RealFileSystem),
            options,
        )
    }

    /// Observer over an arbitrary source and filesystem.
    pub fn with_backend(
        source: Arc<dyn NotificationSource>,
        fs: Arc<dyn FileSystem>,
        options: ObserverOptions,
    ) -> Self {
        let (runloop, inbox) = runloop::channel();
        Self {
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle::new()),
                wake: Condvar::new(),
                runloop,
                source,
                fs,
                options,
            }),
            inbox: Mutex::new(Some(inbox)),
            thread: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ObserverState {
        self.shared.lock().state()
    }

    pub fn options(&self) -> &ObserverOptions {
        &self.shared.options
    }

    /// Whether `stream` is pending or active on this observer.
    pub fn is_scheduled(&self, stream: &Stream) -> bool {
        self.shared.lock().is_known(stream.id())
    }

    /// Spawn the dispatch thread. It parks until the first stream arrives.
    ///
    /// Only valid on an idle observer.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.shared.lock();
        lifecycle.start()?;

        let Some(inbox) = self
            .inbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            lifecycle.abort_start();
            return Err(TreewatchError::ProgrammerMisuse(
                "observer was already started once".to_string(),
            ));
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.options.thread_name.clone())
            .spawn(move || dispatcher::dispatch_main(shared, inbox));

        match spawned {
            Ok(handle) => {
                *self.thread_slot() = Some(handle);
                info!(thread = %self.shared.options.thread_name, "observer started");
                Ok(())
            }
            Err(err) => {
                lifecycle.abort_start();
                Err(TreewatchError::IoError(err))
            }
        }
    }

    /// Add `stream` to this observer.
    ///
    /// Before `start` the stream is held until the dispatch thread runs.
    /// Afterwards it is seeded and registered on the dispatch thread, or
    /// right here when `process_asap` is set.
    pub fn schedule(&self, stream: &Stream) -> Result<()> {
        let mut lifecycle = self.shared.lock();
        let action = lifecycle.schedule(stream.clone(), self.shared.options.process_asap)?;
        debug!(stream = %stream.id(), ?action, "stream scheduled");

        match action {
            ScheduleAction::Queued => {}
            ScheduleAction::QueuedAndWake => self.shared.wake.notify_all(),
            ScheduleAction::AttachOnLoop(generation) => {
                self.shared.runloop.post(Message::Attach(Ticket {
                    stream: stream.clone(),
                    generation,
                }));
            }
            ScheduleAction::AttachHere { wake, generation } => {
                self.attach_here(&mut lifecycle, stream, generation, wake)?;
                if wake {
                    self.shared.wake.notify_all();
                }
            }
        }
        Ok(())
    }

    /// Seed, hand over to the loop and register, all under the lock.
    ///
    /// `promoted` is set when this scheduling moved the observer out of
    /// `Waiting`; a failed registration then puts it back.
    fn attach_here(
        &self,
        lifecycle: &mut Lifecycle,
        stream: &Stream,
        generation: Generation,
        promoted: bool,
    ) -> Result<()> {
        let id = stream.id();
        let roots = canonical_roots(self.shared.fs.as_ref(), stream.roots());
        let processor = stream
            .processor_kind()
            .build(Arc::clone(&self.shared.fs), &roots);
        self.shared.runloop.post(Message::Adopt {
            stream: stream.clone(),
            processor,
        });

        match self
            .shared
            .source
            .register_watch(self.shared.watch_request(stream, roots))
        {
            Ok(watch) => {
                if lifecycle.bind_watch(id, generation, watch) {
                    info!(stream = %id, %watch, "stream attached on scheduling thread");
                } else if let Err(err) = self.shared.source.deregister_watch(watch) {
                    warn!(stream = %id, error = %err, "failed to release unbound watch");
                }
                Ok(())
            }
            Err(err) => {
                warn!(stream = %id, error = %err, "failed to register stream with source");
                // Forget it again so the caller may retry.
                if !lifecycle.abandon(id, generation, promoted) {
                    debug!(stream = %id, %generation, "failed stream was already forgotten");
                }
                self.shared.runloop.post(Message::Detach(id));
                Err(err)
            }
        }
    }

    /// Remove `stream`. Its watch is released immediately; batches already
    /// queued for it are discarded by the loop.
    pub fn unschedule(&self, stream: &Stream) -> Result<()> {
        let mut lifecycle = self.shared.lock();
        match lifecycle.unschedule(stream.id())? {
            UnscheduleAction::Dropped => {
                debug!(stream = %stream.id(), "pending stream unscheduled");
            }
            UnscheduleAction::Detach {
                watch,
                loop_running,
            } => {
                if let Some(watch) = watch
                    && let Err(err) = self.shared.source.deregister_watch(watch)
                {
                    warn!(stream = %stream.id(), error = %err, "failed to deregister watch");
                }
                if loop_running {
                    self.shared.runloop.post(Message::Detach(stream.id()));
                }
                debug!(stream = %stream.id(), "stream unscheduled");
            }
        }
        Ok(())
    }

    /// Stop the observer and wait for the dispatch thread to exit.
    ///
    /// Called from a stream callback (i.e. on the dispatch thread) it only
    /// requests the stop; the loop exits once the callback returns.
    pub fn stop(&self) -> Result<()> {
        {
            let mut lifecycle = self.shared.lock();
            let action = lifecycle.stop()?;
            debug!(?action, "observer stopping");
            if action == StopAction::StopLoop {
                self.shared.runloop.request_stop();
            }
            // A thread parked after a `process_asap` promotion must also see
            // the new state.
            self.shared.wake.notify_all();
        }

        let handle = self.thread_slot().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("stop called from the dispatch thread; not joining");
                return Ok(());
            }
            handle.join().map_err(|_| TreewatchError::DispatchPanicked)?;
        }
        info!("observer stopped");
        Ok(())
    }

    fn thread_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        let state = self.state();
        if matches!(state, ObserverState::Waiting | ObserverState::Active)
            && let Err(err) = self.stop()
        {
            warn!(error = %err, "failed to stop observer on drop");
        }
    }
}
