// src/observer/dispatcher.rs

//! The dispatch thread.
//!
//! One per observer. It parks until the first stream is scheduled, then
//! owns every stream's [`BatchProcessor`] and runs the message loop: each
//! raw batch is processed and the resulting events are handed to the
//! stream's callback, in order, on this thread only.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::{debug, info, trace, warn};

use super::Shared;
use super::lifecycle::{Ticket, Wakeup};
use super::runloop::Message;
use crate::events::{Diagnostic, StreamEvent};
use crate::source::RawBatch;
use crate::stream::{Stream, StreamId};
use crate::watch::BatchProcessor;
use crate::watch::path_utils::canonical_roots;

struct Binding {
    stream: Stream,
    processor: Box<dyn BatchProcessor>,
}

/// Entry point of the dispatch thread.
pub(crate) fn dispatch_main(shared: Arc<Shared>, inbox: Receiver<Message>) {
    debug!("dispatch thread started");

    let initial = {
        let mut lifecycle = shared.lock();
        loop {
            match lifecycle.next_wakeup() {
                Wakeup::Cancelled => {
                    info!("observer stopped before any stream was scheduled");
                    return;
                }
                Wakeup::Run(tickets) => break tickets,
                Wakeup::Park => {
                    trace!("dispatch thread parked");
                    lifecycle = shared
                        .wake
                        .wait(lifecycle)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            }
        }
    };

    let mut dispatcher = Dispatcher {
        shared,
        bindings: HashMap::new(),
    };
    for ticket in initial {
        dispatcher.attach(ticket);
    }
    dispatcher.run(&inbox);
    dispatcher.teardown();
}

struct Dispatcher {
    shared: Arc<Shared>,
    bindings: HashMap<StreamId, Binding>,
}

impl Dispatcher {
    fn run(&mut self, inbox: &Receiver<Message>) {
        info!("dispatch loop running");
        loop {
            let message = match inbox.recv() {
                Ok(message) => message,
                Err(_) => {
                    debug!("dispatch channel closed; exiting");
                    break;
                }
            };
            trace!(?message, "dispatch loop received message");

            match message {
                Message::Batch { stream, batch } => self.dispatch(stream, &batch),
                Message::Attach(ticket) => self.attach(ticket),
                Message::Adopt { stream, processor } => {
                    debug!(stream = %stream.id(), "adopting stream attached by scheduler");
                    self.bindings.insert(stream.id(), Binding { stream, processor });
                }
                Message::Detach(id) => {
                    if self.bindings.remove(&id).is_some() {
                        debug!(stream = %id, "stream detached");
                    }
                }
                Message::Stop => {
                    info!("stop requested; leaving dispatch loop");
                    break;
                }
            }
        }
    }

    /// Seed the stream's processor here, then register it with the source.
    fn attach(&mut self, ticket: Ticket) {
        let Ticket { stream, generation } = ticket;
        let id = stream.id();
        if !self.shared.lock().is_current(id, generation) {
            debug!(stream = %id, %generation, "stale attach; skipped");
            return;
        }

        let roots = canonical_roots(self.shared.fs.as_ref(), stream.roots());
        let processor = stream
            .processor_kind()
            .build(Arc::clone(&self.shared.fs), &roots);
        self.bindings.insert(
            id,
            Binding {
                stream: stream.clone(),
                processor,
            },
        );

        let request = self.shared.watch_request(&stream, roots);
        match self.shared.source.register_watch(request) {
            Ok(watch) => {
                if self.shared.lock().bind_watch(id, generation, watch) {
                    info!(stream = %id, %watch, "stream attached");
                } else {
                    debug!(
                        stream = %id,
                        %generation,
                        %watch,
                        "stream went away during attach; releasing watch"
                    );
                    if let Err(err) = self.shared.source.deregister_watch(watch) {
                        warn!(stream = %id, error = %err, "failed to release watch");
                    }
                    self.bindings.remove(&id);
                }
            }
            Err(err) => {
                warn!(stream = %id, error = %err, "failed to register stream with source");
                stream.deliver(StreamEvent::Diagnostic(Diagnostic::WatchFailed {
                    reason: err.to_string(),
                }));
            }
        }
    }

    fn dispatch(&mut self, id: StreamId, batch: &RawBatch) {
        let Some(binding) = self.bindings.get_mut(&id) else {
            trace!(stream = %id, "batch for a detached stream; dropped");
            return;
        };

        let events = binding.processor.process(batch);
        debug!(stream = %id, raw = batch.len(), events = events.len(), "batch processed");
        for event in events {
            binding.stream.deliver(event);
        }
    }

    /// Deregister every watch. Stream entries stay with the lifecycle.
    fn teardown(self) {
        let watches = self.shared.lock().take_watches();
        for watch in watches {
            if let Err(err) = self.shared.source.deregister_watch(watch) {
                warn!(%watch, error = %err, "failed to deregister watch during teardown");
            }
        }
        info!(streams = self.bindings.len(), "dispatch thread exiting");
    }
}
