// src/observer/runloop.rs

//! Message queue into an observer's dispatch thread.

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use super::lifecycle::Ticket;
use crate::source::{BatchSink, RawBatch};
use crate::stream::{Stream, StreamId};
use crate::watch::BatchProcessor;

/// Everything the dispatch loop can be asked to do.
pub(crate) enum Message {
    /// A source delivered a batch for `stream`.
    Batch { stream: StreamId, batch: RawBatch },
    /// Seed and register a newly scheduled stream on the loop. Ignored if
    /// the stream was unscheduled or rescheduled since.
    Attach(Ticket),
    /// Take ownership of a stream that was seeded and registered on the
    /// scheduling thread.
    Adopt {
        stream: Stream,
        processor: Box<dyn BatchProcessor>,
    },
    /// Release a stream that was unscheduled.
    Detach(StreamId),
    Stop,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Batch { stream, batch } => f
                .debug_struct("Batch")
                .field("stream", stream)
                .field("len", &batch.len())
                .finish(),
            Message::Attach(ticket) => f
                .debug_tuple("Attach")
                .field(&ticket.stream.id())
                .field(&ticket.generation)
                .finish(),
            Message::Adopt { stream, .. } => f.debug_tuple("Adopt").field(&stream.id()).finish(),
            Message::Detach(id) => f.debug_tuple("Detach").field(id).finish(),
            Message::Stop => f.write_str("Stop"),
        }
    }
}

/// Sending half of the loop. Cheap to clone; every producer holds one.
#[derive(Debug, Clone)]
pub(crate) struct RunLoopHandle {
    tx: Sender<Message>,
}

/// Create a loop's channel pair. The receiver goes to the dispatch thread.
pub(crate) fn channel() -> (RunLoopHandle, Receiver<Message>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (RunLoopHandle { tx }, rx)
}

impl RunLoopHandle {
    /// Post a message. Returns `false` once the dispatch thread has exited.
    pub(crate) fn post(&self, message: Message) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(err) => {
                debug!(message = ?err.0, "dispatch loop gone; message dropped");
                false
            }
        }
    }

    pub(crate) fn request_stop(&self) -> bool {
        self.post(Message::Stop)
    }

    /// Sink handed to the notification source for `stream`'s registration.
    pub(crate) fn sink_for(&self, stream: StreamId) -> BatchSink {
        let tx = self.tx.clone();
        BatchSink::new(stream, move |batch| {
            tx.send(Message::Batch { stream, batch }).is_ok()
        })
    }
}
