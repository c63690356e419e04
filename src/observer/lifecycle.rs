// src/observer/lifecycle.rs

//! Pure observer lifecycle state machine.
//!
//! [`Lifecycle`] holds the observer's bookkeeping (state, pending and active
//! streams, the dispatch thread's park state) and decides what each public
//! operation means, returning an action for the IO shell in
//! [`super::Observer`] to carry out. It has no threads, channels, or
//! filesystem access and is unit tested on its own.
//!
//! ```text
//! Idle --start--> Waiting --first stream--> Active
//!   \                \                        |
//!    `----stop--------`-------stop-------------`--> Stopped
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Result, TreewatchError};
use crate::source::WatchId;
use crate::stream::{Stream, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverState {
    /// Constructed, not started.
    #[default]
    Idle,
    /// Dispatch thread running, parked until a stream shows up.
    Waiting,
    /// Dispatch loop running.
    Active,
    /// Terminal.
    Stopped,
}

impl fmt::Display for ObserverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObserverState::Idle => "idle",
            ObserverState::Waiting => "waiting",
            ObserverState::Active => "active",
            ObserverState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Where the dispatch thread is relative to its initial wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParkState {
    #[default]
    NotStarted,
    Parked,
    /// `stop` arrived before any stream; the thread must exit.
    Cancelled,
}

/// Tells one scheduling of a stream apart from a later one, so work queued
/// for an earlier scheduling can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// A stream together with the scheduling it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub stream: Stream,
    pub generation: Generation,
}

/// A stream the dispatch loop owns, plus its source registration once made.
#[derive(Debug)]
pub struct Registration {
    pub stream: Stream,
    pub generation: Generation,
    pub watch: Option<WatchId>,
}

/// What the dispatch thread should do after waking.
#[derive(Debug)]
pub enum Wakeup {
    /// Keep waiting on the condition variable.
    Park,
    /// Exit without ever running the loop.
    Cancelled,
    /// Run the loop, attaching these (formerly pending) streams first.
    Run(Vec<Ticket>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    /// Held until the observer starts.
    Queued,
    /// Held; the parked dispatch thread must be woken to pick it up.
    QueuedAndWake,
    /// The running loop must be told to attach it.
    AttachOnLoop(Generation),
    /// Attach on the calling thread now (`process_asap`). `wake` is set
    /// when this promoted the observer out of `Waiting`.
    AttachHere { wake: bool, generation: Generation },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnscheduleAction {
    /// It was only pending; nothing else to do.
    Dropped,
    /// It was active: deregister `watch` (if made) and, if the loop still
    /// runs, tell it to release the stream.
    Detach {
        watch: Option<WatchId>,
        loop_running: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    /// No dispatch thread was ever started.
    NothingRunning,
    /// Wake the parked thread so it sees the cancellation.
    CancelPark,
    /// Post a stop request to the running loop.
    StopLoop,
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    state: ObserverState,
    park: ParkState,
    last_generation: u64,
    pending: Vec<Ticket>,
    active: BTreeMap<StreamId, Registration>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    pub fn park_state(&self) -> ParkState {
        self.park
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_known(&self, id: StreamId) -> bool {
        self.active.contains_key(&id) || self.pending.iter().any(|t| t.stream.id() == id)
    }

    pub fn is_active(&self, id: StreamId) -> bool {
        self.active.contains_key(&id)
    }

    /// Whether `id` is active under exactly this scheduling.
    pub fn is_current(&self, id: StreamId, generation: Generation) -> bool {
        self.active
            .get(&id)
            .is_some_and(|registration| registration.generation == generation)
    }

    fn next_generation(&mut self) -> Generation {
        self.last_generation += 1;
        Generation(self.last_generation)
    }

    /// `Idle -> Waiting`. Any other state is misuse.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ObserverState::Idle => {
                self.state = ObserverState::Waiting;
                Ok(())
            }
            other => Err(TreewatchError::ProgrammerMisuse(format!(
                "start called on a {other} observer"
            ))),
        }
    }

    /// Undo [`start`](Self::start) when the dispatch thread could not be
    /// spawned. The observer is unusable afterwards.
    pub fn abort_start(&mut self) {
        self.state = ObserverState::Stopped;
        self.park = ParkState::Cancelled;
    }

    /// Called by the dispatch thread each time it wakes before the loop runs.
    pub fn next_wakeup(&mut self) -> Wakeup {
        if self.park == ParkState::Cancelled {
            return Wakeup::Cancelled;
        }
        if !self.pending.is_empty() {
            let tickets: Vec<Ticket> = self.pending.drain(..).collect();
            for ticket in &tickets {
                self.insert_active(ticket.stream.clone(), ticket.generation);
            }
            if self.state == ObserverState::Waiting {
                self.state = ObserverState::Active;
            }
            return Wakeup::Run(tickets);
        }
        match self.state {
            // Promoted by a `process_asap` schedule, or stopped after it.
            // Either way the loop must run to drain its messages.
            ObserverState::Active | ObserverState::Stopped => Wakeup::Run(Vec::new()),
            ObserverState::Idle | ObserverState::Waiting => {
                self.park = ParkState::Parked;
                Wakeup::Park
            }
        }
    }

    pub fn schedule(&mut self, stream: Stream, process_asap: bool) -> Result<ScheduleAction> {
        if stream.roots().is_empty() {
            return Err(TreewatchError::InvalidConfiguration(format!(
                "{} has no roots",
                stream.id()
            )));
        }
        if self.is_known(stream.id()) {
            return Err(TreewatchError::AlreadyScheduled(stream.id()));
        }

        let generation = self.next_generation();
        let action = match self.state {
            ObserverState::Idle => {
                self.pending.push(Ticket { stream, generation });
                ScheduleAction::Queued
            }
            ObserverState::Waiting if process_asap => {
                self.insert_active(stream, generation);
                self.state = ObserverState::Active;
                ScheduleAction::AttachHere {
                    wake: true,
                    generation,
                }
            }
            ObserverState::Waiting => {
                self.pending.push(Ticket { stream, generation });
                ScheduleAction::QueuedAndWake
            }
            ObserverState::Active if process_asap => {
                self.insert_active(stream, generation);
                ScheduleAction::AttachHere {
                    wake: false,
                    generation,
                }
            }
            ObserverState::Active => {
                self.insert_active(stream, generation);
                ScheduleAction::AttachOnLoop(generation)
            }
            ObserverState::Stopped => {
                return Err(TreewatchError::ProgrammerMisuse(
                    "schedule called on a stopped observer".to_string(),
                ));
            }
        };
        Ok(action)
    }

    fn insert_active(&mut self, stream: Stream, generation: Generation) {
        self.active.insert(
            stream.id(),
            Registration {
                stream,
                generation,
                watch: None,
            },
        );
    }

    /// Record the source registration made for `id` under `generation`.
    ///
    /// Returns `false` when the observer stopped, the stream was unscheduled
    /// (or rescheduled) in the meantime, or it already holds a watch; the
    /// caller must then deregister `watch`.
    pub fn bind_watch(&mut self, id: StreamId, generation: Generation, watch: WatchId) -> bool {
        if self.state == ObserverState::Stopped {
            return false;
        }
        match self.active.get_mut(&id) {
            Some(registration)
                if registration.generation == generation && registration.watch.is_none() =>
            {
                registration.watch = Some(watch);
                true
            }
            _ => false,
        }
    }

    /// Forget a `process_asap` scheduling whose source registration failed.
    ///
    /// When that scheduling promoted the observer out of `Waiting` and
    /// nothing else became active, the observer goes back to `Waiting` so
    /// the dispatch thread stays parked. Returns whether the stream was
    /// still there to forget.
    pub fn abandon(&mut self, id: StreamId, generation: Generation, promoted: bool) -> bool {
        let removed = self.is_current(id, generation) && self.active.remove(&id).is_some();
        if promoted && self.state == ObserverState::Active && self.active.is_empty() {
            self.state = ObserverState::Waiting;
        }
        removed
    }

    pub fn unschedule(&mut self, id: StreamId) -> Result<UnscheduleAction> {
        if let Some(index) = self.pending.iter().position(|t| t.stream.id() == id) {
            self.pending.remove(index);
            return Ok(UnscheduleAction::Dropped);
        }
        match self.active.remove(&id) {
            Some(registration) => Ok(UnscheduleAction::Detach {
                watch: registration.watch,
                loop_running: self.state == ObserverState::Active,
            }),
            None => Err(TreewatchError::NotScheduled(id)),
        }
    }

    pub fn stop(&mut self) -> Result<StopAction> {
        let action = match self.state {
            ObserverState::Idle => StopAction::NothingRunning,
            ObserverState::Waiting => {
                self.park = ParkState::Cancelled;
                StopAction::CancelPark
            }
            ObserverState::Active => StopAction::StopLoop,
            ObserverState::Stopped => {
                return Err(TreewatchError::ProgrammerMisuse(
                    "stop called on a stopped observer".to_string(),
                ));
            }
        };
        self.state = ObserverState::Stopped;
        Ok(action)
    }

    /// Take every source registration for teardown. The streams themselves
    /// stay known so a later `unschedule` still succeeds.
    pub fn take_watches(&mut self) -> Vec<WatchId> {
        self.active
            .values_mut()
            .filter_map(|registration| registration.watch.take())
            .collect()
    }
}
