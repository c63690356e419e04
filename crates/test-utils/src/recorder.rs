use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use treewatch::events::{Diagnostic, FileEvent, StreamEvent};
use treewatch::source::RawNotification;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub event: StreamEvent,
    /// Name of the thread the callback ran on.
    pub thread: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    events: Mutex<Vec<Recorded>>,
    changed: Condvar,
}

/// Stream callback sink that records everything it receives.
///
/// Clones share the same log, so one clone can go into the stream while
/// the test keeps another to inspect and wait on.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    shared: Arc<Shared>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Recorded>> {
        self.shared
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A callback suitable for `Stream::new`.
    pub fn callback(&self) -> impl FnMut(StreamEvent) + Send + 'static {
        let recorder = self.clone();
        move |event| recorder.record(event)
    }

    pub fn record(&self, event: StreamEvent) {
        let thread = thread::current().name().map(str::to_string);
        self.lock().push(Recorded { event, thread });
        self.shared.changed.notify_all();
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.lock().clone()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.lock().iter().map(|r| r.event.clone()).collect()
    }

    pub fn file_events(&self) -> Vec<FileEvent> {
        self.lock()
            .iter()
            .filter_map(|r| r.event.as_file().cloned())
            .collect()
    }

    pub fn raw_notifications(&self) -> Vec<RawNotification> {
        self.lock()
            .iter()
            .filter_map(|r| match &r.event {
                StreamEvent::Raw(raw) => Some(raw.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.lock()
            .iter()
            .filter_map(|r| match &r.event {
                StreamEvent::Diagnostic(diag) => Some(diag.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Block until `predicate` holds for the recorded events or `timeout`
    /// elapses. Returns whether it held.
    pub fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&[Recorded]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.lock();
        loop {
            if predicate(&events) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(events, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            events = guard;
        }
    }

    /// Block until at least `count` events were recorded.
    pub fn wait_for_len(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |events| events.len() >= count)
    }

    /// Block until a file event matching `predicate` was recorded.
    pub fn wait_for_file_event<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&FileEvent) -> bool,
    {
        self.wait_until(timeout, |events| {
            events
                .iter()
                .filter_map(|r| r.event.as_file())
                .any(&mut predicate)
        })
    }
}
