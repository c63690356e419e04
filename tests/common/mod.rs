#![allow(dead_code)]

use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use treewatch::events::{FileEvent, FileEventKind};
use treewatch::source::{EventFlags, RawBatch, RawNotification};

pub use treewatch_test_utils::builders;
pub use treewatch_test_utils::{DEFAULT_WAIT, EventRecorder, init_tracing};

pub type TestResult = Result<(), Box<dyn Error>>;

/// A batch naming `paths` with no flags, the common case.
pub fn batch<I, P>(paths: I) -> RawBatch
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths
        .into_iter()
        .map(|path| RawNotification::new(path, EventFlags::empty()))
        .collect()
}

/// A batch with explicit flags per path.
pub fn flagged<I, P>(entries: I) -> RawBatch
where
    I: IntoIterator<Item = (P, EventFlags)>,
    P: Into<PathBuf>,
{
    entries
        .into_iter()
        .map(|(path, flags)| RawNotification::new(path, flags))
        .collect()
}

/// `(kind, path)` pairs, the shape most assertions care about.
pub fn kinds(events: &[FileEvent]) -> Vec<(FileEventKind, PathBuf)> {
    events.iter().map(|e| (e.kind, e.path.clone())).collect()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
