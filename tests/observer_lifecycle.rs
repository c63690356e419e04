// tests/observer_lifecycle.rs
//
// Observer end to end over a hand-driven source and the mock filesystem.
mod common;
use crate::common::{DEFAULT_WAIT, EventRecorder, TestResult, init_tracing, wait_for};

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use treewatch::errors::{Result as TwResult, TreewatchError};
use treewatch::events::{Diagnostic, FileEventKind, StreamEvent};
use treewatch::fs::mock::MockFileSystem;
use treewatch::observer::{Observer, ObserverOptions, ObserverState};
use treewatch::source::{
    CreateFlags, EventFlags, ManualSource, NotificationSource, WatchId, WatchRequest,
};
use treewatch::stream::{Stream, StreamOptions};

struct Harness {
    fs: MockFileSystem,
    source: Arc<ManualSource>,
    observer: Observer,
}

fn harness(process_asap: bool) -> Result<Harness, Box<dyn std::error::Error>> {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("/w/d/a.txt", "a")?;
    let source = Arc::new(ManualSource::new());
    let observer = Observer::with_backend(
        source.clone(),
        Arc::new(fs.clone()),
        ObserverOptions {
            process_asap,
            ..ObserverOptions::default()
        },
    );
    Ok(Harness {
        fs,
        source,
        observer,
    })
}

fn file_stream(recorder: &EventRecorder) -> TwResult<Stream> {
    Stream::new(
        recorder.callback(),
        ["/w"],
        StreamOptions::default().file_events(true),
    )
}

#[test]
fn scheduled_before_start_delivers_on_the_dispatch_thread() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;

    h.observer.schedule(&stream)?;
    assert_eq!(h.source.watch_count(), 0, "registered before start");
    h.observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));
    assert_eq!(h.observer.state(), ObserverState::Active);

    h.fs.add_file("/w/d/new.txt", "n")?;
    assert_eq!(h.source.emit([("/w/d", EventFlags::ITEM_CREATED)]), 1);

    assert!(recorder.wait_for_len(1, DEFAULT_WAIT));
    let recorded = recorder.recorded();
    let event = recorded[0].event.as_file().ok_or("expected a file event")?;
    assert_eq!(event.kind, FileEventKind::Created);
    assert_eq!(event.path, PathBuf::from("/w/d/new.txt"));
    assert_eq!(recorded[0].thread.as_deref(), Some("treewatch-dispatch"));

    h.observer.stop()?;
    Ok(())
}

#[test]
fn schedule_after_start_attaches_via_the_loop() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();

    h.observer.start()?;
    assert_eq!(h.observer.state(), ObserverState::Waiting);

    let stream = file_stream(&recorder)?;
    h.observer.schedule(&stream)?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));

    let second = file_stream(&recorder)?;
    h.observer.schedule(&second)?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 2));

    h.fs.write("/w/d/a.txt", "changed")?;
    assert_eq!(h.source.emit([("/w/d", EventFlags::ITEM_MODIFIED)]), 2);
    assert!(recorder.wait_for_len(2, DEFAULT_WAIT));
    assert!(
        recorder
            .file_events()
            .iter()
            .all(|e| e.kind == FileEventKind::Modified)
    );

    h.observer.stop()?;
    Ok(())
}

#[test]
fn process_asap_registers_before_schedule_returns() -> TestResult {
    let h = harness(true)?;
    let recorder = EventRecorder::new();

    h.observer.start()?;
    let stream = file_stream(&recorder)?;
    h.observer.schedule(&stream)?;

    assert_eq!(h.source.watch_count(), 1);
    assert_eq!(h.observer.state(), ObserverState::Active);

    h.fs.add_file("/w/d/asap.txt", "x")?;
    h.source.emit([("/w/d", EventFlags::ITEM_CREATED)]);
    assert!(recorder.wait_for_file_event(DEFAULT_WAIT, |e| {
        e.kind == FileEventKind::Created && e.path == PathBuf::from("/w/d/asap.txt")
    }));

    h.observer.stop()?;
    Ok(())
}

#[test]
fn lifecycle_misuse_is_reported() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;

    h.observer.schedule(&stream)?;
    assert!(matches!(
        h.observer.schedule(&stream),
        Err(TreewatchError::AlreadyScheduled(_))
    ));

    let unknown = file_stream(&recorder)?;
    assert!(matches!(
        h.observer.unschedule(&unknown),
        Err(TreewatchError::NotScheduled(_))
    ));

    h.observer.start()?;
    assert!(matches!(
        h.observer.start(),
        Err(TreewatchError::ProgrammerMisuse(_))
    ));

    h.observer.stop()?;
    assert!(matches!(
        h.observer.stop(),
        Err(TreewatchError::ProgrammerMisuse(_))
    ));
    assert!(matches!(
        h.observer.schedule(&unknown),
        Err(TreewatchError::ProgrammerMisuse(_))
    ));
    Ok(())
}

#[test]
fn stop_without_streams_cancels_the_parked_thread() -> TestResult {
    let h = harness(false)?;

    h.observer.start()?;
    h.observer.stop()?;

    assert_eq!(h.observer.state(), ObserverState::Stopped);
    Ok(())
}

#[test]
fn stop_before_start_needs_no_thread() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;
    h.observer.schedule(&stream)?;

    h.observer.stop()?;

    assert_eq!(h.observer.state(), ObserverState::Stopped);
    assert_eq!(h.source.watch_count(), 0);
    h.observer.unschedule(&stream)?;
    Ok(())
}

#[test]
fn unschedule_releases_the_watch_and_silences_the_stream() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;

    h.observer.schedule(&stream)?;
    h.observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));

    h.observer.unschedule(&stream)?;
    assert_eq!(h.source.watch_count(), 0);
    assert!(!h.observer.is_scheduled(&stream));

    h.fs.add_file("/w/d/late.txt", "l")?;
    assert_eq!(h.source.emit([("/w/d", EventFlags::ITEM_CREATED)]), 0);

    h.observer.stop()?;
    assert!(recorder.is_empty());
    Ok(())
}

#[test]
fn stop_tears_down_watches_and_unschedule_still_succeeds() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;

    h.observer.schedule(&stream)?;
    h.observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));

    h.observer.stop()?;
    assert_eq!(h.source.watch_count(), 0);
    assert!(h.observer.is_scheduled(&stream));

    h.observer.unschedule(&stream)?;
    assert!(!h.observer.is_scheduled(&stream));
    Ok(())
}

#[test]
fn dropping_a_running_observer_stops_it() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;

    h.observer.schedule(&stream)?;
    h.observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));

    let source = h.source.clone();
    drop(h);
    assert_eq!(source.watch_count(), 0);
    Ok(())
}

#[test]
fn stop_from_a_callback_does_not_deadlock() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/w")?;
    let source = Arc::new(ManualSource::new());
    let observer = Arc::new(Observer::with_backend(
        source.clone(),
        Arc::new(fs.clone()),
        ObserverOptions::default(),
    ));

    let slot: Arc<Mutex<Option<Arc<Observer>>>> = Arc::new(Mutex::new(None));
    let stream = {
        let slot = slot.clone();
        Stream::new(
            move |_event: StreamEvent| {
                let observer = slot.lock().ok().and_then(|mut s| s.take());
                if let Some(observer) = observer {
                    let _ = observer.stop();
                }
            },
            ["/w"],
            StreamOptions::default(),
        )?
    };
    *slot.lock().map_err(|e| e.to_string())? = Some(observer.clone());

    observer.schedule(&stream)?;
    observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || source.watch_count() == 1));

    source.emit([("/w", EventFlags::ITEM_CREATED)]);
    assert!(wait_for(DEFAULT_WAIT, || source.watch_count() == 0));
    assert_eq!(observer.state(), ObserverState::Stopped);
    Ok(())
}

#[test]
fn passthrough_stream_gets_raw_notifications_with_ids() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = Stream::new(
        recorder.callback(),
        ["/w"],
        StreamOptions::default().ids(true).raw_file_events(true),
    )?;

    h.observer.schedule(&stream)?;
    h.observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));
    assert_eq!(h.source.watch_flags(), vec![CreateFlags::FILE_EVENTS]);

    h.source.emit([
        ("/w/d/a.txt", EventFlags::ITEM_MODIFIED),
        ("/w/d/b.txt", EventFlags::ITEM_CREATED),
    ]);
    assert!(recorder.wait_for_len(2, DEFAULT_WAIT));

    let raw = recorder.raw_notifications();
    assert_eq!(raw[0].path, PathBuf::from("/w/d/a.txt"));
    assert_eq!(raw[0].flags, EventFlags::ITEM_MODIFIED);
    assert_eq!(raw[1].flags, EventFlags::ITEM_CREATED);
    assert!(raw[0].id.is_some());
    assert!(raw[0].id < raw[1].id);

    h.observer.stop()?;
    Ok(())
}

#[test]
fn synthesizing_stream_never_asks_for_file_granularity() -> TestResult {
    let h = harness(false)?;
    let recorder = EventRecorder::new();
    let stream = Stream::new(
        recorder.callback(),
        ["/w"],
        StreamOptions::default()
            .file_events(true)
            .raw_file_events(true),
    )?;

    h.observer.schedule(&stream)?;
    h.observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));
    assert_eq!(h.source.watch_flags(), vec![CreateFlags::empty()]);
    assert_eq!(h.source.watched_roots(), vec![vec![PathBuf::from("/w")]]);

    h.observer.stop()?;
    Ok(())
}

/// A source whose registrations always fail.
#[derive(Debug)]
struct RefusingSource;

impl NotificationSource for RefusingSource {
    fn register_watch(&self, _request: WatchRequest) -> TwResult<WatchId> {
        Err(TreewatchError::InvalidConfiguration("no watches today".to_string()))
    }

    fn deregister_watch(&self, _watch: WatchId) -> TwResult<()> {
        Ok(())
    }
}

#[test]
fn registration_failure_reaches_the_callback() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/w")?;
    let observer = Observer::with_backend(
        Arc::new(RefusingSource),
        Arc::new(fs),
        ObserverOptions::default(),
    );
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;

    observer.schedule(&stream)?;
    observer.start()?;

    assert!(recorder.wait_for_len(1, DEFAULT_WAIT));
    assert!(matches!(
        recorder.diagnostics().as_slice(),
        [Diagnostic::WatchFailed { reason }] if reason.contains("no watches today")
    ));

    observer.stop()?;
    Ok(())
}

#[test]
fn process_asap_registration_failure_is_returned_to_the_caller() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/w")?;
    let observer = Observer::with_backend(
        Arc::new(RefusingSource),
        Arc::new(fs),
        ObserverOptions {
            process_asap: true,
            ..ObserverOptions::default()
        },
    );
    let recorder = EventRecorder::new();
    let stream = file_stream(&recorder)?;

    observer.start()?;
    assert!(matches!(
        observer.schedule(&stream),
        Err(TreewatchError::InvalidConfiguration(_))
    ));
    assert!(!observer.is_scheduled(&stream));
    // Nothing got attached, so the dispatch thread keeps waiting.
    assert_eq!(observer.state(), ObserverState::Waiting);

    observer.stop()?;
    Ok(())
}

#[test]
fn rescheduling_while_the_loop_is_busy_registers_once() -> TestResult {
    let h = harness(false)?;

    // A stream whose first callback holds the dispatch thread until released.
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let mut release = Some(release_rx);
    let blocker = Stream::new(
        move |_event: StreamEvent| {
            if let Some(release) = release.take() {
                let _ = entered_tx.send(());
                let _ = release.recv_timeout(DEFAULT_WAIT);
            }
        },
        ["/w"],
        StreamOptions::default(),
    )?;
    h.observer.schedule(&blocker)?;
    h.observer.start()?;
    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 1));

    h.source.emit([("/w", EventFlags::ITEM_CREATED)]);
    entered_rx.recv_timeout(DEFAULT_WAIT)?;

    // The loop is stuck in the callback, so all three requests queue up.
    let recorder = EventRecorder::new();
    let stream = Stream::new(recorder.callback(), ["/w"], StreamOptions::default())?;
    h.observer.schedule(&stream)?;
    h.observer.unschedule(&stream)?;
    h.observer.schedule(&stream)?;
    release_tx.send(())?;

    assert!(wait_for(DEFAULT_WAIT, || h.source.watch_count() == 2));
    assert_eq!(h.source.emit([("/w", EventFlags::ITEM_MODIFIED)]), 2);
    assert!(recorder.wait_for_len(1, DEFAULT_WAIT));

    h.observer.stop()?;
    assert_eq!(recorder.len(), 1, "events: {:?}", recorder.events());
    assert_eq!(h.source.watch_count(), 0, "a watch outlived stop");
    Ok(())
}
