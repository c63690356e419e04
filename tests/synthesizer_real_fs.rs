// tests/synthesizer_real_fs.rs
mod common;
use crate::common::{TestResult, batch, init_tracing, kinds};

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use filetime::{FileTime, set_file_mtime};
use tempfile::TempDir;
use treewatch::events::FileEventKind;
use treewatch::fs::RealFileSystem;
use treewatch::watch::EventSynthesizer;

/// Temp root (canonical, so paths compare on macOS too) with `d/a.txt`.
fn setup() -> Result<(TempDir, PathBuf, EventSynthesizer), Box<dyn std::error::Error>> {
    init_tracing();
    let tmp = TempDir::new()?;
    let root = fs::canonicalize(tmp.path())?;
    fs::create_dir(root.join("d"))?;
    fs::write(root.join("d/a.txt"), "a")?;
    let synth = EventSynthesizer::new(Arc::new(RealFileSystem), &[root.clone()]);
    Ok((tmp, root, synth))
}

#[test]
fn create_on_disk_is_reported_once() -> TestResult {
    let (_tmp, root, mut synth) = setup()?;
    let dir = root.join("d");

    fs::write(dir.join("new.txt"), "n")?;
    let events = synth.process(&batch([dir.clone()]));

    assert_eq!(kinds(&events), vec![(FileEventKind::Created, dir.join("new.txt"))]);
    Ok(())
}

#[test]
fn rename_on_disk_keeps_the_inode_and_pairs_up() -> TestResult {
    let (_tmp, root, mut synth) = setup()?;
    let dir = root.join("d");

    fs::rename(dir.join("a.txt"), dir.join("b.txt"))?;
    let events = synth.process(&batch([dir.clone()]));

    assert_eq!(
        kinds(&events),
        vec![
            (FileEventKind::MovedFrom, dir.join("a.txt")),
            (FileEventKind::MovedTo, dir.join("b.txt")),
        ]
    );
    assert!(events[0].cookie.is_some());
    assert_eq!(events[0].cookie, events[1].cookie);
    Ok(())
}

#[test]
fn changed_mtime_on_disk_is_modified() -> TestResult {
    let (_tmp, root, mut synth) = setup()?;
    let dir = root.join("d");

    set_file_mtime(dir.join("a.txt"), FileTime::from_unix_time(1_000_000, 0))?;
    let events = synth.process(&batch([dir.clone()]));

    assert_eq!(kinds(&events), vec![(FileEventKind::Modified, dir.join("a.txt"))]);
    Ok(())
}

#[test]
fn delete_on_disk_is_deleted() -> TestResult {
    let (_tmp, root, mut synth) = setup()?;
    let dir = root.join("d");

    fs::remove_file(dir.join("a.txt"))?;
    let events = synth.process(&batch([dir.clone()]));

    assert_eq!(kinds(&events), vec![(FileEventKind::Deleted, dir.join("a.txt"))]);
    Ok(())
}

#[test]
fn nested_directory_created_on_disk_is_tracked() -> TestResult {
    let (_tmp, root, mut synth) = setup()?;
    let dir = root.join("d");

    fs::create_dir_all(dir.join("n1/n2"))?;
    let events = synth.process(&batch([dir.clone()]));
    assert_eq!(kinds(&events), vec![(FileEventKind::Created, dir.join("n1"))]);
    assert!(events[0].is_dir);

    fs::write(dir.join("n1/n2/leaf.txt"), "leaf")?;
    let events = synth.process(&batch([dir.join("n1/n2")]));
    assert_eq!(
        kinds(&events),
        vec![(FileEventKind::Created, dir.join("n1/n2/leaf.txt"))]
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlinked_directory_is_not_followed() -> TestResult {
    let (_tmp, root, mut synth) = setup()?;
    let dir = root.join("d");

    std::os::unix::fs::symlink(&root, dir.join("loop"))?;
    let events = synth.process(&batch([dir.clone()]));

    assert_eq!(kinds(&events), vec![(FileEventKind::Created, dir.join("loop"))]);
    assert!(!events[0].is_dir);
    assert!(!synth.snapshots().contains(&dir.join("loop")));
    Ok(())
}
