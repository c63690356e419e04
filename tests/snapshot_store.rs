// tests/snapshot_store.rs
mod common;
use crate::common::{TestResult, init_tracing};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use treewatch::fs::mock::MockFileSystem;
use treewatch::watch::snapshot::{SnapshotStore, capture_listing};

fn tree() -> Result<MockFileSystem, Box<dyn std::error::Error>> {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("/r/top.txt", "t")?;
    fs.add_file("/r/a/one.txt", "1")?;
    fs.add_file("/r/a/b/two.txt", "2")?;
    fs.add_dir("/r/empty")?;
    fs.add_symlink("/r/link", "/r/a")?;
    Ok(fs)
}

#[test]
fn seed_visits_every_directory_once() -> TestResult {
    let fs = tree()?;
    let mut store = SnapshotStore::new();

    let visited = store.seed(&fs, Path::new("/r"));

    assert_eq!(visited, 4);
    assert_eq!(
        store.directories_under(Path::new("/r")),
        vec![
            PathBuf::from("/r"),
            PathBuf::from("/r/a"),
            PathBuf::from("/r/a/b"),
            PathBuf::from("/r/empty"),
        ]
    );
    let empty = store.get(Path::new("/r/empty")).ok_or("empty dir not seeded")?;
    assert!(empty.is_empty());
    Ok(())
}

#[test]
fn listing_records_symlinks_without_descending() -> TestResult {
    let fs = tree()?;
    let mut store = SnapshotStore::new();
    store.seed(&fs, Path::new("/r"));

    let root = store.get(Path::new("/r")).ok_or("root not seeded")?;
    let link = root.get(&OsString::from("link")).ok_or("link missing")?;
    assert!(!link.is_directory);
    assert!(!store.contains(Path::new("/r/link")));
    Ok(())
}

#[test]
fn forget_subtree_empties_listings_but_keeps_keys() -> TestResult {
    let fs = tree()?;
    let mut store = SnapshotStore::new();
    store.seed(&fs, Path::new("/r"));

    store.forget_subtree(Path::new("/r/a"));

    for dir in ["/r/a", "/r/a/b"] {
        let listing = store.get(Path::new(dir)).ok_or("key dropped")?;
        assert!(listing.is_empty(), "{dir} still has entries");
    }
    let root = store.get(Path::new("/r")).ok_or("root not seeded")?;
    assert_eq!(root.len(), 4);
    Ok(())
}

#[test]
fn replace_returns_the_previous_listing() -> TestResult {
    let fs = tree()?;
    let mut store = SnapshotStore::new();
    store.seed(&fs, Path::new("/r"));

    fs.add_file("/r/a/three.txt", "3")?;
    let fresh = capture_listing(&fs, Path::new("/r/a"));
    let old = store
        .replace(PathBuf::from("/r/a"), fresh)
        .ok_or("no previous listing")?;

    assert_eq!(old.len(), 2);
    assert_eq!(store.get(Path::new("/r/a")).map(|l| l.len()), Some(3));
    Ok(())
}

#[test]
fn capture_of_missing_directory_is_empty() -> TestResult {
    let fs = tree()?;

    assert!(capture_listing(&fs, Path::new("/r/nope")).is_empty());
    // A file is not a directory either.
    assert!(capture_listing(&fs, Path::new("/r/top.txt")).is_empty());
    Ok(())
}

#[test]
fn reseeding_replaces_stale_contents() -> TestResult {
    let fs = tree()?;
    let mut store = SnapshotStore::new();
    store.seed(&fs, Path::new("/r"));

    fs.remove("/r/a/b")?;
    fs.add_file("/r/a/c/new.txt", "n")?;
    store.seed(&fs, Path::new("/r/a"));

    // The vanished directory keeps an empty listing; the new one is seeded.
    assert_eq!(store.get(Path::new("/r/a/b")).map(|l| l.len()), Some(0));
    assert_eq!(store.get(Path::new("/r/a/c")).map(|l| l.len()), Some(1));
    Ok(())
}
