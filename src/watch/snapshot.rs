// src/watch/snapshot.rs

//! Last-known directory listings.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::fs::{FileSystem, StatRecord};

/// Entry name -> metadata, ordered by name so diffs are deterministic.
pub type Listing = BTreeMap<OsString, StatRecord>;

/// Read the current listing of `dir`.
///
/// An unreadable directory (vanished, permission denied) lists as empty,
/// and an entry that disappears between listing and stat is left out.
pub fn capture_listing(fs: &dyn FileSystem, dir: &Path) -> Listing {
    let names = match fs.read_dir(dir) {
        Ok(names) => names,
        Err(err) => {
            debug!(dir = ?dir, error = %err, "listing failed; treating as empty");
            return Listing::new();
        }
    };

    let mut listing = Listing::new();
    for name in names {
        let path = dir.join(&name);
        match fs.lstat(&path) {
            Ok(stat) => {
                listing.insert(name, stat);
            }
            Err(err) => trace!(path = ?path, error = %err, "stat failed; entry skipped"),
        }
    }
    listing
}

/// Map from absolute directory path to its last-known [`Listing`].
///
/// Every directory under a seeded root has an entry, possibly empty.
/// Entries are never removed: a directory that went away keeps its stale
/// listing (so a late diff still reports its children as deleted), and a
/// directory that moved away has its listings emptied by
/// [`forget_subtree`](SnapshotStore::forget_subtree).
#[derive(Debug, Default)]
pub struct SnapshotStore {
    listings: HashMap<PathBuf, Listing>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `root` and record a listing for it and every directory below.
    ///
    /// Symlinks are recorded but never descended into. Listings previously
    /// held for directories under `root` are emptied first, then overwritten
    /// by what the walk finds. Returns the number of directories visited.
    pub fn seed(&mut self, fs: &dyn FileSystem, root: &Path) -> usize {
        self.forget_subtree(root);

        let mut visited = 0;
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let listing = capture_listing(fs, &dir);
            for (name, stat) in &listing {
                if stat.is_directory {
                    stack.push(dir.join(name));
                }
            }
            self.listings.insert(dir, listing);
            visited += 1;
        }

        debug!(root = ?root, directories = visited, "seeded snapshot");
        visited
    }

    pub fn get(&self, dir: &Path) -> Option<&Listing> {
        self.listings.get(dir)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.listings.contains_key(dir)
    }

    /// Store `listing` as the new baseline for `dir`, returning the old one.
    pub fn replace(&mut self, dir: PathBuf, listing: Listing) -> Option<Listing> {
        self.listings.insert(dir, listing)
    }

    /// Empty the listings of `dir` and every known directory below it.
    ///
    /// The keys stay, so later notifications for those paths still diff
    /// (against nothing) instead of hitting an unseeded directory.
    pub fn forget_subtree(&mut self, dir: &Path) {
        for (path, listing) in self.listings.iter_mut() {
            if path.starts_with(dir) {
                listing.clear();
            }
        }
    }

    /// Known directories at or below `dir`, sorted.
    pub fn directories_under(&self, dir: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .listings
            .keys()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect();
        dirs.sort();
        dirs
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}
