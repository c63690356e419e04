// src/fs/mock.rs

use super::{FileSystem, StatRecord, Timestamp};
use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockKind {
    File(Vec<u8>),
    Dir(BTreeSet<OsString>), // Child names
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
pub struct MockEntry {
    pub kind: MockKind,
    pub inode: u64,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

#[derive(Debug)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    clock: i64,
    next_inode: u64,
}

impl MockState {
    /// Advance the logical clock; every mutation gets a distinct timestamp.
    fn tick(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp::new(self.clock, 0)
    }

    fn alloc_inode(&mut self) -> u64 {
        self.next_inode += 1;
        self.next_inode
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.entries.get(path),
            Some(MockEntry { kind: MockKind::Dir(_), .. })
        )
    }

    /// Link `name` into the parent's listing and bump the parent's times,
    /// the way a real directory changes when an entry is added.
    fn link_child(&mut self, path: &Path, now: Timestamp) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(parent) {
            if let MockKind::Dir(children) = &mut entry.kind {
                children.insert(name.to_os_string());
                entry.mtime = now;
                entry.ctime = now;
            }
        }
    }

    fn unlink_child(&mut self, path: &Path, now: Timestamp) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(parent) {
            if let MockKind::Dir(children) = &mut entry.kind {
                children.remove(name);
                entry.mtime = now;
                entry.ctime = now;
            }
        }
    }

    fn ensure_dir(&mut self, path: &Path) -> Result<()> {
        match self.entries.get(path) {
            Some(MockEntry { kind: MockKind::Dir(_), .. }) => return Ok(()),
            Some(_) => bail!("Not a directory: {:?}", path),
            None => {}
        }
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent)?;
        }
        let now = self.tick();
        let inode = self.alloc_inode();
        self.entries.insert(
            path.to_path_buf(),
            MockEntry {
                kind: MockKind::Dir(BTreeSet::new()),
                inode,
                mtime: now,
                ctime: now,
            },
        );
        self.link_child(path, now);
        Ok(())
    }

    fn insert_leaf(&mut self, path: &Path, kind: MockKind) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("Cannot create root: {:?}", path))?;
        self.ensure_dir(parent)?;
        let now = self.tick();
        let inode = self.alloc_inode();
        self.entries.insert(
            path.to_path_buf(),
            MockEntry {
                kind,
                inode,
                mtime: now,
                ctime: now,
            },
        );
        self.link_child(path, now);
        Ok(())
    }

    fn subtree_keys(&self, root: &Path) -> Vec<PathBuf> {
        self.entries
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect()
    }
}

/// In-memory filesystem with a logical clock.
///
/// Inodes are stable across renames and every mutation advances the clock,
/// so modify/change-time comparisons in tests never depend on the timestamp
/// granularity of the host filesystem.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut state = MockState {
            entries: HashMap::new(),
            clock: 0,
            next_inode: 0,
        };
        // Ensure root exists
        let now = state.tick();
        let inode = state.alloc_inode();
        state.entries.insert(
            PathBuf::from("/"),
            MockEntry {
                kind: MockKind::Dir(BTreeSet::new()),
                inode,
                mtime: now,
                ctime: now,
            },
        );

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `mkdir -p`.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        self.lock().ensure_dir(path.as_ref())
    }

    /// Create a file (parents are created implicitly), or overwrite an
    /// existing one in place, keeping its inode.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        if state.entries.contains_key(path) {
            drop(state);
            return self.write(path, content);
        }
        state.insert_leaf(path, MockKind::File(content.into()))
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) -> Result<()> {
        self.lock()
            .insert_leaf(path.as_ref(), MockKind::Symlink(target.into()))
    }

    /// Replace the content of an existing file; bumps modify and change time.
    pub fn write(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        let now = state.tick();
        match state.entries.get_mut(path) {
            Some(entry) => match &mut entry.kind {
                MockKind::File(data) => {
                    *data = content.into();
                    entry.mtime = now;
                    entry.ctime = now;
                    Ok(())
                }
                _ => bail!("Not a regular file: {:?}", path),
            },
            None => bail!("File not found: {:?}", path),
        }
    }

    /// Metadata-only change (chmod/chown/xattr): bumps the change time only.
    pub fn touch_metadata(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        let now = state.tick();
        match state.entries.get_mut(path) {
            Some(entry) => {
                entry.ctime = now;
                Ok(())
            }
            None => bail!("File not found: {:?}", path),
        }
    }

    /// Set the modify time explicitly (like `touch -m -d`), also bumping the
    /// change time as a real `utimes` does.
    pub fn set_mtime(&self, path: impl AsRef<Path>, mtime: Timestamp) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        let now = state.tick();
        match state.entries.get_mut(path) {
            Some(entry) => {
                entry.mtime = mtime;
                entry.ctime = now;
                Ok(())
            }
            None => bail!("File not found: {:?}", path),
        }
    }

    /// `rename(2)`: moves the entry and its whole subtree, keeping inodes.
    /// An existing non-directory target is replaced.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        let mut state = self.lock();
        if !state.entries.contains_key(from) {
            bail!("File not found: {:?}", from);
        }
        if to.starts_with(from) {
            bail!("Cannot move {:?} into itself ({:?})", from, to);
        }
        let to_parent = to
            .parent()
            .ok_or_else(|| anyhow!("Invalid rename target: {:?}", to))?;
        if !state.is_dir(to_parent) {
            bail!("Not a directory: {:?}", to_parent);
        }
        if state.is_dir(to) {
            bail!("Target is a directory: {:?}", to);
        }

        let now = state.tick();
        state.entries.remove(to);
        state.unlink_child(from, now);

        for old in state.subtree_keys(from) {
            if let Some(entry) = state.entries.remove(&old) {
                let suffix = old.strip_prefix(from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(suffix)
                };
                state.entries.insert(new, entry);
            }
        }
        if let Some(moved) = state.entries.get_mut(to) {
            moved.ctime = now;
        }
        state.link_child(to, now);
        Ok(())
    }

    /// `rm -r`.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.lock();
        if !state.entries.contains_key(path) {
            bail!("File not found: {:?}", path);
        }
        let now = state.tick();
        for key in state.subtree_keys(path) {
            state.entries.remove(&key);
        }
        state.unlink_child(path, now);
        Ok(())
    }

    pub fn inode_of(&self, path: impl AsRef<Path>) -> Option<u64> {
        self.lock().entries.get(path.as_ref()).map(|e| e.inode)
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.lock().entries.contains_key(path.as_ref())
    }
}

impl FileSystem for MockFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<OsString>> {
        let state = self.lock();
        match state.entries.get(path) {
            Some(MockEntry { kind: MockKind::Dir(children), .. }) => {
                Ok(children.iter().cloned().collect())
            }
            Some(_) => Err(anyhow!("Not a directory: {:?}", path)),
            None => Err(anyhow!("Directory not found: {:?}", path)),
        }
    }

    fn lstat(&self, path: &Path) -> Result<StatRecord> {
        let state = self.lock();
        match state.entries.get(path) {
            Some(entry) => Ok(StatRecord {
                inode: entry.inode,
                modify_time: entry.mtime,
                change_time: entry.ctime,
                is_directory: matches!(entry.kind, MockKind::Dir(_)),
            }),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // Symlinks are not resolved; tests use absolute, link-free roots.
        if self.lock().entries.contains_key(path) {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("File not found: {:?}", path))
        }
    }
}
