// src/fs/mod.rs

//! Filesystem access used by the snapshot/diff engine.
//!
//! Everything the synthesizer learns about the tree goes through the
//! [`FileSystem`] trait so that the diff logic can be exercised against the
//! in-memory [`mock::MockFileSystem`] with fully deterministic timestamps and
//! inode numbers.

use std::ffi::OsString;
use std::fmt::Debug;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

pub mod mock;

/// A point in time with nanosecond precision, as reported by `stat`.
///
/// Kept as plain seconds + nanoseconds (rather than `SystemTime`) because the
/// change time (`st_ctime`) has no `std` accessor and the mock filesystem
/// needs to hand out logical ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, d.subsec_nanos()),
            Err(err) => {
                let d = err.duration();
                if d.subsec_nanos() == 0 {
                    Self::new(-(d.as_secs() as i64), 0)
                } else {
                    Self::new(-(d.as_secs() as i64) - 1, 1_000_000_000 - d.subsec_nanos())
                }
            }
        }
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }
}

/// Per-entry metadata captured at snapshot time.
///
/// Captured with `lstat` semantics: a symlink is recorded as itself and is
/// never treated as a directory, so seeding cannot loop through links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
    pub inode: u64,
    pub modify_time: Timestamp,
    pub change_time: Timestamp,
    pub is_directory: bool,
}

impl StatRecord {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            inode: meta.ino(),
            modify_time: Timestamp::new(meta.mtime(), meta.mtime_nsec() as u32),
            change_time: Timestamp::new(meta.ctime(), meta.ctime_nsec() as u32),
            is_directory: meta.is_dir(),
        }
    }

    /// Without inode numbers rename correlation is disabled (inode `0`) and
    /// the change time falls back to the modify time.
    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let modify_time = meta
            .modified()
            .map(Timestamp::from_system_time)
            .unwrap_or_default();
        Self {
            inode: 0,
            modify_time,
            change_time: modify_time,
            is_directory: meta.is_dir(),
        }
    }
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Names of the entries directly inside `path` (no `.`/`..`).
    fn read_dir(&self, path: &Path) -> Result<Vec<OsString>>;

    /// Stat `path` without following a trailing symlink.
    fn lstat(&self, path: &Path) -> Result<StatRecord>;

    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<OsString>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry.with_context(|| format!("reading entry in {:?}", path))?;
            names.push(entry.file_name());
        }
        Ok(names)
    }

    fn lstat(&self, path: &Path) -> Result<StatRecord> {
        let meta = fs::symlink_metadata(path).with_context(|| format!("stat {:?}", path))?;
        Ok(StatRecord::from_metadata(&meta))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }
}
