// src/watch/path_utils.rs

//! Utility functions for path handling in the synthesizer.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::fs::FileSystem;

/// Rebuild `path` from its components.
///
/// Drops trailing separators and `.` components, so `/a/b/` and `/a/b` key
/// the same snapshot entry.
pub fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

/// The longest root that contains `path` (a root contains itself).
pub fn root_of<'a>(roots: &'a [PathBuf], path: &Path) -> Option<&'a Path> {
    roots
        .iter()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.components().count())
        .map(PathBuf::as_path)
}

/// Resolve every root to its real path.
///
/// A root that cannot be resolved (it does not exist yet, or permissions)
/// is kept as given; seeding it will simply produce an empty listing.
pub fn canonical_roots(fs: &dyn FileSystem, roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut resolved: Vec<PathBuf> = Vec::with_capacity(roots.len());
    for root in roots {
        let real = match fs.canonicalize(root) {
            Ok(real) => real,
            Err(err) => {
                warn!(root = ?root, error = %err, "cannot resolve root; using it as given");
                normalize(root)
            }
        };
        if !resolved.contains(&real) {
            resolved.push(real);
        }
    }
    resolved
}
