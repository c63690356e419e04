// src/watch/correlator.rs

//! Pairing of vanished and appeared names into moves.

use std::collections::HashMap;

/// Hands out move cookies.
///
/// Cookies start at 1 and grow by one per correlated move for the lifetime
/// of a synthesizer, so no two pairs ever share one.
#[derive(Debug, Default)]
pub struct Correlator {
    last_cookie: u64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_cookie(&mut self) -> u64 {
        self.last_cookie += 1;
        self.last_cookie
    }

    /// Number of cookies issued so far.
    pub fn issued(&self) -> u64 {
        self.last_cookie
    }
}

/// Vanished names of one directory pass, keyed by inode.
///
/// The value is the index of the placeholder `Deleted` event in the output
/// being built, which becomes `MovedFrom` if the inode reappears. Inode 0
/// means "unknown" and never matches.
#[derive(Debug, Default)]
pub struct DeleteTable {
    slots: HashMap<u64, usize>,
}

impl DeleteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, inode: u64, slot: usize) {
        if inode != 0 {
            self.slots.insert(inode, slot);
        }
    }

    /// Take the slot recorded for `inode`; each slot is claimed at most once.
    pub fn claim(&mut self, inode: u64) -> Option<usize> {
        if inode == 0 {
            return None;
        }
        self.slots.remove(&inode)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
