// src/source/flags.rs

//! Bit flags exchanged with notification sources.
//!
//! Values follow the FSEvents constants so that flags recorded from one
//! backend can be compared against logs from another.

use bitflags::bitflags;

bitflags! {
    /// Per-notification hints. Coalesced and unreliable: the synthesizer only
    /// uses the item-level bits to cross-check what it observed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u32 {
        const MUST_SCAN_SUBDIRS    = 0x0000_0001;
        const USER_DROPPED         = 0x0000_0002;
        const KERNEL_DROPPED       = 0x0000_0004;
        const EVENT_IDS_WRAPPED    = 0x0000_0008;
        const HISTORY_DONE         = 0x0000_0010;
        const ROOT_CHANGED         = 0x0000_0020;
        const MOUNT                = 0x0000_0040;
        const UNMOUNT              = 0x0000_0080;
        const ITEM_CREATED         = 0x0000_0100;
        const ITEM_REMOVED         = 0x0000_0200;
        const ITEM_INODE_META_MOD  = 0x0000_0400;
        const ITEM_RENAMED         = 0x0000_0800;
        const ITEM_MODIFIED        = 0x0000_1000;
        const ITEM_FINDER_INFO_MOD = 0x0000_2000;
        const ITEM_CHANGE_OWNER    = 0x0000_4000;
        const ITEM_XATTR_MOD       = 0x0000_8000;
        const ITEM_IS_FILE         = 0x0001_0000;
        const ITEM_IS_DIR          = 0x0002_0000;
        const ITEM_IS_SYMLINK      = 0x0004_0000;
    }
}

impl EventFlags {
    /// The source lost notifications somewhere under this path.
    pub fn is_dropped(self) -> bool {
        self.intersects(EventFlags::USER_DROPPED | EventFlags::KERNEL_DROPPED)
    }

    /// Any bit that hints at metadata-only changes.
    pub fn is_metadata(self) -> bool {
        self.intersects(
            EventFlags::ITEM_INODE_META_MOD
                | EventFlags::ITEM_CHANGE_OWNER
                | EventFlags::ITEM_XATTR_MOD
                | EventFlags::ITEM_FINDER_INFO_MOD,
        )
    }
}

bitflags! {
    /// Options passed to the source when a stream is registered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CreateFlags: u32 {
        /// Deliver the first change after a quiet period immediately.
        const NO_DEFER    = 0x0000_0002;
        /// Report moves/deletes of the watched roots themselves.
        const WATCH_ROOT  = 0x0000_0004;
        const IGNORE_SELF = 0x0000_0008;
        /// File-granular notifications instead of parent directories.
        const FILE_EVENTS = 0x0000_0010;
    }
}
