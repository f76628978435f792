//! Physical tuple addresses and the id sentinels used by the version headers.

use std::fmt;

/// Object id for tables, indexes, tile groups and indirection arrays.
pub type Oid = u32;

/// Marks an unused oid; also the "group is full" signal of slot allocators.
pub const INVALID_OID: Oid = u32::MAX;

/// Transaction id stored in a tuple header.
pub type TxnId = u64;

/// Slot is free, reset, or belonged to an aborted transaction.
pub const INVALID_TXN_ID: TxnId = 0;

/// Version is committed and not owned by any transaction.
pub const INITIAL_TXN_ID: TxnId = 1;

/// Commit id stored in a tuple header.
pub type Cid = u64;

/// Version not yet committed (begin) or not yet ended (end).
pub const MAX_CID: Cid = u64::MAX;

/// End commit id of a delete tombstone.
pub const INVALID_CID: Cid = 0;

/// `{block, offset}` address of a physical tuple slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPointer {
    /// Tile group id
    pub block: Oid,
    /// Slot within the tile group
    pub offset: Oid,
}

impl ItemPointer {
    pub const INVALID: ItemPointer = ItemPointer {
        block: INVALID_OID,
        offset: INVALID_OID,
    };

    pub const fn new(block: Oid, offset: Oid) -> Self {
        Self { block, offset }
    }

    /// Returns `true` if either half is the invalid oid.
    pub fn is_null(&self) -> bool {
        self.block == INVALID_OID || self.offset == INVALID_OID
    }

    /// Packs the pointer into a single word for atomic storage.
    pub fn pack(&self) -> u64 {
        ((self.block as u64) << 32) | self.offset as u64
    }

    pub fn unpack(word: u64) -> Self {
        Self {
            block: (word >> 32) as Oid,
            offset: (word & 0xFFFF_FFFF) as Oid,
        }
    }
}

impl Default for ItemPointer {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for ItemPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "(invalid)")
        } else {
            write!(f, "({}, {})", self.block, self.offset)
        }
    }
}
