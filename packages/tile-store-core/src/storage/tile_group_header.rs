//! Per-slot MVCC header of a tile group.
//!
//! Every field is an atomic so the transaction manager, readers walking a
//! version chain and the garbage collector can touch a slot without a lock.
//! `next` points at the newer version of the row, `prev` at the older one.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::indirection::IndirectionCellRef;
use super::item_pointer::{Cid, ItemPointer, Oid, TxnId, INVALID_TXN_ID, MAX_CID};

struct SlotHeader {
    txn_id: AtomicU64,
    begin_cid: AtomicU64,
    end_cid: AtomicU64,
    next: AtomicU64,
    prev: AtomicU64,
    indirection: ArcSwapOption<IndirectionCellRef>,
}

impl SlotHeader {
    fn new() -> Self {
        Self {
            txn_id: AtomicU64::new(INVALID_TXN_ID),
            begin_cid: AtomicU64::new(MAX_CID),
            end_cid: AtomicU64::new(MAX_CID),
            next: AtomicU64::new(ItemPointer::INVALID.pack()),
            prev: AtomicU64::new(ItemPointer::INVALID.pack()),
            indirection: ArcSwapOption::empty(),
        }
    }
}

/// Visibility header for every slot of one tile group plus its slot allocator.
pub struct TileGroupHeader {
    slots: Box<[SlotHeader]>,
    /// Next never-used slot; only increases and never passes capacity
    next_tuple_slot: AtomicU32,
}

impl TileGroupHeader {
    pub fn new(capacity: u32) -> Self {
        let slots = (0..capacity)
            .map(|_| SlotHeader::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            next_tuple_slot: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Returns `true` if `slot` addresses a slot of this header.
    pub fn contains(&self, slot: Oid) -> bool {
        (slot as usize) < self.slots.len()
    }

    /// Reserves the next unused slot with a bounded compare-and-swap.
    ///
    /// # Returns
    /// The slot offset, or `None` when the group is full.
    pub fn next_empty_tuple_slot(&self) -> Option<Oid> {
        let capacity = self.capacity();
        let mut current = self.next_tuple_slot.load(Ordering::Acquire);
        loop {
            if current >= capacity {
                return None;
            }
            match self.next_tuple_slot.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current),
                Err(actual) => current = actual,
            }
        }
    }

    /// Number of slots handed out by the allocator so far.
    pub fn next_tuple_slot(&self) -> Oid {
        self.next_tuple_slot.load(Ordering::Acquire).min(self.capacity())
    }

    fn slot(&self, slot: Oid) -> &SlotHeader {
        &self.slots[slot as usize]
    }

    pub fn transaction_id(&self, slot: Oid) -> TxnId {
        self.slot(slot).txn_id.load(Ordering::Acquire)
    }

    pub fn set_transaction_id(&self, slot: Oid, txn_id: TxnId) {
        self.slot(slot).txn_id.store(txn_id, Ordering::Release);
    }

    /// Swaps the owner from `expected` to `txn_id`.
    ///
    /// # Returns
    /// `true` if this call installed `txn_id`.
    pub fn set_atomic_transaction_id(&self, slot: Oid, expected: TxnId, txn_id: TxnId) -> bool {
        self.slot(slot)
            .txn_id
            .compare_exchange(expected, txn_id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn begin_commit_id(&self, slot: Oid) -> Cid {
        self.slot(slot).begin_cid.load(Ordering::Acquire)
    }

    pub fn set_begin_commit_id(&self, slot: Oid, cid: Cid) {
        self.slot(slot).begin_cid.store(cid, Ordering::Release);
    }

    pub fn end_commit_id(&self, slot: Oid) -> Cid {
        self.slot(slot).end_cid.load(Ordering::Acquire)
    }

    pub fn set_end_commit_id(&self, slot: Oid, cid: Cid) {
        self.slot(slot).end_cid.store(cid, Ordering::Release);
    }

    /// Newer version of the same row.
    pub fn next_item_pointer(&self, slot: Oid) -> ItemPointer {
        ItemPointer::unpack(self.slot(slot).next.load(Ordering::Acquire))
    }

    pub fn set_next_item_pointer(&self, slot: Oid, location: ItemPointer) {
        self.slot(slot).next.store(location.pack(), Ordering::Release);
    }

    /// Older version of the same row.
    pub fn prev_item_pointer(&self, slot: Oid) -> ItemPointer {
        ItemPointer::unpack(self.slot(slot).prev.load(Ordering::Acquire))
    }

    pub fn set_prev_item_pointer(&self, slot: Oid, location: ItemPointer) {
        self.slot(slot).prev.store(location.pack(), Ordering::Release);
    }

    pub fn indirection(&self, slot: Oid) -> Option<IndirectionCellRef> {
        self.slot(slot)
            .indirection
            .load_full()
            .map(|cell| cell.as_ref().clone())
    }

    pub fn set_indirection(&self, slot: Oid, cell: Option<IndirectionCellRef>) {
        self.slot(slot).indirection.store(cell.map(Arc::new));
    }

    /// Puts a slot back into its never-used state so it can be recycled.
    pub fn reset_slot(&self, slot: Oid) {
        let header = self.slot(slot);
        header.begin_cid.store(MAX_CID, Ordering::Release);
        header.end_cid.store(MAX_CID, Ordering::Release);
        header.next.store(ItemPointer::INVALID.pack(), Ordering::Release);
        header.prev.store(ItemPointer::INVALID.pack(), Ordering::Release);
        header.indirection.store(None);
        header.txn_id.store(INVALID_TXN_ID, Ordering::Release);
    }

    /// Slots below the allocation mark whose owner is not `INVALID_TXN_ID`.
    pub fn active_tuple_count(&self) -> usize {
        (0..self.next_tuple_slot())
            .filter(|&slot| self.transaction_id(slot) != INVALID_TXN_ID)
            .count()
    }
}

impl fmt::Debug for TileGroupHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileGroupHeader")
            .field("capacity", &self.capacity())
            .field("next_tuple_slot", &self.next_tuple_slot())
            .finish()
    }
}
