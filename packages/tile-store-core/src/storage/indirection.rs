//! Indirection arrays: pools of stable cells that index entries point at.
//!
//! A cell's identity `(array_id, offset)` never changes once handed out; only
//! its content, the location of the newest tuple version, is swapped when a
//! new version is installed. Index entries therefore survive non-key updates
//! untouched.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::item_pointer::{ItemPointer, Oid, INVALID_OID};

/// Fixed-capacity pool of indirection cells.
pub struct IndirectionArray {
    id: Oid,
    cells: Box<[AtomicU64]>,
    next_slot: AtomicU32,
}

impl IndirectionArray {
    /// Creates an array with every cell pointing nowhere.
    pub fn new(id: Oid, capacity: u32) -> Self {
        let invalid = ItemPointer::INVALID.pack();
        let cells = (0..capacity)
            .map(|_| AtomicU64::new(invalid))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            id,
            cells,
            next_slot: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> Oid {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.cells.len() as u32
    }

    /// Reserves the next cell.
    ///
    /// # Returns
    /// The cell offset, or `None` once every cell has been handed out.
    pub fn allocate_indirection(&self) -> Option<Oid> {
        let capacity = self.capacity();
        let mut current = self.next_slot.load(Ordering::Acquire);
        loop {
            if current >= capacity {
                return None;
            }
            match self.next_slot.compare_exchange_weak(
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

    /// Number of cells handed out so far.
    pub fn allocated_count(&self) -> u32 {
        self.next_slot.load(Ordering::Acquire).min(self.capacity())
    }

    /// Returns `true` once the last cell has been handed out.
    pub fn is_sealed(&self) -> bool {
        self.next_slot.load(Ordering::Acquire) >= self.capacity()
    }

    fn load(&self, offset: Oid) -> ItemPointer {
        self.cells
            .get(offset as usize)
            .map(|cell| ItemPointer::unpack(cell.load(Ordering::Acquire)))
            .unwrap_or(ItemPointer::INVALID)
    }

    fn store(&self, offset: Oid, location: ItemPointer) {
        if let Some(cell) = self.cells.get(offset as usize) {
            cell.store(location.pack(), Ordering::Release);
        }
    }
}

impl fmt::Debug for IndirectionArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndirectionArray")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated_count())
            .finish()
    }
}

/// Handle to one indirection cell.
///
/// Cloning the handle keeps the owning array alive; equality and hashing use
/// the cell's stable identity, never its content.
#[derive(Clone)]
pub struct IndirectionCellRef {
    array: Arc<IndirectionArray>,
    offset: Oid,
}

impl IndirectionCellRef {
    /// Resolves a handle for `offset` of `array`.
    ///
    /// # Returns
    /// `None` if the offset is outside the array.
    pub fn new(array: Arc<IndirectionArray>, offset: Oid) -> Option<Self> {
        if offset == INVALID_OID || offset >= array.capacity() {
            return None;
        }
        Some(Self { array, offset })
    }

    pub fn array_id(&self) -> Oid {
        self.array.id()
    }

    pub fn offset(&self) -> Oid {
        self.offset
    }

    /// Current location of the newest version reachable through this cell.
    pub fn location(&self) -> ItemPointer {
        self.array.load(self.offset)
    }

    /// Points the cell at a new version.
    pub fn set_location(&self, location: ItemPointer) {
        self.array.store(self.offset, location);
    }

    /// Points the cell nowhere; index scans treat it as a dead entry.
    pub fn invalidate(&self) {
        self.set_location(ItemPointer::INVALID);
    }
}

impl PartialEq for IndirectionCellRef {
    fn eq(&self, other: &Self) -> bool {
        self.array_id() == other.array_id() && self.offset == other.offset
    }
}

impl Eq for IndirectionCellRef {}

impl std::hash::Hash for IndirectionCellRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.array_id().hash(state);
        self.offset.hash(state);
    }
}

impl fmt::Debug for IndirectionCellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cell[{}:{}] -> {}",
            self.array_id(),
            self.offset,
            self.location()
        )
    }
}
