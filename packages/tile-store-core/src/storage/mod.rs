//! Physical storage: tile groups, their MVCC headers and indirection cells.

mod indirection;
mod item_pointer;
mod locator;
mod tile;
mod tile_group;
mod tile_group_header;

pub use indirection::{IndirectionArray, IndirectionCellRef};
pub use item_pointer::{
    Cid, ItemPointer, Oid, TxnId, INITIAL_TXN_ID, INVALID_CID, INVALID_OID, INVALID_TXN_ID,
    MAX_CID,
};
pub use locator::TileGroupLocator;
pub use tile::Tile;
pub use tile_group::{LayoutType, TileGroup};
pub use tile_group_header::TileGroupHeader;
