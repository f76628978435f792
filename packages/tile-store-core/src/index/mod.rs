//! Ordered in-memory indexes mapping key values to indirection cells.

#[allow(clippy::module_inception)]
mod index;

pub use index::{Index, IndexConstraintType, IndexMetadata};
