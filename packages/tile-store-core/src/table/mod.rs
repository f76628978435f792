//! Data tables, their foreign keys and tuple validation.

mod foreign_key;
#[allow(clippy::module_inception)]
mod table;
pub(crate) mod validation;

pub use foreign_key::{FkAction, ForeignKey};
pub use table::DataTable;
