pub mod item_table;
pub mod wikifier;

pub use item_table::{
    ItemRow, ItemTable, ItemTableSnapshot, KeyShape, LookupKey, Overwrite, OverwriteReport,
};
pub use wikifier::{ContextRow, Wikifier, WikifierSource};
