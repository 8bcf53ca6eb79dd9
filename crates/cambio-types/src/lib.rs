//! cambio-types: row values, row access, and the null-first value ordering.

pub mod ordering;
pub mod row;
pub mod value;

pub use ordering::natural_nulls_first;
pub use row::Row;
pub use value::{json_object_to_row, json_str_to_row, TypedValue};
