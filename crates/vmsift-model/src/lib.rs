//! `vmsift-model` defines the in-memory inventory table model.
//!
//! The crate is intentionally self-contained so it can be reused by:
//! - the report rendering layer (`vmsift-xlsx`)
//! - the run pipeline (`vmsift-report`)
//! - tests, which build tables directly without going through CSV

mod classify;
mod filter;
pub mod import;
mod table;
mod value;

pub use classify::software_field_contains;
pub use filter::{filter_inventory, MissingColumnError};
pub use import::{import_csv_table, import_csv_table_with, CsvImportError, CsvOptions};
pub use table::Table;
pub use value::FieldValue;
