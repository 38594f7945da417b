use thiserror::Error;

use crate::{software_field_contains, FieldValue, Table};

/// Returned when a stage expects a column the inventory table does not have.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("column {column:?} not found in inventory table")]
pub struct MissingColumnError {
    pub column: String,
}

/// Select the records whose software-inventory field indicates `engine_name`
/// is installed.
///
/// Copy-and-select: survivors keep their original order and full column set,
/// and the input table is left untouched. Filtering an already-filtered
/// table with the same arguments returns an identical table.
pub fn filter_inventory(
    table: &Table,
    software_column: &str,
    engine_name: &str,
) -> Result<Table, MissingColumnError> {
    let column = table
        .column_index(software_column)
        .ok_or_else(|| MissingColumnError {
            column: software_column.to_string(),
        })?;

    let mut filtered = Table::new(table.columns().to_vec());
    for row in table.rows() {
        let field = row.get(column).unwrap_or(&FieldValue::Null);
        if software_field_contains(field, engine_name) {
            filtered.push_row(row.clone());
        }
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_column_is_reported_by_name() {
        let table = Table::new(vec!["VMName".to_string()]);
        let err = filter_inventory(&table, "SQLSoftware", "Microsoft SQL Server").unwrap_err();
        assert_eq!(err.column, "SQLSoftware");
        assert_eq!(
            err.to_string(),
            "column \"SQLSoftware\" not found in inventory table"
        );
    }

    #[test]
    fn filtering_an_empty_table_yields_an_empty_table() {
        let table = Table::new(vec!["SQLSoftware".to_string()]);
        let filtered = filter_inventory(&table, "SQLSoftware", "Microsoft SQL Server").unwrap();
        assert!(filtered.is_empty());
        assert_eq!(filtered.columns(), table.columns());
    }
}
