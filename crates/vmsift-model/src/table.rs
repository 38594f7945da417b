use crate::FieldValue;

/// An ordered table of inventory records sharing one column set.
///
/// Rows are stored row-major in first-appearance order; filtering and report
/// rendering both rely on that order staying stable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

impl Table {
    /// Create an empty table with the given column names, in order.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a record. Rows shorter than the column set are padded with
    /// [`FieldValue::Null`]; callers must not pass rows wider than the
    /// column set.
    pub fn push_row(&mut self, mut row: Vec<FieldValue>) {
        debug_assert!(row.len() <= self.columns.len());
        if row.len() < self.columns.len() {
            row.resize(self.columns.len(), FieldValue::Null);
        }
        self.rows.push(row);
    }

    /// Column names, in source order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records, in source order. Every row has exactly one value per column.
    pub fn rows(&self) -> &[Vec<FieldValue>] {
        &self.rows
    }

    /// Number of records (the header is not a record).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the named column, if present. Names match exactly.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&FieldValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn value_mut(&mut self, row: usize, column: usize) -> Option<&mut FieldValue> {
        self.rows.get_mut(row).and_then(|r| r.get_mut(column))
    }
}
