//! Delimited-text inventory import.
//!
//! The header row fixes the column names and count; data rows become
//! [`Table`] records with each field resolved to a [`FieldValue`] variant.

use std::io::BufRead;

use csv::ByteRecord;
use thiserror::Error;

use crate::{FieldValue, Table};

/// Options for delimited-text inventory import.
#[derive(Clone, Debug)]
pub struct CsvOptions {
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

#[derive(Debug, Error)]
pub enum CsvImportError {
    #[error("csv input was empty")]
    EmptyInput,
    #[error("csv parse error at row {row}, column {column}: {reason}")]
    Parse {
        row: u64,
        column: u64,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Import a CSV stream into a [`Table`] using the default comma delimiter.
pub fn import_csv_table<R: BufRead>(reader: R) -> Result<Table, CsvImportError> {
    import_csv_table_with(reader, CsvOptions::default())
}

/// Import a CSV stream into a [`Table`].
///
/// The first record is the header row. Data rows shorter than the header are
/// padded with [`FieldValue::Null`]; rows with more fields than the header
/// are rejected with the offending row number.
pub fn import_csv_table_with<R: BufRead>(
    reader: R,
    options: CsvOptions,
) -> Result<Table, CsvImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        // Headers are read manually so error locations use consistent row numbers.
        .has_headers(false)
        // Accept rows with varying field counts; arity is checked against the
        // header below so the error can name the offending row.
        .flexible(true)
        .from_reader(reader);

    let mut record = ByteRecord::new();
    let mut record_index: u64 = 0;

    let has_header = csv_reader
        .read_byte_record(&mut record)
        .map_err(|e| map_csv_error(e, record_index + 1))?;
    if !has_header {
        return Err(CsvImportError::EmptyInput);
    }
    record_index += 1;

    let mut columns = Vec::with_capacity(record.len());
    for (idx, field) in record.iter().enumerate() {
        columns.push(decode_field(field, record_index, idx as u64 + 1)?.to_string());
    }

    let mut table = Table::new(columns);
    loop {
        record.clear();
        match csv_reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                record_index += 1;
                let width = table.columns().len();
                if record.len() > width {
                    return Err(CsvImportError::Parse {
                        row: record_index,
                        column: width as u64 + 1,
                        reason: format!(
                            "row has {} fields but the header declares {} columns",
                            record.len(),
                            width
                        ),
                    });
                }
                let mut row = Vec::with_capacity(width);
                for (idx, field) in record.iter().enumerate() {
                    let text = decode_field(field, record_index, idx as u64 + 1)?;
                    row.push(parse_field(text));
                }
                table.push_row(row);
            }
            Err(e) => return Err(map_csv_error(e, record_index + 1)),
        }
    }

    Ok(table)
}

/// Resolve one raw CSV field into its [`FieldValue`] variant.
///
/// Typing is literal: a field only becomes numeric when the number's
/// canonical rendering reproduces the source text, so values like `007` or
/// `1e3` survive as text exactly as encoded.
fn parse_field(text: &str) -> FieldValue {
    if text.is_empty() {
        return FieldValue::Null;
    }
    if let Ok(i) = text.parse::<i64>() {
        if i.to_string() == text {
            return FieldValue::Int(i);
        }
    }
    if let Ok(n) = text.parse::<f64>() {
        if n.to_string() == text {
            return FieldValue::Number(n);
        }
    }
    FieldValue::Text(text.to_string())
}

fn decode_field<'a>(field: &'a [u8], row: u64, column: u64) -> Result<&'a str, CsvImportError> {
    // Handle a UTF-8 BOM at the start of the file. This commonly appears in
    // Excel-exported CSVs.
    let field = if row == 1 && column == 1 && field.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &field[3..]
    } else {
        field
    };
    std::str::from_utf8(field).map_err(|e| CsvImportError::Parse {
        row,
        column,
        reason: format!("invalid UTF-8: {e}"),
    })
}

fn map_csv_error(err: csv::Error, fallback_row: u64) -> CsvImportError {
    let reason = err.to_string();
    let pos = err.position().cloned();

    match err.into_kind() {
        csv::ErrorKind::Io(e) => CsvImportError::Io(e),
        _ => {
            let row = pos
                .map(|p| p.record())
                .filter(|r| *r > 0)
                .unwrap_or(fallback_row);
            CsvImportError::Parse {
                row,
                column: 0,
                reason,
            }
        }
    }
}
