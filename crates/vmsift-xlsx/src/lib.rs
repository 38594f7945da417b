//! `vmsift-xlsx` renders a filtered inventory table into a styled XLSX
//! report.
//!
//! Rendering is split into two independent steps:
//! 1. [`rewrite_identifier_column`] turns the identifier column into exact
//!    decimal text so spreadsheet numeric handling can never mangle large
//!    account identifiers.
//! 2. [`write_report_xlsx`] serializes the table into a single-sheet
//!    workbook with an emphasized header row and length-capped column
//!    widths.

use std::io::{Cursor, Write};

use thiserror::Error;
use vmsift_model::{FieldValue, Table};
use zip::write::FileOptions;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("identifier value {value:?} in data row {row} has no exact decimal form")]
    NonDecimalIdentifier { row: usize, value: String },
}

/// Report rendering options.
#[derive(Clone, Debug)]
pub struct ReportOptions {
    /// Worksheet tab name.
    pub sheet_name: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            sheet_name: "SQL Servers".to_string(),
        }
    }
}

/// Widths are sized to content but never wider than this many characters, so
/// one outlier value cannot produce an unusable sheet.
const MAX_COLUMN_WIDTH: usize = 50;

/// Rewrite the named identifier column so every numeric value becomes exact
/// decimal text.
///
/// `Int` values format directly; integral `Number` values take an
/// exponent-free integer path; `Null` stays null and text passes through
/// untouched. A non-integral or non-finite number in the identifier column
/// is an error rather than a silently lossy rendering. Tables without the
/// named column are returned unchanged; no other column is touched.
pub fn rewrite_identifier_column(table: &Table, column: &str) -> Result<Table, FormatError> {
    let mut rewritten = table.clone();
    let Some(col) = rewritten.column_index(column) else {
        return Ok(rewritten);
    };

    for row in 0..rewritten.row_count() {
        let value = rewritten
            .value(row, col)
            .cloned()
            .unwrap_or(FieldValue::Null);
        let text = match value {
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Number(n) => {
                identifier_decimal_text(n).ok_or_else(|| FormatError::NonDecimalIdentifier {
                    row: row + 1,
                    value: n.to_string(),
                })?
            }
            FieldValue::Null | FieldValue::Text(_) | FieldValue::List(_) => continue,
        };
        if let Some(slot) = rewritten.value_mut(row, col) {
            *slot = FieldValue::Text(text);
        }
    }
    Ok(rewritten)
}

/// Exact decimal rendering of an integral f64, with no exponent notation.
fn identifier_decimal_text(n: f64) -> Option<String> {
    if !n.is_finite() || n.fract() != 0.0 {
        return None;
    }
    // Integral f64 values in i128 range convert exactly.
    if n < i128::MIN as f64 || n >= i128::MAX as f64 {
        return None;
    }
    Some((n as i128).to_string())
}

/// Serialize the table into XLSX bytes: one worksheet, a styled header row
/// (bold white text on a solid `0066CC` fill) and per-column widths sized to
/// the longest rendered value plus padding, capped at [`MAX_COLUMN_WIDTH`].
///
/// Row and column order mirror the table exactly; no cell value is altered
/// here.
pub fn write_report_xlsx(table: &Table, options: &ReportOptions) -> Result<Vec<u8>, FormatError> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let zip_options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", zip_options)?;
        zip.write_all(content_types_xml().as_bytes())?;

        zip.start_file("_rels/.rels", zip_options)?;
        zip.write_all(rels_xml().as_bytes())?;

        zip.start_file("xl/workbook.xml", zip_options)?;
        zip.write_all(workbook_xml(&options.sheet_name).as_bytes())?;

        zip.start_file("xl/_rels/workbook.xml.rels", zip_options)?;
        zip.write_all(workbook_rels_xml().as_bytes())?;

        zip.start_file("xl/styles.xml", zip_options)?;
        zip.write_all(styles_xml().as_bytes())?;

        zip.start_file("xl/worksheets/sheet1.xml", zip_options)?;
        zip.write_all(worksheet_xml(table).as_bytes())?;

        zip.finish()?;
    }
    Ok(buffer.into_inner())
}

fn content_types_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
</Types>
"#
    .to_owned()
}

fn rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>
"#
    .to_owned()
}

fn workbook_xml(sheet_name: &str) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    xml.push_str(
        r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    );
    xml.push_str("<sheets>");
    xml.push_str(&format!(
        r#"<sheet name="{}" sheetId="1" r:id="rId1"/>"#,
        escape_attr(sheet_name)
    ));
    xml.push_str("</sheets></workbook>\n");
    xml
}

fn workbook_rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>
"#
    .to_owned()
}

/// Style indices are fixed: cellXf 0 is the default, cellXf 1 is the header
/// emphasis (bold, white foreground, solid fill).
fn styles_xml() -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
    out.push('\n');
    out.push_str(r#"  <fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><color rgb="FFFFFFFF"/><name val="Calibri"/></font></fonts>"#);
    out.push('\n');
    out.push_str(r#"  <fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FF0066CC"/><bgColor indexed="64"/></patternFill></fill></fills>"#);
    out.push('\n');
    out.push_str(r#"  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#);
    out.push('\n');
    out.push_str(r#"  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);
    out.push('\n');
    out.push_str(r#"  <cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="2" borderId="0" xfId="0" applyFont="1" applyFill="1"/></cellXfs>"#);
    out.push('\n');
    out.push_str(r#"  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
    out.push('\n');
    out.push_str("</styleSheet>\n");
    out
}

fn worksheet_xml(table: &Table) -> String {
    let column_count = table.columns().len().max(1);
    let last_row = table.row_count() + 1;
    let dimension = format!("A1:{}{}", col_to_name(column_count - 1), last_row);

    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
    out.push_str(&format!(r#"<dimension ref="{dimension}"/>"#));

    out.push_str("<cols>");
    for (idx, width) in column_widths(table).into_iter().enumerate() {
        out.push_str(&format!(
            r#"<col min="{n}" max="{n}" width="{width}" customWidth="1"/>"#,
            n = idx + 1
        ));
    }
    out.push_str("</cols>");

    out.push_str("<sheetData>");
    out.push_str(r#"<row r="1">"#);
    for (idx, name) in table.columns().iter().enumerate() {
        out.push_str(&inline_string_cell(&cell_ref(0, idx), Some(1), name));
    }
    out.push_str("</row>");

    for (row_idx, row) in table.rows().iter().enumerate() {
        out.push_str(&format!(r#"<row r="{}">"#, row_idx + 2));
        for (col_idx, value) in row.iter().enumerate() {
            let r = cell_ref(row_idx + 1, col_idx);
            match value {
                // Absent values produce no cell at all, like a blank sheet cell.
                FieldValue::Null => {}
                FieldValue::Int(i) => {
                    out.push_str(&format!(r#"<c r="{r}"><v>{i}</v></c>"#));
                }
                FieldValue::Number(n) if n.is_finite() => {
                    out.push_str(&format!(r#"<c r="{r}"><v>{n}</v></c>"#));
                }
                FieldValue::Number(_) => {}
                FieldValue::Text(s) => out.push_str(&inline_string_cell(&r, None, s)),
                FieldValue::List(_) => {
                    out.push_str(&inline_string_cell(&r, None, &value.display_text()));
                }
            }
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>\n");
    out
}

/// Per-column width: longest rendered value (header included) plus two,
/// capped at [`MAX_COLUMN_WIDTH`].
fn column_widths(table: &Table) -> Vec<usize> {
    let mut widths: Vec<usize> = table.columns().iter().map(|c| c.chars().count()).collect();
    for row in table.rows() {
        for (idx, value) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(value.display_text().chars().count());
            }
        }
    }
    widths
        .into_iter()
        .map(|longest| (longest + 2).min(MAX_COLUMN_WIDTH))
        .collect()
}

fn inline_string_cell(r: &str, style: Option<u32>, text: &str) -> String {
    let style_attr = match style {
        Some(s) => format!(r#" s="{s}""#),
        None => String::new(),
    };
    let space = if needs_space_preserve(text) {
        r#" xml:space="preserve""#
    } else {
        ""
    };
    format!(
        r#"<c r="{r}"{style_attr} t="inlineStr"><is><t{space}>{}</t></is></c>"#,
        escape_text(text)
    )
}

fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", col_to_name(col), row + 1)
}

fn col_to_name(col: usize) -> String {
    // Columns are 1-based in A1 notation; stored 0-based here.
    let mut n = col + 1;
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).expect("column letters are always valid UTF-8")
}

fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s)
        .replace('\"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table_with_identifiers(values: Vec<FieldValue>) -> Table {
        let mut table = Table::new(vec!["AccountID".to_string(), "VMName".to_string()]);
        for (idx, value) in values.into_iter().enumerate() {
            table.push_row(vec![value, FieldValue::from(format!("vm-{idx}"))]);
        }
        table
    }

    #[test]
    fn identifier_rewrite_formats_large_integers_exactly() {
        let big = 1_u64 << 41; // past the 2^40 precision floor
        let table = table_with_identifiers(vec![
            FieldValue::Int(big as i64),
            FieldValue::Int(999_999_999_999_999),
        ]);
        let rewritten = rewrite_identifier_column(&table, "AccountID").unwrap();
        assert_eq!(
            rewritten.value(0, 0),
            Some(&FieldValue::Text("2199023255552".to_string()))
        );
        assert_eq!(
            rewritten.value(1, 0),
            Some(&FieldValue::Text("999999999999999".to_string()))
        );
    }

    #[test]
    fn identifier_rewrite_never_uses_exponent_notation() {
        let table = table_with_identifiers(vec![FieldValue::Number(1e20)]);
        let rewritten = rewrite_identifier_column(&table, "AccountID").unwrap();
        assert_eq!(
            rewritten.value(0, 0),
            Some(&FieldValue::Text("100000000000000000000".to_string()))
        );
    }

    #[test]
    fn identifier_rewrite_leaves_null_and_text_alone() {
        let table = table_with_identifiers(vec![
            FieldValue::Null,
            FieldValue::Text("already-text".to_string()),
        ]);
        let rewritten = rewrite_identifier_column(&table, "AccountID").unwrap();
        assert_eq!(rewritten.value(0, 0), Some(&FieldValue::Null));
        assert_eq!(
            rewritten.value(1, 0),
            Some(&FieldValue::Text("already-text".to_string()))
        );
    }

    #[test]
    fn identifier_rewrite_rejects_non_integral_numbers() {
        let table = table_with_identifiers(vec![FieldValue::Number(2.5)]);
        let err = rewrite_identifier_column(&table, "AccountID").unwrap_err();
        match err {
            FormatError::NonDecimalIdentifier { row, value } => {
                assert_eq!(row, 1);
                assert_eq!(value, "2.5");
            }
            other => panic!("expected NonDecimalIdentifier, got {other:?}"),
        }
    }

    #[test]
    fn identifier_rewrite_without_the_column_is_a_no_op() {
        let table = table_with_identifiers(vec![FieldValue::Int(7)]);
        let rewritten = rewrite_identifier_column(&table, "SomethingElse").unwrap();
        assert_eq!(rewritten, table);
    }

    #[test]
    fn identifier_rewrite_touches_no_other_column() {
        let table = table_with_identifiers(vec![FieldValue::Int(7)]);
        let rewritten = rewrite_identifier_column(&table, "AccountID").unwrap();
        assert_eq!(rewritten.value(0, 1), table.value(0, 1));
    }

    #[test]
    fn column_widths_are_padded_and_capped() {
        let mut table = Table::new(vec!["a".to_string(), "b".to_string()]);
        table.push_row(vec![
            FieldValue::from("1234567890"),
            FieldValue::from("x".repeat(80)),
        ]);
        assert_eq!(column_widths(&table), vec![12, MAX_COLUMN_WIDTH]);
    }

    #[test]
    fn cell_refs_follow_a1_notation() {
        assert_eq!(cell_ref(0, 0), "A1");
        assert_eq!(cell_ref(3, 27), "AB4");
        assert_eq!(col_to_name(701), "ZZ");
    }

    #[test]
    fn worksheet_header_cells_use_the_emphasis_style() {
        let table = table_with_identifiers(vec![FieldValue::Int(1)]);
        let xml = worksheet_xml(&table);
        assert!(xml.contains(r#"<c r="A1" s="1" t="inlineStr"><is><t>AccountID</t></is></c>"#));
        assert!(xml.contains(r#"<c r="A2"><v>1</v></c>"#));
    }

    #[test]
    fn worksheet_text_is_escaped() {
        let mut table = Table::new(vec!["col".to_string()]);
        table.push_row(vec![FieldValue::from("a<b>&c")]);
        let xml = worksheet_xml(&table);
        assert!(xml.contains("a&lt;b&gt;&amp;c"));
    }
}
