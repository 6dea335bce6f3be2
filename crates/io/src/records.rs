//! Row extraction: one sheet in, an ordered stream of flat records out.
//!
//! Row 0 names the columns. Every later row becomes a [`Record`] keyed by
//! those names. A cell past the known column count gets a positional name
//! (`column_<n>`, 1-indexed) which is appended to the schema, so every row
//! after it in the same sheet sees the wider schema too.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::source::{Sheet, SourceError, TabularSource};

/// One data row as an ordered column-name → cell-string mapping.
///
/// Key order is column order. A duplicated header name keeps its first
/// position and takes the later cell's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), Value::String(value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Compact JSON object text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Positional name for a cell with no header (0-based `col`).
pub fn column_name(col: usize) -> String {
    format!("column_{}", col + 1)
}

/// Per-sheet column schema. Grows when a row is wider than the header.
#[derive(Debug, Clone, Default)]
pub struct RowExtractor {
    columns: Vec<String>,
}

impl RowExtractor {
    pub fn from_header(header: &[String]) -> Self {
        Self { columns: header.to_vec() }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Map one data row onto the schema, widening it as needed.
    pub fn record(&mut self, cells: &[String]) -> Record {
        let mut record = Record::new();
        for (col, cell) in cells.iter().enumerate() {
            if col < self.columns.len() {
                record.insert(self.columns[col].clone(), cell.as_str());
            } else {
                let name = column_name(col);
                self.columns.push(name.clone());
                record.insert(name, cell.as_str());
            }
        }
        record
    }
}

/// Lazy `(row_no, Record)` iterator over one sheet, in sheet order.
///
/// `row_no` is the sheet row index, so the first data row is 1.
pub struct SheetRecords {
    rows: std::iter::Enumerate<std::vec::IntoIter<Vec<String>>>,
    extractor: RowExtractor,
}

impl SheetRecords {
    pub fn new(sheet: Sheet) -> Self {
        let mut rows = sheet.rows.into_iter().enumerate();
        let extractor = match rows.next() {
            Some((_, header)) => RowExtractor::from_header(&header),
            None => RowExtractor::default(),
        };
        Self { rows, extractor }
    }

    pub fn empty() -> Self {
        Self::new(Sheet::default())
    }

    /// Current schema, including any synthesized columns seen so far.
    pub fn columns(&self) -> &[String] {
        self.extractor.columns()
    }
}

impl Iterator for SheetRecords {
    type Item = (usize, Record);

    fn next(&mut self) -> Option<Self::Item> {
        let (row_no, cells) = self.rows.next()?;
        Some((row_no, self.extractor.record(&cells)))
    }
}

/// Records of sheet `sheet_no`. A sheet index past the end yields no records.
pub fn records_for(source: &mut dyn TabularSource, sheet_no: usize) -> Result<SheetRecords, SourceError> {
    match source.read_sheet(sheet_no)? {
        Some(sheet) => {
            log::debug!("extracting '{}' ({} rows including header)", sheet.name, sheet.rows.len());
            Ok(SheetRecords::new(sheet))
        }
        None => {
            log::warn!("sheet {} not found, nothing to extract", sheet_no);
            Ok(SheetRecords::empty())
        }
    }
}

/// Eager variant of [`records_for`].
pub fn extract_records(source: &mut dyn TabularSource, sheet_no: usize) -> Result<Vec<(usize, Record)>, SourceError> {
    Ok(records_for(source, sheet_no)?.collect())
}
