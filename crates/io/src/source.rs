//! Tabular sources: anything that can hand out sheets of string-rendered cells.
//!
//! The row extractor only needs `rows: Vec<Vec<String>>` for a single sheet, so
//! every backend renders its cells to text up front. Excel workbooks (xlsx,
//! xlsm, xls, xlsb, ods) go through calamine; CSV/TSV lives in [`crate::csv`].

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};

use crate::csv::CsvSource;

/// Failure to open or read the tabular input.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Can't open {}, {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Can't read sheet '{sheet}', {reason}")]
    Sheet { sheet: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One sheet with every cell already rendered to a string.
///
/// Trailing empty cells are not part of a row, so a short row never yields
/// keys for columns it does not have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self { name: name.into(), rows }
    }
}

/// A workbook-like input that exposes sheets by index.
pub trait TabularSource {
    fn sheet_names(&self) -> Vec<String>;

    /// Read the sheet at `index`. Returns `Ok(None)` when the index is past
    /// the last sheet. Other sheets are never touched.
    fn read_sheet(&mut self, index: usize) -> Result<Option<Sheet>, SourceError>;
}

/// Open `path` with the backend matching its extension.
pub fn open_source(path: &Path) -> Result<Box<dyn TabularSource>, SourceError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" | "tsv" | "txt" => Ok(Box::new(CsvSource::open(path)?)),
        _ => Ok(Box::new(XlsxSource::open(path)?)),
    }
}

// ============================================================================
// Excel (calamine)
// ============================================================================

/// Excel workbook source (xlsx, xlsm, xls, xlsb, ods).
pub struct XlsxSource {
    path: PathBuf,
    workbook: Sheets<BufReader<File>>,
}

impl XlsxSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let workbook = open_workbook_auto(path).map_err(|e| SourceError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { path: path.to_path_buf(), workbook })
    }
}

impl TabularSource for XlsxSource {
    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_vec()
    }

    fn read_sheet(&mut self, index: usize) -> Result<Option<Sheet>, SourceError> {
        let name = match self.workbook.sheet_names().get(index) {
            Some(name) => name.clone(),
            None => return Ok(None),
        };

        let range = match self.workbook.worksheet_range_at(index) {
            Some(range) => range.map_err(|e| SourceError::Sheet {
                sheet: name.clone(),
                reason: e.to_string(),
            })?,
            None => return Ok(None),
        };

        log::debug!("read sheet '{}' from {}", name, self.path.display());
        Ok(Some(Sheet::new(name, render_range(&range))))
    }
}

/// Render a calamine range into string rows anchored at A1.
///
/// A range whose data starts below/right of A1 is padded with empty cells so
/// that column indices match the sheet.
fn render_range(range: &Range<Data>) -> Vec<Vec<String>> {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<String>> = vec![Vec::new(); start_row as usize];

    for row in range.rows() {
        let mut cells: Vec<String> = vec![String::new(); start_col as usize];
        cells.extend(row.iter().map(render_cell));
        trim_trailing_empty(&mut cells);
        rows.push(cells);
    }

    rows
}

/// String rendering of one cell. Formatting fidelity is not a goal: dates
/// come out as their serial number.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without decimals
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

pub(crate) fn trim_trailing_empty(cells: &mut Vec<String>) {
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Sheets held in memory. Used by tests and by callers that already have
/// rendered rows.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sheets: Vec<Sheet>,
}

impl MemorySource {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Single sheet built from string slices, handy in tests.
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        Self::new(vec![Sheet::new("Sheet1", rows)])
    }
}

impl TabularSource for MemorySource {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read_sheet(&mut self, index: usize) -> Result<Option<Sheet>, SourceError> {
        Ok(self.sheets.get(index).cloned())
    }
}
