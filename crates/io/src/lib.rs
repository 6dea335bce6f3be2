// Tabular input, row extraction and JSON persistence

pub mod csv;
pub mod persist;
pub mod records;
pub mod source;

pub use records::{column_name, extract_records, records_for, Record, RowExtractor, SheetRecords};
pub use source::{open_source, MemorySource, Sheet, SourceError, TabularSource, XlsxSource};
