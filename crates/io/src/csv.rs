// CSV/TSV source

use std::path::{Path, PathBuf};

use crate::source::{trim_trailing_empty, Sheet, SourceError, TabularSource};

/// A delimited text file exposed as a single sheet named after the file stem.
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    content: String,
}

impl CsvSource {
    /// Open `path`, sniffing the delimiter. `.tsv` files are always tab-delimited.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let content = read_file_as_utf8(path)?;
        let is_tsv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
        let delimiter = if is_tsv { b'\t' } else { sniff_delimiter(&content) };
        Ok(Self { path: path.to_path_buf(), delimiter, content })
    }

    pub fn from_string(name: &str, content: &str, delimiter: u8) -> Self {
        Self {
            path: PathBuf::from(name),
            delimiter,
            content: content.to_string(),
        }
    }

    fn sheet_name(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Sheet1")
            .to_string()
    }
}

impl TabularSource for CsvSource {
    fn sheet_names(&self) -> Vec<String> {
        vec![self.sheet_name()]
    }

    fn read_sheet(&mut self, index: usize) -> Result<Option<Sheet>, SourceError> {
        if index != 0 {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(self.content.as_bytes());

        let name = self.sheet_name();
        let mut rows = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let record = result.map_err(|e| SourceError::Sheet {
                sheet: name.clone(),
                reason: e.to_string(),
            })?;
            let mut cells: Vec<String> = record.iter().map(|f| f.to_string()).collect();
            // A written header field names its column even when blank
            if line > 0 {
                trim_trailing_empty(&mut cells);
            }
            rows.push(cells);
        }

        Ok(Some(Sheet::new(name, rows)))
    }
}

const DELIMITERS: [u8; 4] = [b'\t', b';', b',', b'|'];
const SNIFF_LINES: usize = 10;

/// Pick the delimiter that splits the first lines most consistently.
///
/// A candidate must split the first line into at least two fields. Its score
/// is the number of sampled lines with that same width times the width; the
/// earliest candidate wins a tie. Falls back to comma.
fn sniff_delimiter(content: &str) -> u8 {
    let sample = content.lines().take(SNIFF_LINES).collect::<Vec<_>>().join("\n");

    let mut best: Option<(usize, u8)> = None;
    for delimiter in DELIMITERS {
        let widths = field_counts(&sample, delimiter);
        let Some(&first) = widths.first() else { continue };
        if first < 2 {
            continue;
        }
        let score = widths.iter().filter(|&&w| w == first).count() * first;
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, delimiter));
        }
    }
    best.map_or(b',', |(_, delimiter)| delimiter)
}

fn field_counts(sample: &str, delimiter: u8) -> Vec<usize> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(sample.as_bytes())
        .records()
        .map(|record| record.map_or(1, |r| r.len()))
        .collect()
}

/// File contents as text. Bytes that are not UTF-8 are taken as
/// Windows-1252, which is what Excel writes for "CSV" on Windows.
fn read_file_as_utf8(path: &Path) -> Result<String, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(decode_text(bytes))
}

fn decode_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|invalid| encoding_rs::WINDOWS_1252.decode(invalid.as_bytes()).0.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter("a,b\n1,2\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_csv_source_reads_single_sheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.csv");
        fs::write(&path, "Name,Age\nAda,36\nGrace,45,extra\n").unwrap();

        let mut source = CsvSource::open(&path).unwrap();
        assert_eq!(source.sheet_names(), vec!["people"]);

        let sheet = source.read_sheet(0).unwrap().unwrap();
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[2], vec!["Grace", "45", "extra"]);
        assert!(source.read_sheet(1).unwrap().is_none());
    }

    #[test]
    fn test_csv_trailing_empty_fields_dropped() {
        let mut source = CsvSource::from_string("t.csv", "a,b,c\n1,,\n", b',');
        let sheet = source.read_sheet(0).unwrap().unwrap();
        assert_eq!(sheet.rows[1], vec!["1"]);
    }

    #[test]
    fn test_blank_header_field_kept() {
        let mut source = CsvSource::from_string("t.csv", "a,b,\n1,2,3\n", b',');
        let sheet = source.read_sheet(0).unwrap().unwrap();
        assert_eq!(sheet.rows[0], vec!["a", "b", ""]);

        let records = crate::extract_records(&mut source, 0).unwrap();
        assert_eq!(records[0].1.get(""), Some("3"));
        assert_eq!(records[0].1.get("column_3"), None);
    }

    #[test]
    fn test_sniff_prefers_consistent_width() {
        // A stray comma in a data cell does not outvote the header
        assert_eq!(sniff_delimiter("x;y\n1,5;2\n3;4\n"), b';');
        assert_eq!(sniff_delimiter("a|b|c\n1|2|3\n"), b'|');
        assert_eq!(sniff_delimiter("single\ncolumn\n"), b',');
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text("plain ✓".as_bytes().to_vec()), "plain ✓");
        assert_eq!(decode_text(vec![b'1', 0x80]), "1€");
    }

    #[test]
    fn test_tsv_forces_tab() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.tsv");
        fs::write(&path, "a,b\tc\n1,2\t3\n").unwrap();

        let mut source = CsvSource::open(&path).unwrap();
        let sheet = source.read_sheet(0).unwrap().unwrap();
        assert_eq!(sheet.rows[0], vec!["a,b", "c"]);
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "café" with 0xE9 for é
        fs::write(&path, b"name\ncaf\xe9\n").unwrap();

        let mut source = CsvSource::open(&path).unwrap();
        let sheet = source.read_sheet(0).unwrap().unwrap();
        assert_eq!(sheet.rows[1], vec!["café"]);
    }
}
