// Row framing on stdout: one value per line, or a single JSON array.

use std::io::{self, Write};

use xlsx2json_script::RowSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON value per line.
    Lines,
    /// `[`, rows joined by `,\n`, `]`.
    Array,
}

/// Writes emitted rows to `out`. Every row is flushed as soon as it is
/// written, so a script that ends the process mid-run leaves complete rows
/// behind.
pub struct OutputAssembler<W: Write> {
    out: W,
    format: OutputFormat,
    quiet: bool,
    rows: usize,
}

impl<W: Write> OutputAssembler<W> {
    pub fn new(out: W, format: OutputFormat, quiet: bool) -> Self {
        Self { out, format, quiet, rows: 0 }
    }

    /// Open the array, if any.
    pub fn begin(&mut self) -> io::Result<()> {
        if self.format == OutputFormat::Array && !self.quiet {
            self.out.write_all(b"[")?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Close the array, if any. Call this even when the run failed.
    pub fn finish(mut self) -> io::Result<W> {
        if self.format == OutputFormat::Array && !self.quiet {
            self.out.write_all(b"]\n")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> RowSink for OutputAssembler<W> {
    fn emit(&mut self, _row: usize, json: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        match self.format {
            OutputFormat::Lines => writeln!(self.out, "{}", json)?,
            OutputFormat::Array => {
                if self.rows > 0 {
                    self.out.write_all(b",\n")?;
                }
                self.out.write_all(json.as_bytes())?;
            }
        }
        self.rows += 1;
        self.out.flush()
    }
}
