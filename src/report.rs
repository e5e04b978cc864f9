use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

pub const HEADER: [&str; 6] = [
    "Post ID",
    "Post URL",
    "Post Title",
    "Block Type",
    "Content Excerpt",
    "Block Attributes",
];

/// One extracted block instance, as written to the search report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub document_id: i64,
    pub url: String,
    pub title: String,
    pub block_name: String,
    pub excerpt: String,
    pub attributes: String,
}

/// CSV writer for search results. The header goes out on construction.
pub struct CsvReport<W: Write> {
    out: W,
}

impl CsvReport<BufWriter<File>> {
    /// Creates (or truncates) `path`. Fails before anything else runs if the
    /// location is not writable.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| Error::OutputNotWritable {
            path: path.to_path_buf(),
            source,
        })?;
        CsvReport::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvReport<W> {
    pub fn new(mut out: W) -> Result<Self> {
        write_record(&mut out, &HEADER)?;
        Ok(CsvReport { out })
    }

    pub fn write_row(&mut self, row: &ReportRow) -> Result<()> {
        let id = row.document_id.to_string();
        write_record(
            &mut self.out,
            &[
                id.as_str(),
                row.url.as_str(),
                row.title.as_str(),
                row.block_name.as_str(),
                row.excerpt.as_str(),
                row.attributes.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

fn write_record<W: Write>(out: &mut W, fields: &[&str]) -> Result<()> {
    let line = fields
        .iter()
        .map(|f| quote_field(f))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{}", line)?;
    Ok(())
}

/// Quotes a field that holds a delimiter, quote, whitespace or line break;
/// embedded quotes are doubled.
fn quote_field(field: &str) -> String {
    let needs_quotes = field
        .chars()
        .any(|c| matches!(c, ',' | '"' | ' ' | '\t' | '\n' | '\r'));
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
