//! Tabular input and output (CSV / TSV / plain text)
//!
//! Input: a model-name column plus optional prior-run flags. Output: one row
//! per model in the shape each sink expects. Writes go through a temporary
//! file and a rename so a reader never sees a half-written table.

use std::borrow::Cow;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::domain::{IngestError, LaunchRecord, ModelOutcome, PriceRow};

/// Header names recognized as the model column, compared case-insensitively.
const MODEL_HEADERS: [&str; 4] = ["make model", "make-model", "model", "model name"];

/// One model row read from the input, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModelRow {
    /// 1-based line in the source file
    pub line: usize,
    pub name: String,
    pub already_processed: bool,
}

/* ---------------- Parsing ---------------- */

/// One delimited record and the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    pub line: usize,
    pub fields: Vec<String>,
}

/// A quoted field that is still open when the input ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnterminatedQuote {
    pub line: usize,
}

/// Record being assembled; quoted fields may span several lines.
struct OpenRecord {
    line: usize,
    fields: Vec<String>,
    field: String,
    in_quotes: bool,
}

impl OpenRecord {
    fn starting_at(line: usize) -> Self {
        Self {
            line,
            fields: Vec::new(),
            field: String::new(),
            in_quotes: false,
        }
    }

    fn feed(&mut self, text: &str, sep: char) {
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match (self.in_quotes, c) {
                (true, '"') if chars.peek() == Some(&'"') => {
                    chars.next();
                    self.field.push('"');
                }
                (true, '"') => self.in_quotes = false,
                (false, '"') => self.in_quotes = true,
                (false, c) if c == sep => self.fields.push(mem::take(&mut self.field)),
                (_, c) => self.field.push(c),
            }
        }
    }

    fn finish(mut self) -> TableRecord {
        self.fields.push(self.field);
        TableRecord {
            line: self.line,
            fields: self.fields,
        }
    }
}

/// Split delimited text into records. Blank lines are skipped; CRLF and LF
/// endings are both accepted.
pub fn parse_records(text: &str, sep: char) -> Result<Vec<TableRecord>, UnterminatedQuote> {
    let mut records = Vec::new();
    let mut open: Option<OpenRecord> = None;

    for (idx, line) in text.lines().enumerate() {
        let mut record = match open.take() {
            Some(mut record) => {
                record.field.push('\n');
                record
            }
            None if line.trim().is_empty() => continue,
            None => OpenRecord::starting_at(idx + 1),
        };
        record.feed(line, sep);
        if record.in_quotes {
            open = Some(record);
        } else {
            records.push(record.finish());
        }
    }

    match open {
        Some(record) => Err(UnterminatedQuote { line: record.line }),
        None => Ok(records),
    }
}

fn separator_for(path: &Path) -> char {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("tsv" | "tab") => '\t',
        _ => ',',
    }
}

fn is_plain_text(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("txt" | "lst")
    )
}

/// Index of the model column; falls back to the first column.
fn model_column(header: &[String]) -> usize {
    header
        .iter()
        .position(|h| MODEL_HEADERS.contains(&h.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(0)
}

/// Index of the prior-run flag column, preferring a site-specific one.
fn flag_column(header: &[String], site: Option<&str>) -> Option<usize> {
    let lowered: Vec<String> = header.iter().map(|h| h.trim().to_ascii_lowercase()).collect();

    if let Some(site) = site {
        let site = site.to_ascii_lowercase();
        let wanted = [format!("scrapped_{site}"), format!("scraped_{site}")];
        if let Some(idx) = lowered.iter().position(|h| wanted.contains(h)) {
            return Some(idx);
        }
    }

    lowered
        .iter()
        .position(|h| h == "scraped" || h == "scrapped")
        .or_else(|| lowered.iter().position(|h| h.starts_with("scraped_") || h.starts_with("scrapped_")))
}

/// Model rows from already-loaded text.
pub fn model_rows_from_text(text: &str, path: &Path, site: Option<&str>) -> Result<Vec<RawModelRow>, IngestError> {
    if is_plain_text(path) {
        return Ok(text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| RawModelRow {
                line: idx + 1,
                name: line.trim().to_string(),
                already_processed: false,
            })
            .collect());
    }

    let mut records = parse_records(text, separator_for(path)).map_err(|e| IngestError::UnterminatedQuote {
        path: path.to_path_buf(),
        line: e.line,
    })?;
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let header = records.remove(0).fields;
    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(IngestError::MissingModelColumn { path: path.to_path_buf() });
    }

    let model_idx = model_column(&header);
    let flag_idx = flag_column(&header, site);

    Ok(records
        .into_iter()
        .map(|record| RawModelRow {
            line: record.line,
            name: record.fields.get(model_idx).map(|s| s.trim().to_string()).unwrap_or_default(),
            already_processed: flag_idx
                .and_then(|f| record.fields.get(f))
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("yes")),
        })
        .collect())
}

/// Read model rows from a CSV, TSV or plain-text file.
pub async fn read_model_rows(path: &Path, site: Option<&str>) -> Result<Vec<RawModelRow>, IngestError> {
    let text = fs::read_to_string(path).await.map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    model_rows_from_text(text.trim_start_matches('\u{feff}'), path, site)
}

/* ---------------- Writing ---------------- */

/// A record that can be written as one table row.
pub trait TabularRecord {
    fn header() -> Vec<&'static str>;
    fn to_row(&self) -> Vec<String>;
}

impl TabularRecord for ModelOutcome {
    fn header() -> Vec<&'static str> {
        vec!["Model", "Low_Price", "High_Price", "MRP", "Representative_URL", "Availability", "Search_URLs"]
    }

    fn to_row(&self) -> Vec<String> {
        let row = PriceRow::from(self);
        vec![
            row.model,
            row.low_price.to_string(),
            row.high_price.to_string(),
            row.mrp.to_string(),
            row.representative_url,
            row.availability,
            row.search_urls,
        ]
    }
}

impl TabularRecord for LaunchRecord {
    fn header() -> Vec<&'static str> {
        vec!["Model", "Launch_Date", "Launch_Source", "Launch_URL", "Launch_Availability", "Scraped"]
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.model.clone(),
            self.launch_date.clone().unwrap_or_default(),
            self.source.clone().unwrap_or_default(),
            self.url.clone().unwrap_or_default(),
            self.availability.as_str().to_string(),
            if self.scraped { "Yes" } else { "No" }.to_string(),
        ]
    }
}

/// A cell as written: quoted when it holds the separator, a quote or a
/// line break.
fn encode_cell(cell: &str, sep: char) -> Cow<'_, str> {
    if cell.contains([sep, '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(cell)
    }
}

fn encode_line<S: AsRef<str>>(cells: &[S], sep: char) -> String {
    let mut line = cells
        .iter()
        .map(|c| encode_cell(c.as_ref(), sep))
        .collect::<Vec<_>>()
        .join(&sep.to_string());
    line.push('\n');
    line
}

/// Render records with a header line.
pub fn render_table<R: TabularRecord>(records: &[R], sep: char) -> String {
    let mut out = encode_line(&R::header(), sep);
    for record in records {
        out.push_str(&encode_line(&record.to_row(), sep));
    }
    out
}

/// Sibling temp path used for atomic replacement.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write bytes to `path` by writing a sibling temp file and renaming it over.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).await?;
        }
    }
    let tmp = temp_path_for(path);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await
}

/// Write records as a table, atomically.
pub async fn write_table<R: TabularRecord>(path: &Path, records: &[R]) -> io::Result<()> {
    let text = render_table(records, separator_for(path));
    write_atomic(path, text.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AggregateResult, Availability};

    #[test]
    fn test_parse_quoted_fields_and_crlf() {
        let records = parse_records("Model,Note\r\n\"Galaxy S23, 5G\",\"say \"\"hi\"\"\"\r\n\r\nPixel 8,x", ',').unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].fields, vec!["Galaxy S23, 5G", "say \"hi\""]);
        assert_eq!(records[2].fields, vec!["Pixel 8", "x"]);
        assert_eq!(records[2].line, 4);
    }

    #[test]
    fn test_quoted_line_breaks_keep_line_numbers() {
        let records = parse_records("Model\tNote\nPixel 8\t\"two\nlines\"\nPixel 9\t\n", '\t').unwrap();
        assert_eq!(records[1].fields, vec!["Pixel 8", "two\nlines"]);
        assert_eq!(records[1].line, 2);
        assert_eq!(records[2].line, 4);
    }

    #[test]
    fn test_unterminated_quote_is_reported() {
        assert_eq!(parse_records("Model\n\"Pixel 8\nPixel 9\n", ','), Err(UnterminatedQuote { line: 2 }));

        let err = model_rows_from_text("Model\n\"Pixel 8\n", Path::new("m.csv"), None).unwrap_err();
        assert!(matches!(err, IngestError::UnterminatedQuote { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn test_model_and_flag_columns_are_found_by_header() {
        let text = "Brand,Make-Model,Scrapped_Flipkart,Scraped\nApple,Apple iPhone 15,Yes,No\nGoogle,Pixel 8,No,Yes\n";
        let rows = model_rows_from_text(text, Path::new("master.csv"), Some("flipkart")).unwrap();
        assert_eq!(rows[0].name, "Apple iPhone 15");
        assert!(rows[0].already_processed);
        assert!(!rows[1].already_processed);
        assert_eq!(rows[1].line, 3);

        let generic = model_rows_from_text(text, Path::new("master.csv"), None).unwrap();
        assert!(!generic[0].already_processed);
        assert!(generic[1].already_processed);

        let other_site = model_rows_from_text("Model,Scraped_Amazon\nPixel 8,yes\n", Path::new("m.csv"), None).unwrap();
        assert!(other_site[0].already_processed);
    }

    #[test]
    fn test_plain_text_lists_have_no_header() {
        let rows = model_rows_from_text("Apple iPhone 15\n\n  Pixel 8  \n", Path::new("errors.txt"), None).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Apple iPhone 15", "Pixel 8"]);
        assert_eq!(rows[1].line, 3);
    }

    #[test]
    fn test_price_table_rendering() {
        let outcome = ModelOutcome::Found(AggregateResult {
            model: "Apple iPhone 15".into(),
            low_price: 69900,
            high_price: 79900,
            max_reference_price: Some(84900),
            representative_url: "https://shop/p/1".into(),
            availability: Availability::InStock,
            search_urls: vec!["https://shop/s?q=a".into(), "https://shop/s?q=b".into()],
        });
        let text = render_table(&[outcome], ',');
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Model,Low_Price,High_Price,MRP,Representative_URL,Availability,Search_URLs"));
        assert_eq!(
            lines.next(),
            Some("Apple iPhone 15,69900,79900,84900,https://shop/p/1,InStock,\"https://shop/s?q=a, https://shop/s?q=b\"")
        );
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("launch.csv");
        write_table(&path, &[LaunchRecord::skipped("Pixel 8")]).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("Pixel 8,,,,NotFound,No\n"));
        assert!(!temp_path_for(&path).exists());
    }
}
