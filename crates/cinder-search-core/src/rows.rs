//! Row location inside delimited files.
//!
//! A [`LineSearch`] provider finds the rows of a file that contain confirmed
//! terms. Two interchangeable providers exist: [`ScanLineSearch`] scans the
//! file in-process; the application crate adds a provider that delegates to
//! an external line-search program. Both report the same `(term, row)`
//! pairs; row 1 (the header) is never reported.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

use crate::error::{Result, SearchError};
use crate::models::{LocatedRow, SourceDocument};

/// Characters that may sit next to a term without making it a partial-word hit.
const BOUNDARY_CLASS: &str = r#"[\s,;"']"#;

/// One raw match reported by a line-search provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineHit {
    pub term: String,
    /// 1-based row number.
    pub row: usize,
    /// Raw row text.
    pub text: String,
}

/// Pluggable text-search provider used by the row locator.
#[async_trait]
pub trait LineSearch: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Find every row of `path` containing one of `terms`.
    async fn search(&self, path: &Path, terms: &[String]) -> Result<Vec<LineHit>>;
}

/// Column name → index for one document header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Index of a declared column; its absence is a configuration error.
    pub fn require(&self, document: &str, column: &str) -> Result<usize> {
        self.index_of(column)
            .ok_or_else(|| SearchError::missing_column(document, column))
    }
}

fn delimiter_of(doc: &SourceDocument) -> Result<u8> {
    doc.delimiter().ok_or_else(|| SearchError::UnsupportedDocument {
        document: doc.id.clone(),
        reason: format!("file type '{}' has no delimiter", doc.file_type.as_str()),
    })
}

/// Parse one raw row into fields using `"` quoting.
pub fn parse_row(line: &str, delimiter: u8) -> std::result::Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .quote(b'"')
        .flexible(true)
        .from_reader(line.as_bytes());
    match reader.byte_records().next() {
        Some(record) => Ok(record?
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()),
        None => Ok(Vec::new()),
    }
}

/// Sequential reader over the data rows of a document.
///
/// The file handle lives as long as the reader and is closed on drop.
pub struct DelimitedFile {
    path: PathBuf,
    header: HeaderMap,
    reader: csv::Reader<File>,
    record: csv::ByteRecord,
}

impl DelimitedFile {
    pub fn open(doc: &SourceDocument) -> Result<Self> {
        let delimiter = delimiter_of(doc)?;
        let file = File::open(&doc.path).map_err(|e| SearchError::io(&doc.path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .quote(b'"')
            .flexible(true)
            .from_reader(file);
        let names = reader
            .byte_headers()
            .map_err(|e| SearchError::csv(&doc.path, e))?
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();
        Ok(Self {
            path: doc.path.clone(),
            header: HeaderMap::new(names),
            reader,
            record: csv::ByteRecord::new(),
        })
    }

    pub fn header(&self) -> &HeaderMap {
        &self.header
    }

    /// Next data row, or `None` at end of file.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        let more = self
            .reader
            .read_byte_record(&mut self.record)
            .map_err(|e| SearchError::csv(&self.path, e))?;
        if !more {
            return Ok(None);
        }
        Ok(Some(
            self.record
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect(),
        ))
    }
}

/// Read and parse a document's header row.
pub fn read_header(doc: &SourceDocument) -> Result<HeaderMap> {
    Ok(DelimitedFile::open(doc)?.header)
}

/// Locate the rows of `doc` containing each confirmed term.
///
/// Results are ordered by row, then term, with duplicates removed, so every
/// provider yields the same output for the same input.
pub async fn locate_rows(
    doc: &SourceDocument,
    terms: &[String],
    searcher: &dyn LineSearch,
) -> Result<Vec<LocatedRow>> {
    let delimiter = delimiter_of(doc)?;
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let mut hits = searcher.search(&doc.path, terms).await?;
    hits.retain(|h| h.row > 1);
    for hit in &mut hits {
        hit.term = hit.term.to_lowercase();
    }
    hits.sort_by(|a, b| a.row.cmp(&b.row).then_with(|| a.term.cmp(&b.term)));
    hits.dedup_by(|a, b| a.row == b.row && a.term == b.term);

    hits.into_iter()
        .map(|hit| {
            let fields =
                parse_row(&hit.text, delimiter).map_err(|e| SearchError::csv(&doc.path, e))?;
            Ok(LocatedRow {
                row: hit.row,
                term: hit.term,
                fields,
            })
        })
        .collect()
}

/// Parse the output of an external line-search program.
///
/// Records are `term:row:context`, one per line, terminated by the first
/// empty line. The context may itself contain `:`.
pub fn parse_line_search_output(stdout: &str) -> Result<Vec<LineHit>> {
    let mut hits = Vec::new();
    for line in stdout.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        let mut parts = line.splitn(3, ':');
        let (Some(term), Some(row), Some(text)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(SearchError::LineSearch(format!(
                "malformed record '{}'",
                line
            )));
        };
        let row: usize = row.trim().parse().map_err(|_| {
            SearchError::LineSearch(format!("invalid row number in record '{}'", line))
        })?;
        if row <= 1 {
            continue;
        }
        hits.push(LineHit {
            term: term.trim().to_string(),
            row,
            text: text.to_string(),
        });
    }
    Ok(hits)
}

/// Boundary-safe, case-insensitive matcher for one term.
pub fn term_matcher(term: &str) -> Result<Regex> {
    let pattern = format!(
        "(?:^|{b}){t}(?:$|{b})",
        b = BOUNDARY_CLASS,
        t = regex::escape(term)
    );
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SearchError::LineSearch(format!("invalid term '{}': {}", term, e)))
}

/// In-process line scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanLineSearch;

impl ScanLineSearch {
    pub fn scan(&self, path: &Path, terms: &[String]) -> Result<Vec<LineHit>> {
        let matchers = terms
            .iter()
            .map(|t| Ok((t.clone(), term_matcher(t)?)))
            .collect::<Result<Vec<_>>>()?;

        let file = File::open(path).map_err(|e| SearchError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut hits = Vec::new();
        let mut row = 0usize;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| SearchError::io(path, e))?;
            if read == 0 {
                break;
            }
            row += 1;
            if row == 1 {
                continue;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            for (term, matcher) in &matchers {
                if matcher.is_match(line) {
                    hits.push(LineHit {
                        term: term.clone(),
                        row,
                        text: line.to_string(),
                    });
                }
            }
        }
        Ok(hits)
    }
}

#[async_trait]
impl LineSearch for ScanLineSearch {
    fn name(&self) -> &str {
        "scan"
    }

    async fn search(&self, path: &Path, terms: &[String]) -> Result<Vec<LineHit>> {
        self.scan(path, terms)
    }
}
