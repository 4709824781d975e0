//! Streaming reader for the dataset's tab-separated files.
//!
//! [`SourceReader`] yields one [`RawRecord`] per well-formed line, in source
//! order, without ever holding more than the csv buffer plus one record in
//! memory. Lines are never quoted in this dataset, so quoting is disabled and
//! a literal `"` stays part of the field.
//!
//! A line with the wrong number of fields, or one that is not valid UTF-8, is
//! counted as malformed and skipped. A read error part-way through (a
//! truncated gzip member, for instance) ends the stream and marks it as
//! truncated; everything read before it is still delivered.

use crate::error::SourceError;
use crate::io::compression::auto_detect_reader;
use csv::{ByteRecord, Reader, ReaderBuilder};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Malformed lines reported at `warn` before switching to `debug`.
const LOUD_MALFORMED_LINES: u64 = 5;

/// Options controlling how a source file is parsed.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Literal token meaning "no value" (`\N` in the dataset).
    pub null_sentinel: String,
    /// Size of the read window handed to the csv parser.
    pub buffer_capacity: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            null_sentinel: "\\N".to_string(),
            buffer_capacity: 1 << 20,
        }
    }
}

/// Counters for one pass over a source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Well-formed records produced.
    pub records: u64,
    /// Lines skipped because they could not be parsed.
    pub malformed: u64,
    /// The stream ended early on a read or decompression error.
    pub truncated: bool,
}

/// One source line, projected onto the expected columns.
///
/// Values are `None` when the field held the null sentinel, was empty, or
/// the column is absent from the file header.
#[derive(Clone, Debug)]
pub struct RawRecord {
    line: u64,
    columns: Arc<[&'static str]>,
    values: Vec<Option<String>>,
}

impl RawRecord {
    /// Build a record directly, mostly useful in tests.
    #[must_use]
    pub fn new(line: u64, columns: Arc<[&'static str]>, values: Vec<Option<String>>) -> Self {
        Self {
            line,
            columns,
            values,
        }
    }

    /// 1-based line number in the source file (the header is line 1).
    #[must_use]
    pub const fn line(&self) -> u64 {
        self.line
    }

    /// Value of `column`, or `None` if null or unknown.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| *c == column)?;
        self.values.get(idx)?.as_deref()
    }
}

/// Single-pass iterator over the records of one source file.
///
/// Re-reading requires opening the file again.
pub struct SourceReader {
    path: PathBuf,
    rdr: Reader<Box<dyn Read>>,
    columns: Arc<[&'static str]>,
    /// For each expected column, its position in the file header.
    positions: Vec<Option<usize>>,
    header_len: usize,
    null_sentinel: String,
    record: ByteRecord,
    stats: ReadStats,
    done: bool,
}

impl SourceReader {
    /// Open `path`, detect its compression and read the header line.
    ///
    /// # Errors
    /// [`SourceError::Unavailable`] if the file cannot be opened and
    /// [`SourceError::Decompress`] if the header cannot be decoded.
    pub fn open(
        path: impl AsRef<Path>,
        columns: &[&'static str],
        options: &ReadOptions,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| SourceError::Unavailable {
            path: path.clone(),
            source,
        })?;
        let stream = auto_detect_reader(file, &path).map_err(|e| SourceError::Decompress {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .flexible(true)
            .buffer_capacity(options.buffer_capacity.max(4096))
            .from_reader(stream);

        let header: Vec<String> = rdr
            .byte_headers()
            .map_err(|e| SourceError::Decompress {
                path: path.clone(),
                message: e.to_string(),
            })?
            .iter()
            .map(|field| {
                String::from_utf8_lossy(field)
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .to_string()
            })
            .collect();

        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|col| header.iter().position(|h| h == col))
            .collect();
        let missing: Vec<&str> = columns
            .iter()
            .zip(&positions)
            .filter(|(_, pos)| pos.is_none())
            .map(|(col, _)| *col)
            .collect();
        if !missing.is_empty() {
            warn!(
                file = %path.display(),
                missing = ?missing,
                "header lacks expected columns; they will read as null"
            );
        }

        Ok(Self {
            path,
            rdr,
            columns: columns.into(),
            positions,
            header_len: header.len(),
            null_sentinel: options.null_sentinel.clone(),
            record: ByteRecord::new(),
            stats: ReadStats::default(),
            done: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> ReadStats {
        self.stats
    }

    fn report_malformed(&mut self, line: u64, reason: &str) {
        self.stats.malformed += 1;
        if self.stats.malformed <= LOUD_MALFORMED_LINES {
            warn!(file = %self.path.display(), line, reason, "skipping malformed line");
        } else {
            debug!(file = %self.path.display(), line, reason, "skipping malformed line");
        }
    }

    /// Project the current byte record onto the expected columns.
    fn project(&self) -> Result<Vec<Option<String>>, std::str::Utf8Error> {
        let mut values = Vec::with_capacity(self.positions.len());
        for pos in &self.positions {
            let value = match pos.and_then(|p| self.record.get(p)) {
                Some(bytes) => {
                    let text = std::str::from_utf8(bytes)?;
                    if text.is_empty() || text == self.null_sentinel {
                        None
                    } else {
                        Some(text.to_string())
                    }
                }
                None => None,
            };
            values.push(value);
        }
        Ok(values)
    }
}

impl Iterator for SourceReader {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        while !self.done {
            match self.rdr.read_byte_record(&mut self.record) {
                Ok(false) => self.done = true,
                Ok(true) => {
                    let line = self.record.position().map_or(0, csv::Position::line);
                    if self.record.len() != self.header_len {
                        let reason = format!(
                            "expected {} fields, found {}",
                            self.header_len,
                            self.record.len()
                        );
                        self.report_malformed(line, &reason);
                        continue;
                    }
                    match self.project() {
                        Ok(values) => {
                            self.stats.records += 1;
                            return Some(RawRecord {
                                line,
                                columns: Arc::clone(&self.columns),
                                values,
                            });
                        }
                        Err(e) => self.report_malformed(line, &format!("invalid UTF-8: {e}")),
                    }
                }
                Err(e) => {
                    self.stats.truncated = true;
                    self.done = true;
                    warn!(
                        file = %self.path.display(),
                        records = self.stats.records,
                        error = %e,
                        "read failed part-way through; keeping records read so far"
                    );
                }
            }
        }
        None
    }
}
