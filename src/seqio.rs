//! Sequence I/O Module
//!
//! Minimal FASTA reading, used to consume the fallback aligner's gapped
//! two-record output. Handles multi-line sequences and arbitrary header
//! labels; gap characters are preserved as-is.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A FASTA record: identifier plus (possibly gapped) sequence.
#[derive(Debug, Clone)]
pub struct FastaRecord {
    /// Identifier from the header line (text after '>' up to whitespace).
    pub name: String,
    /// Sequence, concatenated from all sequence lines.
    pub seq: String,
}

/// Sequential reader for FASTA format files.
pub struct FastaReader {
    reader: BufReader<File>,
    line_buf: String,
    current_name: Option<String>,
}

impl FastaReader {
    /// Opens a FASTA file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open FASTA: {}", path.as_ref().display()))?;
        let mut reader = Self {
            reader: BufReader::new(file),
            line_buf: String::with_capacity(256),
            current_name: None,
        };

        // Read first header line to initialise state
        reader.line_buf.clear();
        if reader.reader.read_line(&mut reader.line_buf)? > 0
            && reader.line_buf.starts_with('>')
        {
            reader.current_name = Some(
                reader.line_buf[1..]
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_string(),
            );
        }

        Ok(reader)
    }

    /// Reads the next record, or `Ok(None)` at end of file.
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        let name = match self.current_name.take() {
            Some(n) => n,
            None => return Ok(None),
        };

        let mut seq = String::new();

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }

            if self.line_buf.starts_with('>') {
                self.current_name = Some(
                    self.line_buf[1..]
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_string(),
                );
                break;
            } else {
                seq.push_str(self.line_buf.trim_end());
            }
        }

        Ok(Some(FastaRecord { name, seq }))
    }
}

impl Iterator for FastaReader {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
