//! Record readers for the cached sequence files.
//!
//! FASTA and GenBank flat files are read one record at a time. GenBank
//! records keep only what identifies them (VERSION, else LOCUS name), the
//! DEFINITION text and the ORIGIN sequence; features are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use serde::Serialize;

use crate::domain::DataType;
use crate::error::CollectorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceRecord {
    pub id: String,
    pub description: String,
    pub sequence: String,
}

impl SequenceRecord {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    Fasta,
    Genbank,
}

impl SequenceFormat {
    pub fn for_data_type(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::GenomicFasta | DataType::ProteinFasta => Some(SequenceFormat::Fasta),
            DataType::GenomicGenbank => Some(SequenceFormat::Genbank),
            _ => None,
        }
    }
}

/// Reads every record of a FASTA or GenBank file.
pub fn read_records(
    path: &Utf8Path,
    format: SequenceFormat,
) -> Result<Vec<SequenceRecord>, CollectorError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| CollectorError::Filesystem(format!("open {path}: {err}")))?;
    let reader = BufReader::with_capacity(1024 * 1024, file);
    let parse_error = |message: String| CollectorError::SequenceParse {
        path: path.to_string(),
        message,
    };
    match format {
        SequenceFormat::Fasta => FastaReader::new(reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| parse_error(err.to_string())),
        SequenceFormat::Genbank => GenbankReader::new(reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| parse_error(err.to_string())),
    }
}

/// Sequential FASTA reader; multi-line sequences are joined.
pub struct FastaReader<R: BufRead> {
    reader: R,
    line_buf: String,
    pending_header: Option<String>,
    started: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(256),
            pending_header: None,
            started: false,
        }
    }

    pub fn read_next(&mut self) -> std::io::Result<Option<SequenceRecord>> {
        if !self.started {
            self.started = true;
            loop {
                self.line_buf.clear();
                if self.reader.read_line(&mut self.line_buf)? == 0 {
                    return Ok(None);
                }
                let line = self.line_buf.trim_end();
                if let Some(header) = line.strip_prefix('>') {
                    self.pending_header = Some(header.to_string());
                    break;
                }
                if !line.is_empty() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "sequence data before the first '>' header",
                    ));
                }
            }
        }

        let Some(header) = self.pending_header.take() else {
            return Ok(None);
        };
        let mut sequence = String::new();
        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }
            let line = self.line_buf.trim_end();
            if let Some(next) = line.strip_prefix('>') {
                self.pending_header = Some(next.to_string());
                break;
            }
            sequence.push_str(line.trim());
        }

        let (id, description) = match header.split_once(char::is_whitespace) {
            Some((id, rest)) => (id.to_string(), rest.trim().to_string()),
            None => (header.trim().to_string(), String::new()),
        };
        Ok(Some(SequenceRecord {
            id,
            description,
            sequence,
        }))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = std::io::Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// Sequential GenBank flat-file reader; records end at `//`.
pub struct GenbankReader<R: BufRead> {
    lines: std::io::Lines<R>,
}

impl<R: BufRead> GenbankReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    pub fn read_next(&mut self) -> std::io::Result<Option<SequenceRecord>> {
        let mut locus: Option<String> = None;
        let mut version: Option<String> = None;
        let mut description = String::new();
        let mut sequence = String::new();
        let mut section = Section::Header;

        for line in self.lines.by_ref() {
            let line = line?;
            if line.starts_with("//") {
                let id = version.or(locus).ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "record without LOCUS")
                })?;
                return Ok(Some(SequenceRecord {
                    id,
                    description,
                    sequence,
                }));
            }
            if let Some(rest) = line.strip_prefix("LOCUS") {
                locus = rest.split_whitespace().next().map(str::to_string);
                section = Section::Header;
            } else if let Some(rest) = line.strip_prefix("DEFINITION") {
                description = rest.trim().to_string();
                section = Section::Definition;
            } else if let Some(rest) = line.strip_prefix("VERSION") {
                version = rest.split_whitespace().next().map(str::to_string);
                section = Section::Header;
            } else if line.starts_with("ORIGIN") {
                section = Section::Origin;
            } else if line.starts_with(' ') {
                match section {
                    Section::Definition => {
                        description.push(' ');
                        description.push_str(line.trim());
                    }
                    Section::Origin => sequence.extend(
                        line.chars()
                            .filter(char::is_ascii_alphabetic)
                            .map(|ch| ch.to_ascii_uppercase()),
                    ),
                    Section::Header => {}
                }
            } else {
                section = Section::Header;
            }
        }

        if locus.is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "record not terminated by //",
            ));
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for GenbankReader<R> {
    type Item = std::io::Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

#[derive(Clone, Copy)]
enum Section {
    Header,
    Definition,
    Origin,
}
