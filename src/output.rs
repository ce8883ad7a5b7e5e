use std::io::{self, Write};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::collection::CachedName;
use crate::domain::{DataType, Taxid};
use crate::seqio::SequenceRecord;
use crate::store::{MetadataRecord, Store};
use crate::tools::ToolInfo;

#[derive(Debug, Clone, Serialize)]
pub struct EnsureResult {
    pub taxid: Taxid,
    pub data_type: DataType,
    pub path: String,
    /// Every file of a database set; just `path` for single-file artifacts.
    pub files: Vec<String>,
}

impl EnsureResult {
    pub fn new(taxid: Taxid, data_type: DataType, path: Utf8PathBuf) -> io::Result<Self> {
        let files = if data_type.is_database() {
            Store::database_files(&path)
                .map_err(|err| io::Error::other(err.to_string()))?
                .into_iter()
                .map(|file| file.to_string())
                .collect()
        } else {
            vec![path.to_string()]
        };
        Ok(Self {
            taxid,
            data_type,
            path: path.to_string(),
            files,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub data_type: Option<DataType>,
    pub taxids: Vec<Taxid>,
}

/// One parsed record without its sequence.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub description: String,
    pub length: usize,
}

impl From<&SequenceRecord> for RecordSummary {
    fn from(record: &SequenceRecord) -> Self {
        Self {
            id: record.id.clone(),
            description: record.description.clone(),
            length: record.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub taxid: Option<Taxid>,
    pub data_type: Option<DataType>,
    pub removed: Vec<String>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_ensure(result: &EnsureResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_metadata(result: &MetadataRecord) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_names(result: &[CachedName]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_records(result: &[RecordSummary]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_remove(result: &RemoveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tools(result: &[ToolInfo]) -> io::Result<()> {
        Self::print_json(&result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
