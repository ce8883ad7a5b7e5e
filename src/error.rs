use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::{DataType, Taxid};

#[derive(Debug, Error, Diagnostic)]
pub enum CollectorError {
    #[error("invalid data type: {0}")]
    InvalidDataType(String),

    #[error("invalid taxid: {0}")]
    InvalidTaxid(String),

    #[error("NCBI has no {data_type} record for taxid {taxid}")]
    IdentifierNotFound { taxid: Taxid, data_type: DataType },

    #[error(
        "taxid {taxid} has {} assemblies on NCBI ({}); select one with an assembly id or '#N'",
        .candidates.len(),
        .candidates.join(", ")
    )]
    AmbiguousAssembly {
        taxid: Taxid,
        candidates: Vec<String>,
    },

    #[error("invalid assembly selector: {0}")]
    InvalidAssemblySelector(String),

    #[error("assembly {assembly} is not listed on NCBI for taxid {taxid}")]
    UnknownAssembly { taxid: Taxid, assembly: String },

    #[error("network error while fetching {data_type} for taxid {taxid}: {message}")]
    Network {
        taxid: Taxid,
        data_type: DataType,
        message: String,
    },

    #[error("NCBI returned status {status} for {data_type} of taxid {taxid}: {message}")]
    NcbiStatus {
        taxid: Taxid,
        data_type: DataType,
        status: u16,
        message: String,
    },

    #[error("{data_type} for taxid {taxid} is not cached locally and autodownload is disabled")]
    NotCached { taxid: Taxid, data_type: DataType },

    #[error("required tool not found: {program}")]
    #[diagnostic(help("install it or point the `tools` section of the config at it"))]
    ToolNotFound {
        program: String,
        /// Artifact the tool was needed for, when known.
        taxid: Option<Taxid>,
        data_type: Option<DataType>,
    },

    #[error("building {data_type} for taxid {taxid} failed: {diagnostics}")]
    BuildFailed {
        taxid: Taxid,
        data_type: DataType,
        diagnostics: String,
    },

    #[error("query against {data_type} of taxid {taxid} failed: {diagnostics}")]
    QueryFailed {
        taxid: Taxid,
        data_type: DataType,
        diagnostics: String,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse cached metadata at {path}: {message}")]
    MetadataParse { path: String, message: String },

    #[error("failed to parse sequence records in {path}: {message}")]
    SequenceParse { path: String, message: String },

    #[error("config file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl CollectorError {
    pub fn tool_not_found(program: impl Into<String>) -> Self {
        CollectorError::ToolNotFound {
            program: program.into(),
            taxid: None,
            data_type: None,
        }
    }

    /// Attaches the artifact being produced to a `ToolNotFound` raised by a runner.
    pub fn for_artifact(self, taxid: &Taxid, data_type: DataType) -> Self {
        match self {
            CollectorError::ToolNotFound { program, .. } => CollectorError::ToolNotFound {
                program,
                taxid: Some(taxid.clone()),
                data_type: Some(data_type),
            },
            other => other,
        }
    }

    /// True for failures a caller may retry as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            CollectorError::Network { .. } => true,
            CollectorError::NcbiStatus { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}
