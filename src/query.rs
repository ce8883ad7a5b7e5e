use std::io::Write;
use std::path::PathBuf;

use camino::Utf8Path;
use tempfile::NamedTempFile;

use crate::config::ToolPrograms;
use crate::domain::{DataType, Taxid};
use crate::error::CollectorError;
use crate::tools::{ToolInvocation, ToolRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryInput {
    /// Raw residues or a FASTA record given inline.
    Sequence(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: QueryInput,
    /// BLAST program to run; defaults to `blastn`/`blastp` by database type.
    pub program: Option<String>,
    /// Passed through to the search tool untouched.
    pub extra_args: Vec<String>,
}

impl QueryRequest {
    pub fn sequence(sequence: impl Into<String>) -> Self {
        Self {
            query: QueryInput::Sequence(sequence.into()),
            program: None,
            extra_args: Vec::new(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            query: QueryInput::File(path.into()),
            program: None,
            extra_args: Vec::new(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

pub struct QueryRunner<'a, T: ToolRunner> {
    runner: &'a T,
    programs: &'a ToolPrograms,
}

impl<'a, T: ToolRunner> QueryRunner<'a, T> {
    pub fn new(runner: &'a T, programs: &'a ToolPrograms) -> Self {
        Self { runner, programs }
    }

    /// Searches a built BLAST database and returns the tool's stdout.
    pub fn run(
        &self,
        taxid: &Taxid,
        data_type: DataType,
        stem: &Utf8Path,
        request: &QueryRequest,
    ) -> Result<String, CollectorError> {
        let program = match (&request.program, data_type) {
            (Some(program), DataType::NuclBlastdb | DataType::ProtBlastdb) => program.clone(),
            (None, DataType::NuclBlastdb) => self.programs.blastn.clone(),
            (None, DataType::ProtBlastdb) => self.programs.blastp.clone(),
            (_, other) => {
                return Err(CollectorError::InvalidDataType(format!(
                    "{other} cannot be queried"
                )));
            }
        };

        // Keeps an inline query alive until the tool has finished.
        let mut inline: Option<NamedTempFile> = None;
        let query_path = match &request.query {
            QueryInput::File(path) => path.to_string_lossy().to_string(),
            QueryInput::Sequence(sequence) => {
                let file = write_query_fasta(sequence)?;
                let path = file.path().to_string_lossy().to_string();
                inline = Some(file);
                path
            }
        };

        let invocation = ToolInvocation::new(program)
            .args(["-db", stem.as_str(), "-query", query_path.as_str()])
            .args(request.extra_args.iter().cloned());
        tracing::info!(%taxid, %data_type, program = %invocation.program, "running search");
        let output = self
            .runner
            .run(&invocation)
            .map_err(|err| err.for_artifact(taxid, data_type))?;
        drop(inline);

        if !output.success {
            return Err(CollectorError::QueryFailed {
                taxid: taxid.clone(),
                data_type,
                diagnostics: output.diagnostics(),
            });
        }
        Ok(output.stdout)
    }
}

fn write_query_fasta(sequence: &str) -> Result<NamedTempFile, CollectorError> {
    let mut file = tempfile::Builder::new()
        .prefix("genome-collector-query")
        .suffix(".fa")
        .tempfile()
        .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
    let trimmed = sequence.trim();
    let content = if trimmed.starts_with('>') {
        format!("{trimmed}\n")
    } else {
        format!(">query\n{trimmed}\n")
    };
    file.write_all(content.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
    Ok(file)
}
