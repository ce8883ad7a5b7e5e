use std::fs;

use camino::Utf8Path;

use crate::config::ToolPrograms;
use crate::domain::{DataType, Taxid};
use crate::error::CollectorError;
use crate::store::Store;
use crate::tools::{ToolInvocation, ToolRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    AlreadyPresent,
}

/// Runs `makeblastdb` / `bowtie-build` / `bowtie2-build` over a sequence file.
pub struct DatabaseBuilder<'a, T: ToolRunner> {
    runner: &'a T,
    programs: &'a ToolPrograms,
}

impl<'a, T: ToolRunner> DatabaseBuilder<'a, T> {
    pub fn new(runner: &'a T, programs: &'a ToolPrograms) -> Self {
        Self { runner, programs }
    }

    /// Builds the database at `stem` unless its marker file already exists.
    /// `source` must already be present and decompressed.
    pub fn build(
        &self,
        taxid: &Taxid,
        data_type: DataType,
        source: &Utf8Path,
        stem: &Utf8Path,
    ) -> Result<BuildOutcome, CollectorError> {
        let markers = Store::database_markers(stem, data_type);
        if markers.is_empty() {
            return Err(CollectorError::InvalidDataType(format!(
                "{data_type} is not a database type"
            )));
        }
        if Store::any_present(&markers) {
            tracing::debug!(%taxid, %data_type, "database already built");
            return Ok(BuildOutcome::AlreadyPresent);
        }
        if let Some(dir) = stem.parent() {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        }

        let invocation = build_invocation(self.programs, data_type, source, stem)?;
        tracing::info!(%taxid, %data_type, program = %invocation.program, "building database");
        let output = self
            .runner
            .run(&invocation)
            .map_err(|err| err.for_artifact(taxid, data_type))?;
        if !output.success {
            return Err(CollectorError::BuildFailed {
                taxid: taxid.clone(),
                data_type,
                diagnostics: output.diagnostics(),
            });
        }
        if !Store::any_present(&markers) {
            let expected = markers
                .iter()
                .map(|marker| marker.as_str())
                .collect::<Vec<_>>()
                .join(" or ");
            let mut diagnostics =
                format!("{} exited successfully but {expected} is missing", invocation.program);
            let detail = output.stderr.trim();
            if !detail.is_empty() {
                diagnostics.push_str(": ");
                diagnostics.push_str(detail);
            }
            return Err(CollectorError::BuildFailed {
                taxid: taxid.clone(),
                data_type,
                diagnostics,
            });
        }
        tracing::info!(%taxid, %data_type, %stem, "database built");
        Ok(BuildOutcome::Built)
    }
}

pub fn build_invocation(
    programs: &ToolPrograms,
    data_type: DataType,
    source: &Utf8Path,
    stem: &Utf8Path,
) -> Result<ToolInvocation, CollectorError> {
    let invocation = match data_type {
        DataType::NuclBlastdb | DataType::ProtBlastdb => {
            let dbtype = if data_type == DataType::NuclBlastdb {
                "nucl"
            } else {
                "prot"
            };
            ToolInvocation::new(&programs.makeblastdb).args([
                "-in",
                source.as_str(),
                "-dbtype",
                dbtype,
                "-out",
                stem.as_str(),
            ])
        }
        DataType::Bowtie1Index => {
            ToolInvocation::new(&programs.bowtie_build).args([source.as_str(), stem.as_str()])
        }
        DataType::Bowtie2Index => {
            ToolInvocation::new(&programs.bowtie2_build).args([source.as_str(), stem.as_str()])
        }
        other => {
            return Err(CollectorError::InvalidDataType(format!(
                "{other} is not a database type"
            )));
        }
    };
    Ok(invocation)
}
