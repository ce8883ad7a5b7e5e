//! The local cache manager.
//!
//! Presence on disk is the only state: an artifact is cached when its final
//! file (for databases, the marker file) exists and is non-empty. Missing
//! artifacts are produced by walking their origin chain
//! (database -> raw -> compressed -> metadata), each step doing its work at
//! most once because every step starts with the same presence check.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::builder::{BuildOutcome, DatabaseBuilder};
use crate::config::{CollectionConfig, ToolPrograms};
use crate::domain::{ArtifactKind, AssemblySelector, DataType, Origin, Taxid};
use crate::error::CollectorError;
use crate::fetcher::Fetcher;
use crate::ncbi::NcbiClient;
use crate::query::{QueryRequest, QueryRunner};
use crate::seqio::{self, SequenceFormat, SequenceRecord};
use crate::store::{MetadataRecord, Store};
use crate::tools::ToolRunner;

#[derive(Debug, Clone, Serialize)]
pub struct CachedName {
    pub taxid: Taxid,
    pub scientific_name: String,
}

pub struct Collection<R: NcbiClient, T: ToolRunner> {
    store: Store,
    repository: R,
    tools: T,
    programs: ToolPrograms,
    autodownload: bool,
}

impl<R: NcbiClient, T: ToolRunner> Collection<R, T> {
    pub fn new(config: &CollectionConfig, repository: R, tools: T) -> Self {
        Self {
            store: Store::new(config.root()),
            repository,
            tools,
            programs: config.tools.clone(),
            autodownload: config.autodownload,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        self.store.root()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    pub fn autodownload(&self) -> bool {
        self.autodownload
    }

    pub fn set_autodownload(&mut self, enabled: bool) {
        self.autodownload = enabled;
    }

    /// Resolved path; a stem for database types. No I/O.
    pub fn path(&self, taxid: &Taxid, data_type: DataType) -> Utf8PathBuf {
        self.store.path(taxid, data_type)
    }

    pub fn has(&self, taxid: &Taxid, data_type: DataType) -> bool {
        self.store.has(taxid, data_type)
    }

    /// Returns the artifact's path, fetching, decompressing or building it and
    /// everything it depends on first if it is not cached yet.
    pub fn ensure(&self, taxid: &Taxid, data_type: DataType) -> Result<Utf8PathBuf, CollectorError> {
        let path = self.store.path(taxid, data_type);
        if self.store.has(taxid, data_type) {
            tracing::debug!(%taxid, %data_type, "cache hit");
            return Ok(path);
        }

        match data_type.origin() {
            Origin::RemoteMetadata => {
                self.require_autodownload(taxid, data_type)?;
                self.store.ensure_root()?;
                Fetcher::new(&self.store, &self.repository).fetch_metadata(taxid, None)?;
            }
            Origin::RemoteDownload => {
                let metadata = self.metadata(taxid)?;
                self.require_autodownload(taxid, data_type)?;
                Fetcher::new(&self.store, &self.repository).fetch_sequence(&metadata, data_type)?;
            }
            Origin::Decompress(source) => {
                self.ensure(taxid, source)?;
                // Downloading the archive normally inflates it as well.
                if !self.store.has(taxid, data_type) {
                    Fetcher::new(&self.store, &self.repository).decompress(taxid, data_type)?;
                }
            }
            Origin::Build(source) => {
                let source_path = self.ensure(taxid, source)?;
                DatabaseBuilder::new(&self.tools, &self.programs).build(
                    taxid,
                    data_type,
                    &source_path,
                    &path,
                )?;
            }
        }
        Ok(path)
    }

    /// Builds a search database (and its prerequisites) if needed; returns the stem.
    pub fn build_database(
        &self,
        taxid: &Taxid,
        data_type: DataType,
    ) -> Result<Utf8PathBuf, CollectorError> {
        if !data_type.is_database() {
            return Err(CollectorError::InvalidDataType(format!(
                "{data_type} is not a database type"
            )));
        }
        self.ensure(taxid, data_type)
    }

    /// Rebuilds a database from scratch, keeping the sequence files.
    pub fn rebuild_database(
        &self,
        taxid: &Taxid,
        data_type: DataType,
    ) -> Result<BuildOutcome, CollectorError> {
        if !data_type.is_database() {
            return Err(CollectorError::InvalidDataType(format!(
                "{data_type} is not a database type"
            )));
        }
        let Origin::Build(source) = data_type.origin() else {
            return Err(CollectorError::InvalidDataType(data_type.to_string()));
        };
        self.store.remove_artifact(taxid, data_type)?;
        let source_path = self.ensure(taxid, source)?;
        let stem = self.store.path(taxid, data_type);
        DatabaseBuilder::new(&self.tools, &self.programs).build(taxid, data_type, &source_path, &stem)
    }

    pub fn query(
        &self,
        taxid: &Taxid,
        data_type: DataType,
        request: &QueryRequest,
    ) -> Result<String, CollectorError> {
        if !matches!(data_type, DataType::NuclBlastdb | DataType::ProtBlastdb) {
            return Err(CollectorError::InvalidDataType(format!(
                "{data_type} cannot be queried"
            )));
        }
        let stem = self.ensure(taxid, data_type)?;
        QueryRunner::new(&self.tools, &self.programs).run(taxid, data_type, &stem, request)
    }

    /// Parsed records of a FASTA or GenBank artifact, caching it first if needed.
    pub fn records(
        &self,
        taxid: &Taxid,
        data_type: DataType,
    ) -> Result<Vec<SequenceRecord>, CollectorError> {
        let format = SequenceFormat::for_data_type(data_type).ok_or_else(|| {
            CollectorError::InvalidDataType(format!("{data_type} has no sequence records"))
        })?;
        let path = self.ensure(taxid, data_type)?;
        seqio::read_records(&path, format)
    }

    /// Cached metadata for the taxid, fetched on first use.
    pub fn metadata(&self, taxid: &Taxid) -> Result<MetadataRecord, CollectorError> {
        let path = self.ensure(taxid, DataType::Metadata)?;
        Store::read_metadata(&path)
    }

    /// Re-fetches and replaces the metadata record, optionally choosing among
    /// several NCBI assemblies. Sequence files already cached are kept.
    pub fn refresh_metadata(
        &self,
        taxid: &Taxid,
        selector: Option<&AssemblySelector>,
    ) -> Result<MetadataRecord, CollectorError> {
        self.require_autodownload(taxid, DataType::Metadata)?;
        self.store.ensure_root()?;
        Fetcher::new(&self.store, &self.repository).fetch_metadata(taxid, selector)
    }

    /// Taxids with at least one cached artifact, or with `filter` cached.
    pub fn list_cached(&self, filter: Option<DataType>) -> Result<Vec<Taxid>, CollectorError> {
        let taxids = self.store.taxids()?;
        Ok(taxids
            .into_iter()
            .filter(|taxid| match filter {
                Some(data_type) => self.store.has(taxid, data_type),
                None => DataType::ALL
                    .into_iter()
                    .any(|data_type| self.store.has(taxid, data_type)),
            })
            .collect())
    }

    /// Scientific names of every taxid with cached metadata, sorted by name.
    pub fn list_names(&self) -> Result<Vec<CachedName>, CollectorError> {
        let mut names = Vec::new();
        for taxid in self.list_cached(Some(DataType::Metadata))? {
            let record = Store::read_metadata(&self.store.path(&taxid, DataType::Metadata))?;
            names.push(CachedName {
                taxid,
                scientific_name: record.scientific_name,
            });
        }
        names.sort_by(|a, b| a.scientific_name.cmp(&b.scientific_name));
        Ok(names)
    }

    /// Deletes one artifact, or the whole taxid entry when `data_type` is
    /// `None`. Absent artifacts are a no-op. Removing a raw sequence file also
    /// removes the databases built from it.
    pub fn remove(
        &self,
        taxid: &Taxid,
        data_type: Option<DataType>,
    ) -> Result<Vec<Utf8PathBuf>, CollectorError> {
        let removed = match data_type {
            None => self.store.remove_taxid(taxid)?,
            Some(data_type) => {
                let mut removed = Vec::new();
                if data_type.kind() == ArtifactKind::Raw {
                    for dependent in data_type.dependents() {
                        removed.extend(self.store.remove_artifact(taxid, dependent)?);
                    }
                }
                removed.extend(self.store.remove_artifact(taxid, data_type)?);
                removed
            }
        };
        if !removed.is_empty() {
            tracing::info!(%taxid, files = removed.len(), "removed cached files");
        }
        Ok(removed)
    }

    /// Removes every taxid entry in the collection.
    pub fn clear(&self) -> Result<Vec<Utf8PathBuf>, CollectorError> {
        let mut removed = Vec::new();
        for taxid in self.store.taxids()? {
            removed.extend(self.store.remove_taxid(&taxid)?);
        }
        Ok(removed)
    }

    fn require_autodownload(&self, taxid: &Taxid, data_type: DataType) -> Result<(), CollectorError> {
        if self.autodownload {
            return Ok(());
        }
        Err(CollectorError::NotCached {
            taxid: taxid.clone(),
            data_type,
        })
    }
}
