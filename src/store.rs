use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};

use crate::domain::{ArtifactKind, DataType, Taxid};
use crate::error::CollectorError;

/// On-disk layout of one collection: `<root>/<taxid>/<file>`.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn taxid_dir(&self, taxid: &Taxid) -> Utf8PathBuf {
        self.root.join(taxid.as_str())
    }

    /// Canonical path for an artifact. Databases resolve to their stem.
    pub fn path(&self, taxid: &Taxid, data_type: DataType) -> Utf8PathBuf {
        Self::resolve(&self.root, taxid, data_type)
    }

    pub fn resolve(root: &Utf8Path, taxid: &Taxid, data_type: DataType) -> Utf8PathBuf {
        let dir = root.join(taxid.as_str());
        let id = taxid.as_str();
        match data_type {
            DataType::Metadata => dir.join(format!("{id}.json")),
            DataType::GenomicGz => dir.join(format!("{id}_genomic.fna.gz")),
            DataType::ProteinGz => dir.join(format!("{id}_protein.faa.gz")),
            DataType::GenbankGz => dir.join(format!("{id}_genomic.gbff.gz")),
            DataType::GffGz => dir.join(format!("{id}_genomic.gff.gz")),
            DataType::GenomicFasta => dir.join(format!("{id}_genomic.fa")),
            DataType::ProteinFasta => dir.join(format!("{id}_protein.fa")),
            DataType::GenomicGenbank => dir.join(format!("{id}_genomic.gb")),
            DataType::GenomicGff => dir.join(format!("{id}_genomic.gff")),
            DataType::NuclBlastdb => dir.join("blastdb_nucl").join(id),
            DataType::ProtBlastdb => dir.join("blastdb_prot").join(id),
            DataType::Bowtie1Index => dir.join("bowtie1").join(id),
            DataType::Bowtie2Index => dir.join("bowtie2").join(id),
        }
    }

    pub fn resolve_named(
        root: &Utf8Path,
        taxid: &Taxid,
        data_type: &str,
    ) -> Result<Utf8PathBuf, CollectorError> {
        Ok(Self::resolve(root, taxid, data_type.parse()?))
    }

    /// Files any one of which means the artifact is complete.
    pub fn marker_paths(&self, taxid: &Taxid, data_type: DataType) -> Vec<Utf8PathBuf> {
        let path = self.path(taxid, data_type);
        if data_type.is_database() {
            Self::database_markers(&path, data_type)
        } else {
            vec![path]
        }
    }

    pub fn database_markers(stem: &Utf8Path, data_type: DataType) -> Vec<Utf8PathBuf> {
        data_type
            .marker_extensions()
            .iter()
            .map(|ext| Utf8PathBuf::from(format!("{stem}.{ext}")))
            .collect()
    }

    pub fn has(&self, taxid: &Taxid, data_type: DataType) -> bool {
        Self::any_present(&self.marker_paths(taxid, data_type))
    }

    /// True when at least one of `paths` is a non-empty regular file.
    pub fn any_present(paths: &[Utf8PathBuf]) -> bool {
        paths.iter().any(|path| is_non_empty_file(path))
    }

    pub fn ensure_root(&self) -> Result<(), CollectorError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| CollectorError::Filesystem(err.to_string()))
    }

    /// Files making up a database: every sibling named `<stem>.*`.
    pub fn database_files(stem: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CollectorError> {
        let (Some(dir), Some(name)) = (stem.parent(), stem.file_name()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{name}.");
        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CollectorError::Filesystem(err.to_string())),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CollectorError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|_| CollectorError::Filesystem("non-utf8 file in database dir".to_string()))?;
            let matches = path
                .file_name()
                .map(|file| file.starts_with(&prefix))
                .unwrap_or(false);
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Taxids with a directory under the root, sorted lexicographically.
    pub fn taxids(&self) -> Result<Vec<Taxid>, CollectorError> {
        let entries = match fs::read_dir(self.root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CollectorError::Filesystem(err.to_string())),
        };
        let mut taxids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CollectorError::Filesystem(err.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(taxid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<Taxid>().ok())
            {
                taxids.push(taxid);
            }
        }
        taxids.sort();
        Ok(taxids)
    }

    /// Deletes one artifact. Already-absent files are not an error.
    pub fn remove_artifact(
        &self,
        taxid: &Taxid,
        data_type: DataType,
    ) -> Result<Vec<Utf8PathBuf>, CollectorError> {
        let path = self.path(taxid, data_type);
        if data_type.kind() != ArtifactKind::Database {
            return Ok(remove_file_if_present(&path)?.into_iter().collect());
        }
        let mut removed = Vec::new();
        for file in Self::database_files(&path)? {
            removed.extend(remove_file_if_present(&file)?);
        }
        if let Some(dir) = path.parent() {
            // Only succeeds once the database directory is empty.
            let _ = fs::remove_dir(dir.as_std_path());
        }
        Ok(removed)
    }

    pub fn remove_taxid(&self, taxid: &Taxid) -> Result<Vec<Utf8PathBuf>, CollectorError> {
        let dir = self.taxid_dir(taxid);
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut removed = walk_files(&dir)?;
        removed.sort();
        match fs::remove_dir_all(dir.as_std_path()) {
            Ok(()) => Ok(removed),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(CollectorError::Filesystem(err.to_string())),
        }
    }

    /// Temp file next to `path`, hidden so it never looks like a cached artifact.
    pub fn temp_for(path: &Utf8Path) -> Result<NamedTempFile, CollectorError> {
        let parent = path
            .parent()
            .ok_or_else(|| CollectorError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        let prefix = format!(".{}.", path.file_name().unwrap_or("artifact"));
        Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CollectorError::Filesystem(err.to_string()))
    }

    pub fn persist(temp: NamedTempFile, path: &Utf8Path) -> Result<(), CollectorError> {
        temp.persist(path.as_std_path())
            .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CollectorError> {
        let temp = Self::temp_for(path)?;
        fs::write(temp.path(), content).map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        Self::persist(temp, path)
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &MetadataRecord) -> Result<(), CollectorError> {
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_metadata(path: &Utf8Path) -> Result<MetadataRecord, CollectorError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CollectorError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| CollectorError::MetadataParse {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

/// Descriptive record for one taxid, cached as `<taxid>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub taxid: Taxid,
    pub scientific_name: String,
    #[serde(default)]
    pub kingdom: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    pub assembly_id: String,
    #[serde(default)]
    pub assembly_accession: Option<String>,
    #[serde(default)]
    pub assembly_name: Option<String>,
    #[serde(default)]
    pub ftp_path: Option<String>,
    pub source: String,
    pub fetched_at: String,
}

fn is_non_empty_file(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn remove_file_if_present(path: &Utf8Path) -> Result<Option<Utf8PathBuf>, CollectorError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(Some(path.to_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CollectorError::Filesystem(format!("remove {path}: {err}"))),
    }
}

fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CollectorError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(path.as_std_path())
            .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| CollectorError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    Ok(items)
}
