use camino::Utf8PathBuf;

use crate::domain::{ArtifactKind, AssemblySelector, DataType, Taxid};
use crate::error::CollectorError;
use crate::fs_util;
use crate::ncbi::NcbiClient;
use crate::store::{MetadataRecord, Store};

/// Puts remote data at its resolved path. Every write lands in a hidden temp
/// file first and is renamed into place only once complete.
pub struct Fetcher<'a, R: NcbiClient> {
    store: &'a Store,
    client: &'a R,
}

impl<'a, R: NcbiClient> Fetcher<'a, R> {
    pub fn new(store: &'a Store, client: &'a R) -> Self {
        Self { store, client }
    }

    pub fn fetch_metadata(
        &self,
        taxid: &Taxid,
        selector: Option<&AssemblySelector>,
    ) -> Result<MetadataRecord, CollectorError> {
        let record = self.client.fetch_metadata(taxid, selector)?;
        let path = self.store.path(taxid, DataType::Metadata);
        Store::write_metadata(&path, &record)?;
        tracing::info!(%taxid, name = %record.scientific_name, assembly = %record.assembly_id, "cached metadata");
        Ok(record)
    }

    /// Downloads a compressed type, then inflates it next to the archive.
    /// The archive is kept.
    pub fn fetch_sequence(
        &self,
        metadata: &MetadataRecord,
        data_type: DataType,
    ) -> Result<Utf8PathBuf, CollectorError> {
        if data_type.kind() != ArtifactKind::Compressed {
            return Err(CollectorError::InvalidDataType(format!(
                "{data_type} is not a downloadable type"
            )));
        }
        let taxid = &metadata.taxid;
        let path = self.store.path(taxid, data_type);

        let temp = Store::temp_for(&path)?;
        self.client
            .download_sequence(metadata, data_type, temp.path())?;
        let temp_path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .map_err(|_| CollectorError::Filesystem("non-utf8 temp path".to_string()))?;
        // A truncated or non-gzip body is a bad transfer; the temp file is dropped.
        fs_util::validate_gz(&temp_path).map_err(|err| CollectorError::Network {
            taxid: taxid.clone(),
            data_type,
            message: err.to_string(),
        })?;
        Store::persist(temp, &path)?;
        tracing::info!(%taxid, %data_type, %path, "downloaded");

        if let Some(raw) = data_type.decompressed() {
            self.decompress(taxid, raw)?;
        }
        Ok(path)
    }

    /// Inflates the cached archive behind a raw type.
    pub fn decompress(&self, taxid: &Taxid, raw: DataType) -> Result<Utf8PathBuf, CollectorError> {
        let source = DataType::ALL
            .into_iter()
            .find(|candidate| candidate.decompressed() == Some(raw))
            .ok_or_else(|| {
                CollectorError::InvalidDataType(format!("{raw} has no compressed source"))
            })?;
        let gz_path = self.store.path(taxid, source);
        let target = self.store.path(taxid, raw);
        let bytes = fs_util::decompress_gz(&gz_path, &target)?;
        tracing::info!(%taxid, data_type = %raw, bytes, "decompressed");
        Ok(target)
    }
}
