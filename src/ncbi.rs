use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::config::NcbiSettings;
use crate::domain::{AssemblySelector, DataType, Taxid};
use crate::error::CollectorError;
use crate::store::MetadataRecord;

/// Remote genome repository. Implementations write the raw transfer bytes
/// (gzip for sequence files) to `destination` and nothing else.
pub trait NcbiClient: Send + Sync {
    fn fetch_metadata(
        &self,
        taxid: &Taxid,
        selector: Option<&AssemblySelector>,
    ) -> Result<MetadataRecord, CollectorError>;

    fn download_sequence(
        &self,
        metadata: &MetadataRecord,
        data_type: DataType,
        destination: &Path,
    ) -> Result<(), CollectorError>;
}

pub struct NcbiHttpClient {
    client: Client,
    settings: NcbiSettings,
    last_request: Mutex<Option<Instant>>,
}

impl NcbiHttpClient {
    pub fn new(settings: NcbiSettings) -> Result<Self, CollectorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("genome-collector/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CollectorError::ConfigParse(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| CollectorError::ConfigParse(err.to_string()))?;
        Ok(Self {
            client,
            settings,
            last_request: Mutex::new(None),
        })
    }

    fn eutils_request(&self, endpoint: &str, params: &[(&str, String)]) -> RequestBuilder {
        let url = format!("{}/{endpoint}", self.settings.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .get(url)
            .query(params)
            .query(&[("retmode", "json"), ("tool", "genome-collector")]);
        if let Some(email) = &self.settings.email {
            request = request.query(&[("email", email.as_str())]);
        }
        if let Some(api_key) = &self.settings.api_key {
            request = request.query(&[("api_key", api_key.as_str())]);
        }
        request
    }

    fn eutils_json(
        &self,
        taxid: &Taxid,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, CollectorError> {
        let response = self.send(taxid, DataType::Metadata, || {
            self.eutils_request(endpoint, params)
        })?;
        let response = check_status(response, taxid, DataType::Metadata)?;
        response.json().map_err(|err| CollectorError::Network {
            taxid: taxid.clone(),
            data_type: DataType::Metadata,
            message: format!("invalid E-utilities response: {err}"),
        })
    }

    /// Keeps requests at least `request_interval_ms` apart.
    fn throttle(&self) {
        let interval = Duration::from_millis(self.settings.request_interval_ms);
        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn send<F>(
        &self,
        taxid: &Taxid,
        data_type: DataType,
        mut make_req: F,
    ) -> Result<Response, CollectorError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let max_retries = self.settings.max_retries;
        let mut attempt = 0usize;
        loop {
            self.throttle();
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < max_retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(%taxid, %data_type, status, attempt, "retrying NCBI request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < max_retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::warn!(%taxid, %data_type, error = %err, attempt, "retrying NCBI request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(CollectorError::Network {
                        taxid: taxid.clone(),
                        data_type,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

impl NcbiClient for NcbiHttpClient {
    fn fetch_metadata(
        &self,
        taxid: &Taxid,
        selector: Option<&AssemblySelector>,
    ) -> Result<MetadataRecord, CollectorError> {
        tracing::info!(%taxid, "looking up taxonomy on NCBI");
        let taxonomy = self.eutils_json(
            taxid,
            "esummary.fcgi",
            &[("db", "taxonomy".to_string()), ("id", taxid.to_string())],
        )?;
        let summary = parse_taxonomy_summary(&taxonomy, taxid)?;

        let search = self.eutils_json(
            taxid,
            "esearch.fcgi",
            &[
                ("db", "assembly".to_string()),
                ("term", format!("txid{taxid}[Organism:noexp]")),
                ("retmax", "500".to_string()),
            ],
        )?;
        let candidates = parse_id_list(&search, taxid)?;
        let assembly_id = select_assembly(taxid, &candidates, selector)?;

        let assembly = self.eutils_json(
            taxid,
            "esummary.fcgi",
            &[("db", "assembly".to_string()), ("id", assembly_id.clone())],
        )?;
        let assembly = parse_assembly_summary(&assembly, taxid, &assembly_id)?;

        Ok(MetadataRecord {
            taxid: taxid.clone(),
            scientific_name: summary.scientific_name,
            kingdom: summary.kingdom,
            rank: summary.rank,
            assembly_id,
            assembly_accession: assembly.accession,
            assembly_name: assembly.name,
            ftp_path: Some(assembly.ftp_path),
            source: "ncbi".to_string(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn download_sequence(
        &self,
        metadata: &MetadataRecord,
        data_type: DataType,
        destination: &Path,
    ) -> Result<(), CollectorError> {
        let taxid = &metadata.taxid;
        let url = metadata
            .ftp_path
            .as_deref()
            .and_then(|ftp_path| sequence_url(ftp_path, data_type))
            .ok_or_else(|| CollectorError::IdentifierNotFound {
                taxid: taxid.clone(),
                data_type,
            })?;
        tracing::info!(%taxid, %data_type, %url, "downloading from NCBI");
        let response = self.send(taxid, data_type, || self.client.get(&url))?;
        let mut response = check_status(response, taxid, data_type)?;
        let file =
            File::create(destination).map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        let mut writer = BufWriter::new(file);
        let bytes = copy_body(&mut response, &mut writer, taxid, data_type)?;
        writer
            .flush()
            .map_err(|err| CollectorError::Filesystem(format!("write download: {err}")))?;
        tracing::debug!(%taxid, %data_type, bytes, "download complete");
        Ok(())
    }
}

/// Streams a response body into `writer`. Read failures are transport errors;
/// write failures are local.
pub fn copy_body<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    taxid: &Taxid,
    data_type: DataType,
) -> Result<u64, CollectorError> {
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(CollectorError::Network {
                    taxid: taxid.clone(),
                    data_type,
                    message: err.to_string(),
                });
            }
        };
        writer
            .write_all(&buffer[..read])
            .map_err(|err| CollectorError::Filesystem(format!("write download: {err}")))?;
        total += read as u64;
    }
}

fn check_status(
    response: Response,
    taxid: &Taxid,
    data_type: DataType,
) -> Result<Response, CollectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(CollectorError::IdentifierNotFound {
            taxid: taxid.clone(),
            data_type,
        });
    }
    let message = response
        .text()
        .unwrap_or_else(|_| "NCBI request failed".to_string());
    Err(CollectorError::NcbiStatus {
        taxid: taxid.clone(),
        data_type,
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomySummary {
    pub scientific_name: String,
    pub kingdom: Option<String>,
    pub rank: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblySummary {
    pub accession: Option<String>,
    pub name: Option<String>,
    pub ftp_path: String,
}

/// Reads an `esummary db=taxonomy` JSON document. A missing uid entry or one
/// carrying an `error` field means NCBI does not know the taxid; a document
/// without `result` or with a top-level error is a remote failure.
pub fn parse_taxonomy_summary(doc: &Value, taxid: &Taxid) -> Result<TaxonomySummary, CollectorError> {
    let not_found = || CollectorError::IdentifierNotFound {
        taxid: taxid.clone(),
        data_type: DataType::Metadata,
    };
    check_eutils_error(doc, taxid)?;
    let result = doc
        .get("result")
        .ok_or_else(|| malformed(taxid, "taxonomy esummary has no result"))?;
    let entry = result.get(taxid.as_str()).ok_or_else(not_found)?;
    if entry.get("error").is_some() {
        return Err(not_found());
    }
    let scientific_name = entry_text(entry, "scientificname").ok_or_else(not_found)?;
    Ok(TaxonomySummary {
        scientific_name,
        kingdom: entry_text(entry, "genbankdivision").or_else(|| entry_text(entry, "division")),
        rank: entry_text(entry, "rank"),
    })
}

/// Assembly uids from an `esearch` document. No hits is an empty list; an
/// `ERROR` field or a missing `idlist` is a remote failure.
pub fn parse_id_list(doc: &Value, taxid: &Taxid) -> Result<Vec<String>, CollectorError> {
    check_eutils_error(doc, taxid)?;
    let search = doc
        .get("esearchresult")
        .ok_or_else(|| malformed(taxid, "esearch response has no esearchresult"))?;
    if let Some(message) = search.get("ERROR").and_then(Value::as_str) {
        return Err(malformed(taxid, &format!("esearch failed: {message}")));
    }
    let ids = search
        .get("idlist")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(taxid, "esearch response has no idlist"))?;
    Ok(ids
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

pub fn select_assembly(
    taxid: &Taxid,
    candidates: &[String],
    selector: Option<&AssemblySelector>,
) -> Result<String, CollectorError> {
    match (candidates, selector) {
        ([], _) => Err(CollectorError::IdentifierNotFound {
            taxid: taxid.clone(),
            data_type: DataType::Metadata,
        }),
        (_, Some(selector)) => selector.select(taxid, candidates),
        ([only], None) => Ok(only.clone()),
        (_, None) => Err(CollectorError::AmbiguousAssembly {
            taxid: taxid.clone(),
            candidates: candidates.to_vec(),
        }),
    }
}

/// Reads an `esummary db=assembly` document for an id esearch just returned,
/// so a missing or failed entry is a remote failure. An assembly without any
/// FTP directory has no downloadable files.
pub fn parse_assembly_summary(
    doc: &Value,
    taxid: &Taxid,
    assembly_id: &str,
) -> Result<AssemblySummary, CollectorError> {
    check_eutils_error(doc, taxid)?;
    let entry = doc
        .get("result")
        .and_then(|result| result.get(assembly_id))
        .ok_or_else(|| malformed(taxid, &format!("no esummary entry for assembly {assembly_id}")))?;
    if let Some(message) = entry.get("error").and_then(Value::as_str) {
        return Err(malformed(
            taxid,
            &format!("esummary failed for assembly {assembly_id}: {message}"),
        ));
    }
    let ftp_path = entry_text(entry, "ftppath_refseq")
        .or_else(|| entry_text(entry, "ftppath_genbank"))
        .ok_or_else(|| CollectorError::IdentifierNotFound {
            taxid: taxid.clone(),
            data_type: DataType::GenomicGz,
        })?;
    Ok(AssemblySummary {
        accession: entry_text(entry, "assemblyaccession"),
        name: entry_text(entry, "assemblyname"),
        ftp_path,
    })
}

fn check_eutils_error(doc: &Value, taxid: &Taxid) -> Result<(), CollectorError> {
    match doc.get("error").or_else(|| doc.get("ERROR")).and_then(Value::as_str) {
        Some(message) => Err(malformed(taxid, &format!("E-utilities error: {message}"))),
        None => Ok(()),
    }
}

fn malformed(taxid: &Taxid, message: &str) -> CollectorError {
    CollectorError::Network {
        taxid: taxid.clone(),
        data_type: DataType::Metadata,
        message: message.to_string(),
    }
}

fn entry_text(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// HTTPS URL of a compressed sequence file inside an NCBI assembly directory.
pub fn sequence_url(ftp_path: &str, data_type: DataType) -> Option<String> {
    let suffix = match data_type {
        DataType::GenomicGz => "_genomic.fna.gz",
        DataType::ProteinGz => "_protein.faa.gz",
        DataType::GenbankGz => "_genomic.gbff.gz",
        DataType::GffGz => "_genomic.gff.gz",
        _ => return None,
    };
    let base = ftp_path.trim_end_matches('/');
    let basename = base.rsplit('/').next().filter(|name| !name.is_empty())?;
    let base = match base.strip_prefix("ftp://") {
        Some(rest) => format!("https://{rest}"),
        None => base.to_string(),
    };
    Some(format!("{base}/{basename}{suffix}"))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
