#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use genome_collector::collection::Collection;
use genome_collector::config::CollectionConfig;
use genome_collector::domain::{AssemblySelector, DataType, Taxid};
use genome_collector::error::CollectorError;
use genome_collector::ncbi::NcbiClient;
use genome_collector::store::MetadataRecord;
use genome_collector::tools::{ToolInvocation, ToolOutput, ToolRunner};

pub const ECOLI: &str = "511145";
pub const YEAST: &str = "559292";
pub const UNKNOWN: &str = "999999999";

pub const ECOLI_FASTA: &str = ">NC_000913.3 part 1\nAGCTTTTCATTCTGACTGCAACGGGCAATATGTCTCTGTGTGGATTAAAAAAAGAGTGTCTGATAGCAGC\n\
>NC_000913.3 part 2\nTTCTGAACTGGTTACCTGCCGTGAGTAAATTAAAATTTTATTGACTTAGGTCACTAAATACTTTAACCAA\n\
>NC_000913.3 part 3\nTATAGGCATAGCGCACAGACAGATAAAAATTACAGAGTACACAACATCCATGAAACGCATTAGCACCACC\n";

pub const ECOLI_PROTEINS: &str = ">NP_414542.1 thrL\nMKRISTTITTTITITTGNGAG\n>NP_414543.1 thrA\nMRVLKFGGTSVANAERFLRVADILESNARQGQ\n";

pub fn taxid(value: &str) -> Taxid {
    value.parse().unwrap()
}

pub fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

pub const ECOLI_GENBANK: &str = "\
LOCUS       NC_000913                210 bp    DNA     circular CON 09-MAR-2022
DEFINITION  Escherichia coli str. K-12 substr. MG1655, complete
            genome.
ACCESSION   NC_000913
VERSION     NC_000913.3
FEATURES             Location/Qualifiers
     source          1..210
                     /organism=\"Escherichia coli str. K-12 substr. MG1655\"
ORIGIN
        1 agcttttcat tctgactgca acgggcaata tgtctctgtg tggattaaaa aaagagtgtc
       61 tgatagcagc ttctgaactg gttacctgcc gtgagtaaat taaaatttta ttgacttagg
      121 tcactaaata ctttaaccaa tataggcata gcgcacagac agataaaaat tacagagtac
      181 acaacatcca tgaaacgcat tagcaccacc
//
";

/// How the next sequence download goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFailure {
    /// Half the archive arrives, then the connection drops.
    Truncated,
    /// The server answers 200 with an HTML/text body.
    PlainText,
}

/// In-memory NCBI stand-in counting every remote call.
pub struct FakeRepository {
    genomes: HashMap<String, (String, String, String)>,
    pub metadata_calls: Mutex<Vec<(Taxid, Option<AssemblySelector>)>>,
    pub downloads: Mutex<Vec<(Taxid, DataType)>>,
    next_failure: Mutex<Option<DownloadFailure>>,
}

impl FakeRepository {
    pub fn new() -> Self {
        let mut genomes = HashMap::new();
        genomes.insert(
            ECOLI.to_string(),
            (
                "Escherichia coli str. K-12 substr. MG1655".to_string(),
                ECOLI_FASTA.to_string(),
                ECOLI_PROTEINS.to_string(),
            ),
        );
        genomes.insert(
            YEAST.to_string(),
            (
                "Saccharomyces cerevisiae S288C".to_string(),
                ">NC_001133.9\nCCACACCACACCCACACACCCACACACCACACCACACACCACACCACACCCACACACACA\n".to_string(),
                ">NP_009332.1\nMSTTASTPSSTAS\n".to_string(),
            ),
        );
        Self {
            genomes,
            metadata_calls: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
        }
    }

    pub fn fail_next_download(&self, failure: DownloadFailure) {
        *self.next_failure.lock().unwrap() = Some(failure);
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata_calls.lock().unwrap().len()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl NcbiClient for FakeRepository {
    fn fetch_metadata(
        &self,
        taxid: &Taxid,
        selector: Option<&AssemblySelector>,
    ) -> Result<MetadataRecord, CollectorError> {
        self.metadata_calls
            .lock()
            .unwrap()
            .push((taxid.clone(), selector.cloned()));
        let (name, _, _) =
            self.genomes
                .get(taxid.as_str())
                .ok_or_else(|| CollectorError::IdentifierNotFound {
                    taxid: taxid.clone(),
                    data_type: DataType::Metadata,
                })?;
        let assembly_id = match selector {
            Some(AssemblySelector::Id(id)) => id.clone(),
            _ => format!("{taxid}01"),
        };
        Ok(MetadataRecord {
            taxid: taxid.clone(),
            scientific_name: name.clone(),
            kingdom: Some("Bacteria".to_string()),
            rank: Some("strain".to_string()),
            assembly_id,
            assembly_accession: Some(format!("GCF_{taxid}.1")),
            assembly_name: Some("ASM1v1".to_string()),
            ftp_path: Some(format!("ftp://fake.example/GCF_{taxid}.1_ASM1v1")),
            source: "fake".to_string(),
            fetched_at: "2024-01-01T00:00:00+00:00".to_string(),
        })
    }

    fn download_sequence(
        &self,
        metadata: &MetadataRecord,
        data_type: DataType,
        destination: &Path,
    ) -> Result<(), CollectorError> {
        self.downloads
            .lock()
            .unwrap()
            .push((metadata.taxid.clone(), data_type));
        let (_, genomic, protein) = self.genomes.get(metadata.taxid.as_str()).ok_or_else(|| {
            CollectorError::IdentifierNotFound {
                taxid: metadata.taxid.clone(),
                data_type,
            }
        })?;
        let payload = match data_type {
            DataType::GenomicGz => genomic.clone(),
            DataType::ProteinGz => protein.clone(),
            DataType::GenbankGz if metadata.taxid.as_str() == ECOLI => ECOLI_GENBANK.to_string(),
            DataType::GenbankGz => format!("LOCUS       {}\n//\n", metadata.taxid),
            DataType::GffGz => "##gff-version 3\n".to_string(),
            _ => unreachable!("only compressed types are downloaded"),
        };
        let archive = gzip(payload.as_bytes());
        match self.next_failure.lock().unwrap().take() {
            Some(DownloadFailure::Truncated) => {
                fs::write(destination, &archive[..archive.len() / 2]).unwrap();
                Err(CollectorError::Network {
                    taxid: metadata.taxid.clone(),
                    data_type,
                    message: "connection reset by peer".to_string(),
                })
            }
            Some(DownloadFailure::PlainText) => {
                fs::write(destination, "<html>Service Unavailable</html>").unwrap();
                Ok(())
            }
            None => fs::write(destination, archive)
                .map_err(|err| CollectorError::Filesystem(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolMode {
    Succeed,
    /// Exits 0 without writing anything.
    SucceedSilently,
    /// Writes a multi-volume BLAST database and large Bowtie 2 index.
    LargeOutputs,
    Fail(String),
    Missing,
}

/// Stand-in for BLAST+/Bowtie that writes marker files like the real tools.
pub struct FakeTools {
    pub mode: ToolMode,
    pub calls: Mutex<Vec<ToolInvocation>>,
}

impl FakeTools {
    pub fn new(mode: ToolMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, program: &str) -> Vec<ToolInvocation> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.program == program)
            .cloned()
            .collect()
    }
}

impl ToolRunner for FakeTools {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, CollectorError> {
        if self.mode == ToolMode::Missing {
            return Err(CollectorError::tool_not_found(&invocation.program));
        }
        self.calls.lock().unwrap().push(invocation.clone());
        if let ToolMode::Fail(stderr) = &self.mode {
            return Ok(ToolOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.clone(),
            });
        }
        let ok = |stdout: String| {
            Ok(ToolOutput {
                success: true,
                code: Some(0),
                stdout,
                stderr: String::new(),
            })
        };
        if self.mode == ToolMode::SucceedSilently {
            return ok(String::new());
        }

        match invocation.program.as_str() {
            "makeblastdb" => {
                let out = invocation.flag_value("-out").unwrap();
                let extensions = match invocation.flag_value("-dbtype") {
                    Some("nucl") => ["nin", "nsq"],
                    Some("prot") => ["pin", "psq"],
                    other => panic!("unexpected dbtype {other:?}"),
                };
                if self.mode == ToolMode::LargeOutputs {
                    for ext in extensions {
                        fs::write(format!("{out}.00.{ext}"), b"db").unwrap();
                    }
                    let alias = if extensions[0] == "nin" { "nal" } else { "pal" };
                    fs::write(format!("{out}.{alias}"), b"DBLIST").unwrap();
                } else {
                    for ext in extensions {
                        fs::write(format!("{out}.{ext}"), b"db").unwrap();
                    }
                }
                ok(String::new())
            }
            "bowtie-build" => {
                fs::write(format!("{}.1.ebwt", invocation.args[1]), b"idx").unwrap();
                ok(String::new())
            }
            "bowtie2-build" => {
                let ext = if self.mode == ToolMode::LargeOutputs { "1.bt2l" } else { "1.bt2" };
                fs::write(format!("{}.{ext}", invocation.args[1]), b"idx").unwrap();
                ok(String::new())
            }
            "blastn" | "blastp" | "tblastn" => {
                let db = invocation.flag_value("-db").unwrap();
                let query = fs::read_to_string(invocation.flag_value("-query").unwrap()).unwrap();
                let header = query.lines().next().unwrap_or_default();
                ok(format!("{} {db} {header}\n", invocation.program))
            }
            other => panic!("unexpected program {other}"),
        }
    }
}

pub struct TestCollection {
    pub temp: TempDir,
    pub collection: Collection<FakeRepository, FakeTools>,
}

impl TestCollection {
    pub fn new() -> Self {
        Self::with_tools(ToolMode::Succeed)
    }

    pub fn with_tools(mode: ToolMode) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let config = CollectionConfig::with_base_dir(base);
        let collection = Collection::new(&config, FakeRepository::new(), FakeTools::new(mode));
        Self { temp, collection }
    }

    /// Every regular file under the collection root, relative to it, sorted.
    pub fn files(&self) -> Vec<String> {
        let root = self.collection.root().as_std_path();
        let mut files = Vec::new();
        if !root.exists() {
            return files;
        }
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let relative = path.strip_prefix(root).unwrap();
                    files.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        files.sort();
        files
    }
}
