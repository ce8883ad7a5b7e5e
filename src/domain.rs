use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

/// NCBI taxonomy identifier, stored in its decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Taxid(String);

impl Taxid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Taxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Taxid {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(CollectorError::InvalidTaxid(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl From<u32> for Taxid {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl TryFrom<String> for Taxid {
    type Error = CollectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Taxid> for String {
    fn from(value: Taxid) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "metadata")]
    Metadata,
    #[serde(rename = "genomic_gz")]
    GenomicGz,
    #[serde(rename = "protein_gz")]
    ProteinGz,
    #[serde(rename = "genbank_gz")]
    GenbankGz,
    #[serde(rename = "gff_gz")]
    GffGz,
    #[serde(rename = "genomic_fasta")]
    GenomicFasta,
    #[serde(rename = "protein_fasta")]
    ProteinFasta,
    #[serde(rename = "genomic_genbank")]
    GenomicGenbank,
    #[serde(rename = "genomic_gff")]
    GenomicGff,
    #[serde(rename = "nucl-blastdb")]
    NuclBlastdb,
    #[serde(rename = "prot-blastdb")]
    ProtBlastdb,
    #[serde(rename = "bowtie1-index")]
    Bowtie1Index,
    #[serde(rename = "bowtie2-index")]
    Bowtie2Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Metadata,
    Compressed,
    Raw,
    Database,
}

/// Where a missing artifact comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    RemoteMetadata,
    RemoteDownload,
    Decompress(DataType),
    Build(DataType),
}

impl DataType {
    pub const ALL: [DataType; 13] = [
        DataType::Metadata,
        DataType::GenomicGz,
        DataType::ProteinGz,
        DataType::GenbankGz,
        DataType::GffGz,
        DataType::GenomicFasta,
        DataType::ProteinFasta,
        DataType::GenomicGenbank,
        DataType::GenomicGff,
        DataType::NuclBlastdb,
        DataType::ProtBlastdb,
        DataType::Bowtie1Index,
        DataType::Bowtie2Index,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Metadata => "metadata",
            DataType::GenomicGz => "genomic_gz",
            DataType::ProteinGz => "protein_gz",
            DataType::GenbankGz => "genbank_gz",
            DataType::GffGz => "gff_gz",
            DataType::GenomicFasta => "genomic_fasta",
            DataType::ProteinFasta => "protein_fasta",
            DataType::GenomicGenbank => "genomic_genbank",
            DataType::GenomicGff => "genomic_gff",
            DataType::NuclBlastdb => "nucl-blastdb",
            DataType::ProtBlastdb => "prot-blastdb",
            DataType::Bowtie1Index => "bowtie1-index",
            DataType::Bowtie2Index => "bowtie2-index",
        }
    }

    pub fn kind(self) -> ArtifactKind {
        match self {
            DataType::Metadata => ArtifactKind::Metadata,
            DataType::GenomicGz | DataType::ProteinGz | DataType::GenbankGz | DataType::GffGz => {
                ArtifactKind::Compressed
            }
            DataType::GenomicFasta
            | DataType::ProteinFasta
            | DataType::GenomicGenbank
            | DataType::GenomicGff => ArtifactKind::Raw,
            DataType::NuclBlastdb
            | DataType::ProtBlastdb
            | DataType::Bowtie1Index
            | DataType::Bowtie2Index => ArtifactKind::Database,
        }
    }

    pub fn is_database(self) -> bool {
        self.kind() == ArtifactKind::Database
    }

    pub fn origin(self) -> Origin {
        match self {
            DataType::Metadata => Origin::RemoteMetadata,
            DataType::GenomicGz | DataType::ProteinGz | DataType::GenbankGz | DataType::GffGz => {
                Origin::RemoteDownload
            }
            DataType::GenomicFasta => Origin::Decompress(DataType::GenomicGz),
            DataType::ProteinFasta => Origin::Decompress(DataType::ProteinGz),
            DataType::GenomicGenbank => Origin::Decompress(DataType::GenbankGz),
            DataType::GenomicGff => Origin::Decompress(DataType::GffGz),
            DataType::NuclBlastdb | DataType::Bowtie1Index | DataType::Bowtie2Index => {
                Origin::Build(DataType::GenomicFasta)
            }
            DataType::ProtBlastdb => Origin::Build(DataType::ProteinFasta),
        }
    }

    /// Raw counterpart of a compressed download.
    pub fn decompressed(self) -> Option<DataType> {
        match self {
            DataType::GenomicGz => Some(DataType::GenomicFasta),
            DataType::ProteinGz => Some(DataType::ProteinFasta),
            DataType::GenbankGz => Some(DataType::GenomicGenbank),
            DataType::GffGz => Some(DataType::GenomicGff),
            _ => None,
        }
    }

    /// Database types built from this raw file.
    pub fn dependents(self) -> Vec<DataType> {
        DataType::ALL
            .into_iter()
            .filter(|candidate| candidate.origin() == Origin::Build(self))
            .collect()
    }

    /// Extensions of the files whose presence marks a finished database, the
    /// usual one first. Multi-volume BLAST databases only have a `.nal`/`.pal`
    /// alias at the stem; large Bowtie indexes use the `l` suffixed names.
    pub fn marker_extensions(self) -> &'static [&'static str] {
        match self {
            DataType::NuclBlastdb => &["nsq", "nal"],
            DataType::ProtBlastdb => &["psq", "pal"],
            DataType::Bowtie1Index => &["1.ebwt", "1.ebwtl"],
            DataType::Bowtie2Index => &["1.bt2", "1.bt2l"],
            _ => &[],
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let data_type = match normalized.as_str() {
            "metadata" | "infos" => DataType::Metadata,
            "genomic_gz" | "genomic_fasta_gz" => DataType::GenomicGz,
            "protein_gz" | "protein_fasta_gz" => DataType::ProteinGz,
            "genbank_gz" | "genomic_genbank_gz" => DataType::GenbankGz,
            "gff_gz" | "genomic_gff_gz" => DataType::GffGz,
            "genomic_fasta" => DataType::GenomicFasta,
            "protein_fasta" => DataType::ProteinFasta,
            "genomic_genbank" => DataType::GenomicGenbank,
            "genomic_gff" => DataType::GenomicGff,
            "nucl-blastdb" | "blast_nucl" => DataType::NuclBlastdb,
            "prot-blastdb" | "blast_prot" => DataType::ProtBlastdb,
            "bowtie1-index" | "bowtie1_index" => DataType::Bowtie1Index,
            "bowtie2-index" | "bowtie2_index" => DataType::Bowtie2Index,
            _ => return Err(CollectorError::InvalidDataType(value.to_string())),
        };
        Ok(data_type)
    }
}

/// Picks one assembly when NCBI lists several for a taxid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblySelector {
    /// 1-based position among the candidate ids sorted numerically (`#1`, `#2`, ...).
    Index(usize),
    Id(String),
}

impl AssemblySelector {
    pub fn select(&self, taxid: &Taxid, candidates: &[String]) -> Result<String, CollectorError> {
        match self {
            AssemblySelector::Index(index) => {
                let mut sorted = candidates
                    .iter()
                    .filter_map(|id| id.parse::<u64>().ok())
                    .collect::<Vec<_>>();
                sorted.sort_unstable();
                index
                    .checked_sub(1)
                    .and_then(|position| sorted.get(position))
                    .map(|id| id.to_string())
                    .ok_or_else(|| CollectorError::UnknownAssembly {
                        taxid: taxid.clone(),
                        assembly: format!("#{index}"),
                    })
            }
            AssemblySelector::Id(id) => {
                if candidates.iter().any(|candidate| candidate == id) {
                    Ok(id.clone())
                } else {
                    Err(CollectorError::UnknownAssembly {
                        taxid: taxid.clone(),
                        assembly: id.clone(),
                    })
                }
            }
        }
    }
}

impl FromStr for AssemblySelector {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.strip_prefix('#') {
            Some(index) => index
                .parse::<usize>()
                .map(AssemblySelector::Index)
                .map_err(|_| CollectorError::InvalidAssemblySelector(value.to_string())),
            None if !trimmed.is_empty() => Ok(AssemblySelector::Id(trimmed.to_string())),
            None => Err(CollectorError::InvalidAssemblySelector(value.to_string())),
        }
    }
}
