mod common;

use std::fs;
use std::io::Read;

use assert_matches::assert_matches;
use flate2::read::MultiGzDecoder;

use common::{
    DownloadFailure, ECOLI, ECOLI_FASTA, ECOLI_PROTEINS, TestCollection, UNKNOWN, YEAST, gzip, taxid,
};
use genome_collector::domain::{AssemblySelector, DataType};
use genome_collector::error::CollectorError;
use genome_collector::store::Store;

#[test]
fn ensure_twice_fetches_once() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);

    let first = collection.ensure(&ecoli, DataType::GenomicFasta).unwrap();
    let files_after_first = harness.files();
    let second = collection.ensure(&ecoli, DataType::GenomicFasta).unwrap();

    assert_eq!(first, second);
    assert_eq!(collection.repository().metadata_count(), 1);
    assert_eq!(collection.repository().download_count(), 1);
    assert_eq!(harness.files(), files_after_first);
    assert_eq!(fs::read_to_string(first.as_std_path()).unwrap(), ECOLI_FASTA);
}

#[test]
fn ensured_artifact_is_present_at_resolved_path() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);

    for data_type in [
        DataType::Metadata,
        DataType::ProteinFasta,
        DataType::GenomicGenbank,
        DataType::GenomicGff,
    ] {
        let path = collection.ensure(&ecoli, data_type).unwrap();
        assert!(collection.has(&ecoli, data_type), "{data_type} missing");
        assert_eq!(path, Store::resolve(collection.root(), &ecoli, data_type));
    }
}

#[test]
fn ensuring_a_database_caches_its_prerequisites() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);

    collection.ensure(&ecoli, DataType::ProtBlastdb).unwrap();

    assert!(collection.has(&ecoli, DataType::ProtBlastdb));
    assert!(collection.has(&ecoli, DataType::ProteinFasta));
    assert!(collection.has(&ecoli, DataType::ProteinGz));
    assert!(collection.has(&ecoli, DataType::Metadata));
    assert!(!collection.has(&ecoli, DataType::GenomicFasta));
    assert_eq!(
        fs::read_to_string(collection.path(&ecoli, DataType::ProteinFasta).as_std_path()).unwrap(),
        ECOLI_PROTEINS
    );
}

#[test]
fn nucleotide_database_end_to_end() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);

    let stem = collection.ensure(&ecoli, DataType::NuclBlastdb).unwrap();

    assert_eq!(collection.repository().download_count(), 1);
    assert_eq!(collection.tools().calls_to("makeblastdb").len(), 1);
    let fasta_files = harness
        .files()
        .into_iter()
        .filter(|file| file.ends_with(".fa"))
        .collect::<Vec<_>>();
    assert_eq!(fasta_files, vec!["511145/511145_genomic.fa".to_string()]);

    let names = Store::database_files(&stem)
        .unwrap()
        .into_iter()
        .map(|path| path.file_name().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["511145.nin", "511145.nsq"]);

    let build = &collection.tools().calls_to("makeblastdb")[0];
    assert_eq!(build.flag_value("-dbtype"), Some("nucl"));
    assert_eq!(
        build.flag_value("-in"),
        Some(collection.path(&ecoli, DataType::GenomicFasta).as_str())
    );

    let files = harness.files();
    collection.ensure(&ecoli, DataType::NuclBlastdb).unwrap();
    assert_eq!(collection.repository().metadata_count(), 1);
    assert_eq!(collection.repository().download_count(), 1);
    assert_eq!(collection.tools().call_count(), 1);
    assert_eq!(harness.files(), files);
}

#[test]
fn unknown_taxid_leaves_nothing_behind() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let unknown = taxid(UNKNOWN);

    let err = collection.ensure(&unknown, DataType::GenomicFasta).unwrap_err();

    assert_matches!(err, CollectorError::IdentifierNotFound { .. });
    assert!(harness.files().is_empty());
    assert!(!collection.store().taxid_dir(&unknown).as_std_path().exists());
    assert_eq!(collection.repository().download_count(), 0);
}

#[test]
fn remove_is_idempotent() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    collection.ensure(&ecoli, DataType::NuclBlastdb).unwrap();

    let removed = collection.remove(&ecoli, Some(DataType::NuclBlastdb)).unwrap();
    assert_eq!(removed.len(), 2);
    assert!(!collection.has(&ecoli, DataType::NuclBlastdb));
    assert!(collection.has(&ecoli, DataType::GenomicFasta));

    let removed_again = collection.remove(&ecoli, Some(DataType::NuclBlastdb)).unwrap();
    assert!(removed_again.is_empty());
    assert!(!collection.has(&ecoli, DataType::NuclBlastdb));
}

#[test]
fn removing_raw_sequence_drops_databases_built_from_it() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    collection.ensure(&ecoli, DataType::NuclBlastdb).unwrap();
    collection.ensure(&ecoli, DataType::Bowtie2Index).unwrap();
    collection.ensure(&ecoli, DataType::ProtBlastdb).unwrap();

    collection.remove(&ecoli, Some(DataType::GenomicFasta)).unwrap();

    assert!(!collection.has(&ecoli, DataType::GenomicFasta));
    assert!(!collection.has(&ecoli, DataType::NuclBlastdb));
    assert!(!collection.has(&ecoli, DataType::Bowtie2Index));
    assert!(collection.has(&ecoli, DataType::GenomicGz));
    assert!(collection.has(&ecoli, DataType::ProtBlastdb));
}

#[test]
fn raw_file_is_restored_from_cached_archive() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    collection.ensure(&ecoli, DataType::GenomicFasta).unwrap();
    collection.remove(&ecoli, Some(DataType::GenomicFasta)).unwrap();

    let path = collection.ensure(&ecoli, DataType::GenomicFasta).unwrap();

    assert_eq!(collection.repository().download_count(), 1);
    assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), ECOLI_FASTA);
}

#[test]
fn decompressed_file_matches_archive_contents() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);

    let raw = collection.ensure(&ecoli, DataType::GenomicFasta).unwrap();
    let archive = fs::read(collection.path(&ecoli, DataType::GenomicGz).as_std_path()).unwrap();
    assert_eq!(archive, gzip(ECOLI_FASTA.as_bytes()));

    let mut inflated = Vec::new();
    MultiGzDecoder::new(archive.as_slice())
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(fs::read(raw.as_std_path()).unwrap(), inflated);
}

#[test]
fn list_cached_filters_by_type() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    let yeast = taxid(YEAST);
    collection.ensure(&ecoli, DataType::NuclBlastdb).unwrap();
    collection.ensure(&yeast, DataType::Metadata).unwrap();

    assert_eq!(collection.list_cached(None).unwrap(), vec![ecoli.clone(), yeast.clone()]);
    assert_eq!(
        collection.list_cached(Some(DataType::NuclBlastdb)).unwrap(),
        vec![ecoli.clone()]
    );
    assert_eq!(
        collection.list_cached(Some(DataType::Metadata)).unwrap(),
        vec![ecoli, yeast]
    );
    assert!(collection.list_cached(Some(DataType::ProtBlastdb)).unwrap().is_empty());
}

#[test]
fn list_cached_on_empty_collection() {
    let harness = TestCollection::new();
    assert!(harness.collection.list_cached(None).unwrap().is_empty());
    assert!(harness.collection.list_names().unwrap().is_empty());
}

#[test]
fn list_names_sorted_by_scientific_name() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    collection.ensure(&taxid(YEAST), DataType::Metadata).unwrap();
    collection.ensure(&taxid(ECOLI), DataType::Metadata).unwrap();

    let names = collection.list_names().unwrap();
    let names = names
        .iter()
        .map(|entry| (entry.taxid.as_str(), entry.scientific_name.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            (ECOLI, "Escherichia coli str. K-12 substr. MG1655"),
            (YEAST, "Saccharomyces cerevisiae S288C"),
        ]
    );
}

#[test]
fn offline_collection_reports_missing_artifacts() {
    let mut harness = TestCollection::new();
    harness.collection.set_autodownload(false);
    let ecoli = taxid(ECOLI);

    let err = harness
        .collection
        .ensure(&ecoli, DataType::GenomicFasta)
        .unwrap_err();

    assert_matches!(err, CollectorError::NotCached { data_type: DataType::Metadata, .. });
    assert_eq!(harness.collection.repository().metadata_count(), 0);
    assert!(harness.files().is_empty());
}

#[test]
fn offline_collection_still_serves_cached_artifacts() {
    let mut harness = TestCollection::new();
    let ecoli = taxid(ECOLI);
    harness.collection.ensure(&ecoli, DataType::GenomicGz).unwrap();
    harness.collection.set_autodownload(false);

    harness.collection.ensure(&ecoli, DataType::NuclBlastdb).unwrap();
    assert!(harness.collection.has(&ecoli, DataType::NuclBlastdb));

    let err = harness
        .collection
        .ensure(&ecoli, DataType::ProteinFasta)
        .unwrap_err();
    assert_matches!(err, CollectorError::NotCached { data_type: DataType::ProteinGz, .. });
}

#[test]
fn remove_whole_taxid_and_clear() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    let yeast = taxid(YEAST);
    collection.ensure(&ecoli, DataType::NuclBlastdb).unwrap();
    collection.ensure(&yeast, DataType::GenomicFasta).unwrap();

    let removed = collection.remove(&ecoli, None).unwrap();
    assert!(!removed.is_empty());
    assert_eq!(collection.list_cached(None).unwrap(), vec![yeast.clone()]);
    assert!(collection.remove(&ecoli, None).unwrap().is_empty());

    collection.clear().unwrap();
    assert!(collection.list_cached(None).unwrap().is_empty());
    assert!(harness.files().is_empty());
}

#[test]
fn refresh_metadata_replaces_the_record() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    let original = collection.metadata(&ecoli).unwrap();
    assert_eq!(original.assembly_id, "51114501");

    let selector: AssemblySelector = "79781".parse().unwrap();
    let refreshed = collection.refresh_metadata(&ecoli, Some(&selector)).unwrap();

    assert_eq!(refreshed.assembly_id, "79781");
    assert_eq!(collection.metadata(&ecoli).unwrap(), refreshed);
    assert_eq!(collection.repository().metadata_count(), 2);
}

#[test]
fn non_database_types_are_rejected_by_build() {
    let harness = TestCollection::new();
    let err = harness
        .collection
        .build_database(&taxid(ECOLI), DataType::GenomicFasta)
        .unwrap_err();
    assert_matches!(err, CollectorError::InvalidDataType(_));
    assert_eq!(harness.collection.repository().metadata_count(), 0);
}

#[test]
fn interrupted_download_leaves_no_partial_files() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    collection
        .repository()
        .fail_next_download(DownloadFailure::Truncated);

    let err = collection.ensure(&ecoli, DataType::GenomicFasta).unwrap_err();

    assert_matches!(err, CollectorError::Network { data_type: DataType::GenomicGz, .. });
    assert_eq!(harness.files(), vec!["511145/511145.json".to_string()]);
    assert!(!collection.has(&ecoli, DataType::GenomicGz));

    let path = collection.ensure(&ecoli, DataType::GenomicFasta).unwrap();
    assert_eq!(collection.repository().download_count(), 2);
    assert_eq!(collection.repository().metadata_count(), 1);
    assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), ECOLI_FASTA);
}

#[test]
fn non_gzip_download_is_rejected_before_caching() {
    let harness = TestCollection::new();
    let collection = &harness.collection;
    let ecoli = taxid(ECOLI);
    collection
        .repository()
        .fail_next_download(DownloadFailure::PlainText);

    let err = collection.ensure(&ecoli, DataType::ProteinGz).unwrap_err();

    assert_matches!(err, CollectorError::Network { data_type: DataType::ProteinGz, .. });
    assert!(err.is_transient());
    assert_eq!(harness.files(), vec!["511145/511145.json".to_string()]);

    collection.ensure(&ecoli, DataType::ProteinGz).unwrap();
    assert_eq!(collection.repository().download_count(), 2);
    assert!(collection.has(&ecoli, DataType::ProteinFasta));
}
