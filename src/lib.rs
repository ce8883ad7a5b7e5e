//! Local cache of NCBI reference genome data keyed by taxonomic ID.
//!
//! A [`collection::Collection`] resolves `(taxid, data type)` pairs to files
//! under its root directory and produces whatever is missing: metadata and
//! compressed sequence files come from NCBI, raw files are inflated from the
//! archives, and BLAST/Bowtie databases are built with the external tools.
//! Cached FASTA and GenBank files can be read back as [`seqio::SequenceRecord`]s.

pub mod builder;
pub mod collection;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod fs_util;
pub mod ncbi;
pub mod output;
pub mod query;
pub mod seqio;
pub mod store;
pub mod tools;
