use std::fs;
use std::io;

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;

use crate::error::CollectorError;
use crate::store::Store;

/// Inflates a gzip file into `target`, replacing it atomically.
pub fn decompress_gz(gz_path: &Utf8Path, target: &Utf8Path) -> Result<u64, CollectorError> {
    let file = fs::File::open(gz_path.as_std_path())
        .map_err(|err| CollectorError::Filesystem(format!("open gz {gz_path}: {err}")))?;
    // NCBI archives are sometimes multi-member.
    let mut decoder = MultiGzDecoder::new(io::BufReader::new(file));

    let mut temp = Store::temp_for(target)?;
    let written = io::copy(&mut decoder, temp.as_file_mut())
        .map_err(|err| CollectorError::Filesystem(format!("inflate {gz_path}: {err}")))?;
    Store::persist(temp, target)?;
    Ok(written)
}

/// Reads the whole archive to check it is a complete gzip stream.
pub fn validate_gz(gz_path: &Utf8Path) -> Result<(), CollectorError> {
    let file = fs::File::open(gz_path.as_std_path())
        .map_err(|err| CollectorError::Filesystem(format!("open gz {gz_path}: {err}")))?;
    let mut decoder = MultiGzDecoder::new(io::BufReader::new(file));
    io::copy(&mut decoder, &mut io::sink())
        .map_err(|err| CollectorError::Filesystem(format!("corrupt gz {gz_path}: {err}")))?;
    Ok(())
}
