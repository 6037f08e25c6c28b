//! Checksum and compression for backup artifacts
//!
//! Checksums are SHA-256 over the final on-disk bytes, formatted as lowercase
//! hex. Compression is gzip.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use super::errors::{BackupError, BackupResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Computes the hex SHA-256 digest of `data`.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Computes the hex SHA-256 digest of an entire file.
///
/// Reads the file in chunks to handle large files efficiently.
pub fn compute_file_checksum(path: &Path) -> BackupResult<String> {
    let file = File::open(path).map_err(|e| BackupError::io_error_at_path(path, e))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| BackupError::io_error_at_path(path, e))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Gzip-compress `data`.
pub fn compress(data: &[u8]) -> BackupResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(BackupError::Compression)?;
    encoder.finish().map_err(BackupError::Compression)
}

/// Gzip-decompress `data`.
pub fn decompress(data: &[u8]) -> BackupResult<Vec<u8>> {
    if !is_gzip(data) {
        return Err(BackupError::Compression(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "not a gzip stream",
        )));
    }

    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(BackupError::Compression)?;
    Ok(decompressed)
}

/// Whether `data` starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}
