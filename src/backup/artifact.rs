//! Artifact files in the backup directory
//!
//! Artifacts are written to `<name>.partial`, fsynced, then renamed into
//! place. A file under its final name is therefore always complete.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::codec;
use super::errors::{BackupError, BackupResult};

const PARTIAL_SUFFIX: &str = ".partial";

/// `<id>.sql`, or `<id>.sql.gz` when compressed
pub fn artifact_file_name(id: &str, compressed: bool) -> String {
    if compressed {
        format!("{}.sql.gz", id)
    } else {
        format!("{}.sql", id)
    }
}

pub fn artifact_path(backup_dir: &Path, id: &str, compressed: bool) -> PathBuf {
    backup_dir.join(artifact_file_name(id, compressed))
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Durably write `bytes` to `final_path`.
pub fn write_artifact(final_path: &Path, bytes: &[u8]) -> BackupResult<()> {
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).map_err(|e| BackupError::io_error_at_path(parent, e))?;
    }

    let partial = partial_path(final_path);
    let mut file = File::create(&partial).map_err(|e| BackupError::io_error_at_path(&partial, e))?;
    file.write_all(bytes)
        .map_err(|e| BackupError::io_error_at_path(&partial, e))?;
    file.sync_all()
        .map_err(|e| BackupError::io_error_at_path(&partial, e))?;
    drop(file);

    fs::rename(&partial, final_path).map_err(|e| BackupError::io_error_at_path(final_path, e))?;

    // Persist the rename
    if let Some(parent) = final_path.parent() {
        if let Ok(dir) = OpenOptions::new().read(true).open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Remove a leftover `.partial` file and the final artifact after a failed write.
pub fn cleanup_partial_artifact(final_path: &Path) {
    for path in [partial_path(final_path), final_path.to_path_buf()] {
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove artifact");
            }
        }
    }
}

/// Remove an artifact. A missing file is logged, not an error.
///
/// Returns whether a file was removed.
pub fn remove_artifact(path: &Path) -> BackupResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "artifact already missing");
            Ok(false)
        }
        Err(e) => Err(BackupError::io_error_at_path(path, e)),
    }
}

pub fn read_artifact(path: &Path) -> BackupResult<Vec<u8>> {
    fs::read(path).map_err(|e| BackupError::io_error_at_path(path, e))
}

/// Decode on-disk bytes into script text.
pub fn decode_artifact(bytes: &[u8], compressed: bool) -> BackupResult<String> {
    let raw = if compressed {
        codec::decompress(bytes)?
    } else {
        bytes.to_vec()
    };

    String::from_utf8(raw).map_err(|e| {
        BackupError::Compression(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}
