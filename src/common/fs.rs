//! Filesystem helpers shared by the snapshot repositories.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::common::error::{CoreError, CoreResult};

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// crash mid-write leaves the previous file intact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CoreError::persistence(parent, e))?;
    }

    let temp = temp_path(path);
    let result = File::create(&temp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&temp, path));

    if let Err(err) = result {
        let _ = fs::remove_file(&temp);
        return Err(CoreError::persistence(path, err));
    }
    Ok(())
}

/// Read a whole file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> CoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CoreError::persistence(path, err)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(read_optional(&path).unwrap().unwrap(), b"second");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_atomic(&path, b"good").unwrap();

        // A directory squatting on the temp name makes the write fail.
        fs::create_dir(temp_path(&path)).unwrap();
        let err = write_atomic(&path, b"bad").unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"good");
    }
}
