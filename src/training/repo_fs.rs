//! Filesystem repository for the pipeline snapshot.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::config::AppCfg;
use crate::common::error::CoreResult;
use crate::common::fs;

use super::domain::SnapshotRepo;

/// Persist the snapshot blob as a single file, replaced atomically.
pub struct FsSnapshotRepo {
    path: PathBuf,
}

impl FsSnapshotRepo {
    /// Repository storing the snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Repository at the configured snapshot location.
    pub fn from_cfg(cfg: &AppCfg) -> Self {
        Self::new(cfg.pipeline_snapshot())
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotRepo for FsSnapshotRepo {
    fn put_snapshot(&self, bytes: &[u8]) -> CoreResult<()> {
        fs::write_atomic(&self.path, bytes)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    fn get_snapshot(&self) -> CoreResult<Option<Vec<u8>>> {
        fs::read_optional(&self.path)
    }
}
