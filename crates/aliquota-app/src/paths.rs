//! Filesystem path helpers (XDG-aware) for the artifact, version record,
//! and destination registry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::constants::{ARTIFACT_FILE, GROUPS_FILE, VERSION_RECORD_FILE};

#[derive(Debug, Error)]
pub enum PathError {
    #[error("unable to determine project directories")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Container providing filesystem paths for the application. In production
/// this is rooted at `$XDG_DATA_HOME/aliquota`; tests construct custom
/// instances over a temp dir.
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    /// Construct paths rooted under `$XDG_DATA_HOME/aliquota`.
    pub fn from_project_dirs() -> Result<Self, PathError> {
        let dirs =
            ProjectDirs::from("br", "aliquota", "aliquota").ok_or(PathError::MissingProjectDirs)?;
        Self::new(dirs.data_dir())
    }

    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    /// Base data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }

    /// Destination of the downloaded table archive.
    pub fn artifact_path(&self) -> PathBuf {
        self.base_dir.join(ARTIFACT_FILE)
    }

    /// Persisted version record.
    pub fn version_record_path(&self) -> PathBuf {
        self.base_dir.join(VERSION_RECORD_FILE)
    }

    /// Broadcast destination registry.
    pub fn groups_path(&self) -> PathBuf {
        self.base_dir.join(GROUPS_FILE)
    }

    /// Directory receiving per-state files pulled out of the archive.
    pub fn extract_dir(&self) -> Result<PathBuf, PathError> {
        let dir = self.base_dir.join("extracted");
        ensure_dir(&dir)?;
        Ok(dir)
    }
}

fn ensure_dir(path: &Path) -> Result<(), PathError> {
    fs::create_dir_all(path).map_err(|source| PathError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::AppPaths;

    #[test]
    fn paths_derive_from_base_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(tmp.path()).expect("paths");
        assert!(paths.artifact_path().starts_with(tmp.path()));
        assert!(paths.version_record_path().ends_with("last_version_downloaded.txt"));
        assert!(paths.groups_path().ends_with("grupos.json"));
    }

    #[test]
    fn extract_dir_is_created() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(tmp.path()).expect("paths");
        let dir = paths.extract_dir().expect("extract dir");
        assert!(dir.is_dir());
    }
}
