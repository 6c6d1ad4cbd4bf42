//! Persisted record of the last table version downloaded (or checked).

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// The portal's fixed date convention.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

const LEGACY_VERSION: &str = "unknown";

#[derive(Debug, Error)]
pub enum VersionStoreError {
    #[error("failed to read version record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write version record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Sole durable core state. `vigencia_ate` must stay parseable in the
/// portal's `DD/MM/YYYY` convention; `checked_at` always reflects the most
/// recent comparison, whether or not anything was downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    pub vigencia_ate: String,
    pub vigencia_datetime: NaiveDateTime,
    #[serde(default)]
    pub checked_at: Option<NaiveDateTime>,
}

impl VersionRecord {
    pub fn valid_until(&self) -> NaiveDate {
        NaiveDate::parse_from_str(&self.vigencia_ate, DATE_FORMAT)
            .unwrap_or_else(|_| self.vigencia_datetime.date())
    }

    fn from_legacy(content: &str) -> Option<Self> {
        let date = NaiveDate::parse_from_str(content, DATE_FORMAT).ok()?;
        Some(Self {
            version: LEGACY_VERSION.to_string(),
            vigencia_ate: content.to_string(),
            vigencia_datetime: date.and_time(NaiveTime::MIN),
            checked_at: None,
        })
    }
}

/// Single-writer JSON store; one workflow process at a time is assumed.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the persisted record, normalising the legacy bare-date format
    /// on first encounter. An unreadable body is treated like a missing
    /// record: skipping a required update is worse than redoing one.
    pub fn load(&self) -> Result<Option<VersionRecord>, VersionStoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no version record yet; first run");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|source| VersionStoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let trimmed = content.trim();

        match serde_json::from_str::<VersionRecord>(trimmed) {
            Ok(record) => Ok(Some(record)),
            Err(_) => match VersionRecord::from_legacy(trimmed) {
                Some(record) => {
                    info!(
                        path = %self.path.display(),
                        vigencia_ate = %record.vigencia_ate,
                        "legacy bare-date record normalized"
                    );
                    Ok(Some(record))
                }
                None => {
                    warn!(
                        path = %self.path.display(),
                        "version record is neither JSON nor a bare date; ignoring it"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// Atomic overwrite: write a sibling temp file, then rename over the
    /// record.
    pub fn save(&self, record: &VersionRecord) -> Result<(), VersionStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| VersionStoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|source| VersionStoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| VersionStoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), version = %record.version, "version record saved");
        Ok(())
    }
}
