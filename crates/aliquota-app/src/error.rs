//! Application-level error type shared across the binary and services.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::config::AppConfigError;
use crate::notify::NotifyError;
use crate::paths::PathError;
use crate::portal::PortalError;
use crate::version::{VersionError, VersionStoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] AppConfigError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    VersionStore(#[from] VersionStoreError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
