//! Outbound announcement plumbing: the broadcast seam consumed by the
//! workflow, the destination registry, and the Telegram implementation.

pub mod registry;
pub mod telegram;

pub use registry::{Destination, DestinationRegistry};
pub use telegram::TelegramBroadcaster;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to read destination registry {path}: {source}")]
    RegistryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write destination registry {path}: {source}")]
    RegistryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("telegram request failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-destination delivery accounting for one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Broadcast messenger consumed by the workflow. Implementations deliver
/// to every active destination and report per-destination success and
/// failure counts; a single failed delivery never aborts the broadcast.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_text(&self, message: &str) -> Result<BroadcastReport, NotifyError>;

    async fn broadcast_file(
        &self,
        path: &Path,
        caption: &str,
    ) -> Result<BroadcastReport, NotifyError>;
}
