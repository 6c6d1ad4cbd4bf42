//! Portal automation: authenticated session, report submission, history
//! polling, and artifact download.

pub mod download;
pub mod forms;
pub mod history;
pub mod request;
pub mod session;

pub use download::ArtifactDownloader;
pub use history::{
    ArtifactDescriptor, HistoryRow, PollOptions, PollVerdict, PollingResolver, Reconciler,
    ResolvedArtifact,
};
pub use request::{ReportRequestSubmitter, RequestIntent};
pub use session::{Credentials, PortalSession};

use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;
use url::ParseError;

/// Error type shared across the portal modules. HTML-derived failures keep
/// the offending body in the variant so callers can log it for diagnostics.
#[derive(Debug, Error, Clone)]
pub enum PortalError {
    #[error("invalid base URL `{0}`")]
    InvalidBaseUrl(String),
    #[error("failed to join `{path}` onto base URL: {source}")]
    UrlJoin {
        path: String,
        #[source]
        source: Arc<ParseError>,
    },
    #[error("request error during `{stage}`: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("unexpected HTTP status {status} during `{stage}`")]
    HttpStatus { stage: &'static str, status: u16 },
    #[error("failed to read HTTP body during `{stage}`: {source}")]
    Body {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("anti-forgery token missing on the `{stage}` page; portal markup has likely changed")]
    TokenMissing { stage: &'static str },
    #[error("login rejected: invalid or blocked credentials")]
    InvalidCredentials,
    #[error("login POST succeeded but no proof-of-auth marker was found")]
    AuthenticationUnconfirmed { body: String },
    #[error("session expired during `{stage}`: redirected back to the login page")]
    SessionExpired { stage: &'static str },
    #[error("report request rejected by the portal: {}", messages.join("; "))]
    ValidationRejected { messages: Vec<String> },
    #[error("parse error during `{stage}`: {message}")]
    Parse {
        stage: &'static str,
        message: String,
    },
    #[error("no new artifact materialized within the poll budget")]
    Timeout { newest: Option<NaiveDateTime> },
    #[error("history listing never contained a downloadable artifact")]
    NoHistory,
    #[error("filesystem error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },
}

impl From<std::io::Error> for PortalError {
    fn from(value: std::io::Error) -> Self {
        Self::Io {
            source: Arc::new(value),
        }
    }
}

impl PortalError {
    pub fn request(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Request {
            stage,
            source: Arc::new(error),
        }
    }

    pub fn body(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Body {
            stage,
            source: Arc::new(error),
        }
    }

    pub fn parse(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            stage,
            message: message.into(),
        }
    }
}
