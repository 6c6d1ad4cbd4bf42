//! Version banner extraction and monotonic comparison against the
//! persisted record.

pub mod store;

pub use store::{DATE_FORMAT, VersionRecord, VersionStore, VersionStoreError};

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info};

const BANNER_ID: &str = "div#popupshadow";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Error, Clone)]
pub enum VersionError {
    #[error("invalid base URL `{0}`")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {source}")]
    Client {
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("request error while fetching the landing page: {source}")]
    Fetch {
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("unexpected HTTP status {status} while fetching the landing page")]
    HttpStatus { status: u16 },
    #[error("landing page carries no recognizable version banner")]
    BannerMissing,
}

/// Version metadata published on the portal landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    pub version: String,
    pub vigencia_ate: String,
    pub valid_until: NaiveDate,
}

impl RemoteVersion {
    pub fn into_record(self, checked_at: NaiveDateTime) -> VersionRecord {
        VersionRecord {
            version: self.version,
            vigencia_ate: self.vigencia_ate,
            vigencia_datetime: self.valid_until.and_time(NaiveTime::MIN),
            checked_at: Some(checked_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateVerdict {
    NeedsUpdate(RemoteVersion),
    UpToDate(RemoteVersion),
}

/// Fetches the public landing page and compares its banner against the
/// persisted record. Fetch failures are surfaced as-is; the *orchestrator*
/// fails open on them.
#[derive(Debug, Clone)]
pub struct VersionComparator {
    base_url: Url,
    http: Client,
}

impl VersionComparator {
    pub fn new(base_url: &str) -> Result<Self, VersionError> {
        let parsed =
            Url::parse(base_url).map_err(|_| VersionError::InvalidBaseUrl(base_url.to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| VersionError::Client {
                source: Arc::new(err),
            })?;
        Ok(Self {
            base_url: parsed,
            http,
        })
    }

    pub async fn fetch_remote(&self) -> Result<RemoteVersion, VersionError> {
        debug!(url = %self.base_url, "fetching landing page for version banner");
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|err| VersionError::Fetch {
                source: Arc::new(err),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VersionError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|err| VersionError::Fetch {
            source: Arc::new(err),
        })?;
        let remote = extract_remote_version(&body).ok_or(VersionError::BannerMissing)?;
        info!(
            version = %remote.version,
            vigencia_ate = %remote.vigencia_ate,
            "remote version banner found"
        );
        Ok(remote)
    }

    pub async fn check_for_update(
        &self,
        persisted: Option<&VersionRecord>,
    ) -> Result<UpdateVerdict, VersionError> {
        let remote = self.fetch_remote().await?;
        Ok(compare(persisted, remote))
    }
}

/// Comparison rule: a later validity end means a new table; the same
/// validity end with a different version code means a re-issued table.
/// With no persisted record an update is always needed.
pub fn compare(persisted: Option<&VersionRecord>, remote: RemoteVersion) -> UpdateVerdict {
    let Some(last) = persisted else {
        return UpdateVerdict::NeedsUpdate(remote);
    };

    let last_until = last.valid_until();
    if remote.valid_until > last_until {
        UpdateVerdict::NeedsUpdate(remote)
    } else if remote.valid_until == last_until && remote.version != last.version {
        UpdateVerdict::NeedsUpdate(remote)
    } else {
        UpdateVerdict::UpToDate(remote)
    }
}

/// Structured banner lookup first; the portal sometimes omits the popup,
/// so a permissive page-wide scan is the fallback.
pub fn extract_remote_version(html: &str) -> Option<RemoteVersion> {
    extract_from_banner(html).or_else(|| extract_from_page_text(html))
}

fn extract_from_banner(html: &str) -> Option<RemoteVersion> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(BANNER_ID).ok()?;
    let popup = document.select(&selector).next()?;
    let text = popup.text().collect::<Vec<_>>().join(" ");

    let version = banner_version_regex()
        .captures(&text)?
        .get(1)?
        .as_str()
        .to_string();
    let vigencia_ate = banner_vigencia_regex()
        .captures(&text)?
        .get(1)?
        .as_str()
        .to_string();
    build_remote(version, vigencia_ate)
}

fn extract_from_page_text(html: &str) -> Option<RemoteVersion> {
    let caps = page_scan_regex().captures(html)?;
    build_remote(
        caps.get(1)?.as_str().to_string(),
        caps.get(2)?.as_str().to_string(),
    )
}

fn build_remote(version: String, vigencia_ate: String) -> Option<RemoteVersion> {
    let valid_until = NaiveDate::parse_from_str(&vigencia_ate, DATE_FORMAT).ok()?;
    Some(RemoteVersion {
        version,
        vigencia_ate,
        valid_until,
    })
}

fn banner_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)vers[ãa]o\s+([0-9.A-Z]+)").expect("banner version pattern is valid")
    })
}

fn banner_vigencia_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)at[ée]\s+(\d{2}/\d{2}/\d{4})").expect("banner vigencia pattern is valid")
    })
}

fn page_scan_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)vers[aã]o\s+([0-9.A-Z]+).+?vigente\s+at[eé]\s+(\d{2}/\d{2}/\d{4})")
            .expect("page scan pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_extraction_prefers_the_popup() {
        let html = r#"
            <html><body>
              <div id="popupshadow">
                <p>Comunicado: Versão 25.2.A da tabela, vigente até 31/07/2025.</p>
              </div>
            </body></html>
        "#;
        let remote = extract_remote_version(html).expect("remote");
        assert_eq!(remote.version, "25.2.A");
        assert_eq!(remote.vigencia_ate, "31/07/2025");
        assert_eq!(
            remote.valid_until,
            NaiveDate::from_ymd_opt(2025, 7, 31).unwrap()
        );
    }

    #[test]
    fn page_scan_fallback_handles_missing_popup() {
        let html = "<p>Tabela na versão 25.2.B vigente até 31/07/2025</p>";
        let remote = extract_remote_version(html).expect("remote");
        assert_eq!(remote.version, "25.2.B");
        assert_eq!(remote.vigencia_ate, "31/07/2025");
    }

    #[test]
    fn pages_without_a_banner_yield_nothing() {
        assert!(extract_remote_version("<html><body>manutenção</body></html>").is_none());
    }
}
