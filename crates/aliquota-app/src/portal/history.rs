//! History-listing reconciliation: decide which generated artifact belongs
//! to the submission this run just made.
//!
//! The portal's history is a flat, unordered table of every artifact ever
//! generated for the account, and the submission carries no identifier, so
//! cause and effect can only be correlated by time proximity. The
//! [`Reconciler`] encodes that correlation as a pure, deterministic
//! function over parsed rows; [`PollingResolver`] drives it against the
//! live listing under a bounded attempt budget.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bon::Builder;
use chrono::{NaiveDateTime, TimeDelta};
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::clock::Clock;

use super::{PortalError, PortalSession};

pub const HISTORY_PATH_PREFIX: &str = "TabelaAliquota/Historico";

/// Artifacts generated up to this long *before* submission are still
/// attributable to it: the portal may batch or reuse a fresh generation,
/// and clocks skew.
const WINDOW_BEFORE_SECS: i64 = 10_800;
/// Artifacts generated up to this long *after* submission are attributable.
const WINDOW_AFTER_SECS: i64 = 3_600;
/// Polls seen before the newest ready artifact is accepted as a last
/// resort when nothing is pending.
const FALLBACK_MIN_ATTEMPTS: u32 = 3;
/// Clock-skew margin applied to the newest candidate at exhaustion.
const EXHAUSTION_SKEW_MARGIN_SECS: i64 = 300;

const TIMESTAMP_DATETIME_DIGITS: usize = 14;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One ready row of the history listing, recomputed on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub download_url: Url,
    pub generated_at: NaiveDateTime,
}

/// A parsed history row: either a downloadable artifact or a still-running
/// generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryRow {
    Ready(ArtifactDescriptor),
    Pending,
}

/// The resolver's output; immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub download_url: Url,
    pub generated_at: NaiveDateTime,
}

impl From<&ArtifactDescriptor> for ResolvedArtifact {
    fn from(descriptor: &ArtifactDescriptor) -> Self {
        Self {
            download_url: descriptor.download_url.clone(),
            generated_at: descriptor.generated_at,
        }
    }
}

/// Verdict of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    Resolved(ResolvedArtifact),
    KeepWaiting { pending: bool },
}

/// Pure per-attempt reconciliation state. Deterministic for a fixed
/// sequence of row lists: the newest `generated_at` wins the candidate
/// slot, and equal timestamps keep the first artifact seen.
#[derive(Debug, Clone)]
pub struct Reconciler {
    submitted_at: NaiveDateTime,
    best: Option<ResolvedArtifact>,
    attempts: u32,
}

impl Reconciler {
    pub fn new(submitted_at: NaiveDateTime) -> Self {
        Self {
            submitted_at,
            best: None,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Most recent ready artifact observed so far across all attempts.
    pub fn best_candidate(&self) -> Option<&ResolvedArtifact> {
        self.best.as_ref()
    }

    /// Feed one poll's parsed rows.
    ///
    /// An artifact whose generation instant falls inside the asymmetric
    /// reconciliation window around the submission is accepted on the
    /// spot. Failing that, a pending row keeps the poll alive; and once
    /// enough settled polls have passed with no pending marker, the newest
    /// ready artifact is returned as a last resort — no distinguishable
    /// new job is going to appear.
    pub fn observe(&mut self, rows: &[HistoryRow]) -> PollVerdict {
        self.attempts += 1;

        if rows.is_empty() {
            // Transient empty listing; nothing to judge this attempt.
            return PollVerdict::KeepWaiting { pending: false };
        }

        let mut pending = false;
        for row in rows {
            match row {
                HistoryRow::Pending => pending = true,
                HistoryRow::Ready(descriptor) => {
                    if self
                        .best
                        .as_ref()
                        .is_none_or(|best| descriptor.generated_at > best.generated_at)
                    {
                        self.best = Some(descriptor.into());
                    }

                    let delta = (descriptor.generated_at - self.submitted_at).num_seconds();
                    if (-WINDOW_BEFORE_SECS..=WINDOW_AFTER_SECS).contains(&delta) {
                        return PollVerdict::Resolved(descriptor.into());
                    }
                }
            }
        }

        if !pending
            && self.attempts >= FALLBACK_MIN_ATTEMPTS
            && let Some(best) = &self.best
        {
            return PollVerdict::Resolved(best.clone());
        }

        PollVerdict::KeepWaiting { pending }
    }

    /// Exhaustion policy once the attempt budget is spent: the newest
    /// candidate is trusted only if it is not older than the submission
    /// minus a skew margin.
    pub fn finish(self) -> Result<ResolvedArtifact, PortalError> {
        let Some(best) = self.best else {
            return Err(PortalError::NoHistory);
        };

        let margin = self.submitted_at - TimeDelta::seconds(EXHAUSTION_SKEW_MARGIN_SECS);
        if best.generated_at < margin {
            Err(PortalError::Timeout {
                newest: Some(best.generated_at),
            })
        } else {
            Ok(best)
        }
    }
}

#[derive(Debug, Clone, Builder)]
pub struct PollOptions {
    #[builder(default = 30)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_secs(10))]
    pub delay: Duration,
}

#[derive(Debug)]
pub struct PollingResolver<'a> {
    session: &'a PortalSession,
    cnpj: &'a str,
}

impl<'a> PollingResolver<'a> {
    pub fn new(session: &'a PortalSession, cnpj: &'a str) -> Self {
        Self { session, cnpj }
    }

    fn history_path(&self) -> String {
        format!("{HISTORY_PATH_PREFIX}?cnpj={}", self.cnpj)
    }

    /// Poll the history listing until an artifact is attributable to
    /// `submitted_at` or the budget of `max_attempts × delay` runs out —
    /// a hard ceiling that holds even under partial progress.
    pub async fn resolve<C: Clock>(
        &self,
        submitted_at: NaiveDateTime,
        opts: &PollOptions,
        clock: &C,
    ) -> Result<ResolvedArtifact, PortalError> {
        let stage = "history";
        let path = self.history_path();
        let mut reconciler = Reconciler::new(submitted_at);

        for attempt in 1..=opts.max_attempts {
            let page = self.session.get_page(stage, &path).await?;
            if self.session.is_login_redirect(&page.final_url) {
                return Err(PortalError::SessionExpired { stage });
            }

            let rows = parse_history_rows(&page.body, self.session.base_url())?;
            match reconciler.observe(&rows) {
                PollVerdict::Resolved(artifact) => {
                    info!(
                        stage,
                        attempt,
                        generated_at = %artifact.generated_at,
                        url = %artifact.download_url,
                        "artifact resolved"
                    );
                    return Ok(artifact);
                }
                PollVerdict::KeepWaiting { pending } => {
                    if rows.is_empty() {
                        debug!(stage, attempt, "history listing empty; treating as transient");
                    } else if pending {
                        info!(
                            stage,
                            attempt,
                            max_attempts = opts.max_attempts,
                            "artifact still generating"
                        );
                    } else {
                        debug!(
                            stage,
                            attempt,
                            rows = rows.len(),
                            "no attributable artifact yet"
                        );
                    }
                }
            }

            if attempt < opts.max_attempts {
                clock.sleep(opts.delay).await;
            }
        }

        reconciler.finish()
    }
}

struct HistorySelectors {
    table: Selector,
    row: Selector,
    download: Selector,
    pending: Selector,
}

impl HistorySelectors {
    fn new() -> Result<Self, PortalError> {
        Ok(Self {
            table: Selector::parse("table.table")
                .map_err(|err| PortalError::parse("history", err.to_string()))?,
            row: Selector::parse("tr")
                .map_err(|err| PortalError::parse("history", err.to_string()))?,
            download: Selector::parse("a.btn-success")
                .map_err(|err| PortalError::parse("history", err.to_string()))?,
            pending: Selector::parse("span.pendente")
                .map_err(|err| PortalError::parse("history", err.to_string()))?,
        })
    }
}

/// Parse the history listing into rows, skipping the header. A missing
/// table or an empty body is a transient state, not a parse failure.
pub fn parse_history_rows(html: &str, base_url: &Url) -> Result<Vec<HistoryRow>, PortalError> {
    let document = Html::parse_document(html);
    let selectors = HistorySelectors::new()?;

    let Some(table) = document.select(&selectors.table).next() else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for row in table.select(&selectors.row).skip(1) {
        if let Some(link) = row.select(&selectors.download).next() {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            match parse_generated_at(href) {
                Some(generated_at) => {
                    let download_url =
                        base_url.join(href).map_err(|err| PortalError::UrlJoin {
                            path: href.to_string(),
                            source: Arc::new(err),
                        })?;
                    rows.push(HistoryRow::Ready(ArtifactDescriptor {
                        download_url,
                        generated_at,
                    }));
                }
                None => {
                    warn!(
                        stage = "history",
                        href, "download link carries no timestamp token; skipping row"
                    );
                }
            }
        } else if row.select(&selectors.pending).next().is_some() {
            rows.push(HistoryRow::Pending);
        }
    }

    Ok(rows)
}

/// The 17-digit path token whose first 14 digits encode the generation
/// instant as `YYYYMMDDHHMMSS`.
fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(\d{17})/").expect("timestamp pattern is valid"))
}

fn parse_generated_at(href: &str) -> Option<NaiveDateTime> {
    let token = timestamp_regex().captures(href)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(&token[..TIMESTAMP_DATETIME_DIGITS], TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://portal.example/").expect("base url")
    }

    #[test]
    fn generated_at_is_parsed_from_the_path_token() {
        let href = "/TabelaAliquota/Download/20250701143000123/tabela.zip";
        let parsed = parse_generated_at(href).expect("timestamp");
        assert_eq!(
            parsed,
            NaiveDateTime::parse_from_str("2025-07-01 14:30:00", "%Y-%m-%d %H:%M:%S").unwrap()
        );
    }

    #[test]
    fn short_or_absent_tokens_are_rejected() {
        assert!(parse_generated_at("/TabelaAliquota/Download/1234/tabela.zip").is_none());
        assert!(parse_generated_at("/TabelaAliquota/Download/tabela.zip").is_none());
    }

    #[test]
    fn history_rows_split_into_ready_and_pending() {
        let html = r#"
            <table class="table">
              <tr><th>Data</th><th>Status</th></tr>
              <tr>
                <td>01/07/2025</td>
                <td><a class="btn-success" href="/TabelaAliquota/Download/20250701143000123/tabela.zip">Baixar</a></td>
              </tr>
              <tr>
                <td>01/07/2025</td>
                <td><span class="pendente">Processando</span></td>
              </tr>
            </table>
        "#;
        let rows = parse_history_rows(html, &base()).expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[0], HistoryRow::Ready(_)));
        assert_eq!(rows[1], HistoryRow::Pending);
    }

    #[test]
    fn missing_table_parses_as_empty() {
        let rows = parse_history_rows("<html><body>maintenance</body></html>", &base())
            .expect("rows");
        assert!(rows.is_empty());
    }

    #[test]
    fn header_row_is_skipped() {
        let html = r#"
            <table class="table">
              <tr><th>Data</th></tr>
            </table>
        "#;
        let rows = parse_history_rows(html, &base()).expect("rows");
        assert!(rows.is_empty());
    }
}
