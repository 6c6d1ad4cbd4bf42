//! Submission of the asynchronous report-generation job.

use chrono::NaiveDateTime;
use reqwest::header;
use tracing::{debug, info, warn};

use crate::clock::Clock;

use super::session::ACCEPT_HTML;
use super::{PortalError, PortalSession, forms};

pub const REQUEST_PATH_PREFIX: &str = "TabelaAliquota/Solicitar";

const STATES_FIELD: &str = "Estados";
const PURPOSE_FIELD: &str = "FinalidadeArquivo";
const PURPOSE_VALUE: &str = "Tabela";

/// One run's request parameters. `submitted_at` is set exactly once, when
/// the portal accepts the submission, and the whole intent is discarded at
/// the end of the run — it is never reused across runs.
#[derive(Debug, Clone)]
pub struct RequestIntent {
    pub states: Vec<String>,
    pub submitted_at: Option<NaiveDateTime>,
}

impl RequestIntent {
    pub fn new<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            states: states.into_iter().map(Into::into).collect(),
            submitted_at: None,
        }
    }
}

#[derive(Debug)]
pub struct ReportRequestSubmitter<'a> {
    session: &'a PortalSession,
    cnpj: &'a str,
}

impl<'a> ReportRequestSubmitter<'a> {
    pub fn new(session: &'a PortalSession, cnpj: &'a str) -> Self {
        Self { session, cnpj }
    }

    fn request_path(&self) -> String {
        format!("{REQUEST_PATH_PREFIX}?cnpj={}", self.cnpj)
    }

    /// Fetch the request page, echo its anti-forgery token back with the
    /// selected states, and classify the portal's answer. On acceptance the
    /// submission instant is captured from the *local* clock: the portal
    /// echoes no job id or timestamp, which is exactly why history
    /// reconciliation keys off this value.
    pub async fn submit<C: Clock>(
        &self,
        intent: &mut RequestIntent,
        clock: &C,
    ) -> Result<NaiveDateTime, PortalError> {
        let stage = "request_page";
        let path = self.request_path();

        let page = self.session.get_page(stage, &path).await?;
        if self.session.is_login_redirect(&page.final_url) {
            return Err(PortalError::SessionExpired { stage });
        }

        let early_errors = forms::validation_errors(&page.body)?;
        if !early_errors.is_empty() {
            warn!(stage, errors = ?early_errors, "request page already carries validation errors");
        }
        let state_options = forms::field_values(&page.body, STATES_FIELD)?;
        debug!(
            stage,
            options = state_options.len(),
            "state checkboxes found on request page"
        );

        let token = forms::anti_forgery_token(&page.body, stage)?;

        let stage = "request_submit";
        let mut form: Vec<(&str, String)> = vec![(forms::ANTI_FORGERY_FIELD, token)];
        for state in &intent.states {
            form.push((STATES_FIELD, state.clone()));
        }
        form.push((PURPOSE_FIELD, PURPOSE_VALUE.to_string()));

        let url = self.session.join(&path)?;
        let response = self
            .session
            .http()
            .post(url.clone())
            .form(&form)
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::REFERER, url.as_str())
            .send()
            .await
            .map_err(|err| PortalError::request(stage, err))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PortalError::HttpStatus {
                stage,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| PortalError::body(stage, err))?;
        let messages = forms::validation_errors(&body)?;
        if !messages.is_empty() {
            return Err(PortalError::ValidationRejected { messages });
        }

        let submitted_at = clock.now();
        intent.submitted_at = Some(submitted_at);
        info!(
            stage,
            states = intent.states.len(),
            %submitted_at,
            "report request accepted"
        );
        Ok(submitted_at)
    }
}
