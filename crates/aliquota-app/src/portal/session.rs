//! Cookie-bearing portal session: login, proof-of-auth classification, and
//! silent-expiry detection.

use std::time::Duration;

use reqwest::{Client, Url, header};
use tracing::{debug, info, warn};

use super::{PortalError, forms};

pub const LOGIN_PAGE_PATH: &str = "Site/Entrar";
pub const LOGIN_POST_PATH: &str = "Usuario/Login";
pub const HOME_PATH: &str = "Empresa/Home";

/// Any of these in a lowercased login response means the credentials were
/// refused even though the transport succeeded.
const NEGATIVE_MARKERS: &[&str] = &["credenciais", "inválid", "incorret"];

/// Proof-of-auth text; at least one must appear on an authenticated page.
const POSITIVE_MARKERS: &[&str] = &[
    "Gerenciar empresa",
    "Dashboard",
    "Minha Empresa",
    "Minha Conta",
];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub(crate) const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml";
const ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7";

/// Login identity; supplied by the caller and never persisted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// A portal response after redirects, with the URL it actually landed on.
#[derive(Debug)]
pub(crate) struct PageResponse {
    pub final_url: Url,
    pub body: String,
}

/// Explicitly constructed session owning the cookie store; one instance per
/// workflow run, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct PortalSession {
    base_url: Url,
    http: Client,
}

impl PortalSession {
    pub fn new(base_url: &str) -> Result<Self, PortalError> {
        let parsed = Url::parse(base_url)
            .map_err(|_| PortalError::InvalidBaseUrl(base_url.to_string()))?;

        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| PortalError::request("build_client", err))?;

        Ok(Self {
            base_url: parsed,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn join(&self, path: &str) -> Result<Url, PortalError> {
        self.base_url.join(path).map_err(|err| PortalError::UrlJoin {
            path: path.to_string(),
            source: std::sync::Arc::new(err),
        })
    }

    /// A response that landed back on the login page means the portal
    /// silently dropped the session.
    pub fn is_login_redirect(&self, url: &Url) -> bool {
        url.path().contains("/Site/Entrar")
    }

    pub(crate) async fn get_page(
        &self,
        stage: &'static str,
        path: &str,
    ) -> Result<PageResponse, PortalError> {
        let url = self.join(path)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| PortalError::request(stage, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::HttpStatus {
                stage,
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|err| PortalError::body(stage, err))?;
        Ok(PageResponse { final_url, body })
    }

    /// Log in and classify the outcome. Order matters: a redirect back to
    /// the login URL beats marker inspection, negative markers beat
    /// positive ones, and a response with neither is ambiguous rather than
    /// a success.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), PortalError> {
        let stage = "login";
        info!(stage, url = %self.base_url, "fetching login page");

        let page = self.get_page(stage, LOGIN_PAGE_PATH).await?;
        let token = forms::anti_forgery_token(&page.body, stage)?;
        debug!(
            stage,
            token_prefix = &token[..token.len().min(10)],
            "anti-forgery token extracted"
        );

        let login_page_url = self.join(LOGIN_PAGE_PATH)?;
        let post_url = self.join(LOGIN_POST_PATH)?;
        let form = [
            (forms::ANTI_FORGERY_FIELD, token.as_str()),
            ("Email", credentials.email.as_str()),
            ("Senha", credentials.password.as_str()),
            ("RememberMe", "false"),
        ];

        let response = self
            .http
            .post(post_url)
            .form(&form)
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .header(header::ORIGIN, self.base_url.origin().ascii_serialization())
            .header(header::REFERER, login_page_url.as_str())
            .send()
            .await
            .map_err(|err| PortalError::request(stage, err))?;

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|err| PortalError::body(stage, err))?;

        if self.is_login_redirect(&final_url) {
            warn!(stage, url = %final_url, "redirected back to the login page");
            return Err(PortalError::InvalidCredentials);
        }

        let lowered = body.to_lowercase();
        if let Some(marker) = NEGATIVE_MARKERS.iter().copied().find(|m| lowered.contains(m)) {
            warn!(stage, marker, "credential rejection marker in response");
            return Err(PortalError::InvalidCredentials);
        }

        match POSITIVE_MARKERS.iter().copied().find(|m| body.contains(m)) {
            Some(marker) => {
                info!(stage, marker, "authentication confirmed");
                Ok(())
            }
            None => {
                warn!(stage, "no proof-of-auth marker found in login response");
                Err(PortalError::AuthenticationUnconfirmed { body })
            }
        }
    }

    /// Open the authenticated landing page, verifying the session is live.
    pub async fn open_home(&self) -> Result<(), PortalError> {
        let stage = "home";
        let page = self.get_page(stage, HOME_PATH).await?;

        if self.is_login_redirect(&page.final_url) {
            return Err(PortalError::SessionExpired { stage });
        }
        if !POSITIVE_MARKERS.iter().any(|m| page.body.contains(m)) {
            warn!(stage, "landing page carries no proof-of-auth marker");
            return Err(PortalError::AuthenticationUnconfirmed { body: page.body });
        }

        info!(stage, "landing page reachable while authenticated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_is_detected_by_path() {
        let session = PortalSession::new("https://portal.example/").expect("session");
        let expired = Url::parse("https://portal.example/Site/Entrar?ReturnUrl=%2FEmpresa").unwrap();
        let live = Url::parse("https://portal.example/Empresa/Home").unwrap();
        assert!(session.is_login_redirect(&expired));
        assert!(!session.is_login_redirect(&live));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = PortalSession::new("not a url").unwrap_err();
        assert!(matches!(err, PortalError::InvalidBaseUrl(_)));
    }
}
