//! Telegram Bot API broadcaster.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use tracing::{debug, warn};

use super::{BroadcastReport, Broadcaster, DestinationRegistry, NotifyError};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const PARSE_MODE: &str = "Markdown";

pub struct TelegramBroadcaster {
    http: reqwest::Client,
    api_base: String,
    token: String,
    registry: DestinationRegistry,
}

impl TelegramBroadcaster {
    pub fn new(
        token: impl Into<String>,
        registry: DestinationRegistry,
    ) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| NotifyError::Request { source })?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            registry,
        })
    }

    /// Point at a different API host; tests use this against a mock server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.endpoint("sendMessage"))
            .form(&[
                ("chat_id", chat_id),
                ("text", text),
                ("parse_mode", PARSE_MODE),
            ])
            .send()
            .await
            .map_err(|source| NotifyError::Request { source })?
            .error_for_status()
            .map_err(|source| NotifyError::Request { source })?;
        debug!(chat_id, status = %response.status(), "message delivered");
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), NotifyError> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", PARSE_MODE)
            .part("document", part);

        let response = self
            .http
            .post(self.endpoint("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|source| NotifyError::Request { source })?
            .error_for_status()
            .map_err(|source| NotifyError::Request { source })?;
        debug!(chat_id, status = %response.status(), "document delivered");
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for TelegramBroadcaster {
    async fn broadcast_text(&self, message: &str) -> Result<BroadcastReport, NotifyError> {
        let mut report = BroadcastReport::default();
        for chat_id in self.registry.active_destinations()? {
            match self.send_message(&chat_id, message).await {
                Ok(()) => report.sent += 1,
                Err(err) => {
                    warn!(chat_id = %chat_id, error = %err, "failed to deliver announcement");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn broadcast_file(
        &self,
        path: &Path,
        caption: &str,
    ) -> Result<BroadcastReport, NotifyError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| NotifyError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("tabela.zip");

        let mut report = BroadcastReport::default();
        for chat_id in self.registry.active_destinations()? {
            match self
                .send_document(&chat_id, file_name, bytes.clone(), caption)
                .await
            {
                Ok(()) => report.sent += 1,
                Err(err) => {
                    warn!(chat_id = %chat_id, error = %err, "failed to deliver document");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
