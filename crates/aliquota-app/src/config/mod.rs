//! Configuration loading: defaults, optional file source, and
//! `ALIQUOTA__`-prefixed environment overrides.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::portal::Credentials;

const CONFIG_FILE: &str = "config/aliquota";
const ENV_PREFIX: &str = "ALIQUOTA";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error("portal base URL is not configured (set ALIQUOTA__PORTAL__BASE_URL)")]
    MissingBaseUrl,
    #[error("company CNPJ is not configured (set ALIQUOTA__PORTAL__CNPJ)")]
    MissingCnpj,
    #[error(
        "portal credentials are not configured (set ALIQUOTA__PORTAL__EMAIL and ALIQUOTA__PORTAL__PASSWORD)"
    )]
    MissingCredentials,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortalConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub cnpj: Option<String>,
    /// Comma-separated two-letter state codes, e.g. `"CE,SP"`.
    pub states: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: Option<String>,
}

impl AppConfig {
    pub fn base_url(&self) -> Result<&str, AppConfigError> {
        self.portal
            .base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(AppConfigError::MissingBaseUrl)
    }

    pub fn cnpj(&self) -> Result<&str, AppConfigError> {
        self.portal
            .cnpj
            .as_deref()
            .filter(|cnpj| !cnpj.is_empty())
            .ok_or(AppConfigError::MissingCnpj)
    }

    pub fn states(&self) -> Vec<String> {
        split_states(&self.portal.states)
    }

    /// Credentials are read from configuration but never written back out.
    pub fn credentials(&self) -> Result<Credentials, AppConfigError> {
        match (&self.portal.email, &self.portal.password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Ok(Credentials {
                    email: email.clone(),
                    password: password.clone(),
                })
            }
            _ => Err(AppConfigError::MissingCredentials),
        }
    }
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_storage = default_storage_path()?;
    let builder = Config::builder()
        .set_default("portal.states", "CE")?
        .set_default("polling.max_attempts", 30)?
        .set_default("polling.delay_secs", 10)?
        .set_default(
            "storage.path",
            default_storage.to_string_lossy().to_string(),
        )?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("br", "aliquota", "aliquota").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_storage_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

fn split_states(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|state| !state.is_empty())
        .map(str::to_string)
        .collect()
}
