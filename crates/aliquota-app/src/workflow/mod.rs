//! Sequencing of the retrieval-and-reconciliation workflow.
//!
//! Precondition: one workflow run at a time per portal account. The portal
//! exposes no job-id correlation, so two concurrent runs can misattribute
//! each other's history artifacts; the persisted version record is
//! likewise single-writer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::notify::Broadcaster;
use crate::paths::AppPaths;
use crate::portal::{
    ArtifactDownloader, Credentials, PollOptions, PollingResolver, PortalError, PortalSession,
    ReportRequestSubmitter, RequestIntent,
};
use crate::version::{RemoteVersion, UpdateVerdict, VersionComparator, VersionStore};

/// Terminal outcome of one workflow run.
#[derive(Debug)]
pub enum WorkflowOutcome {
    UpToDate {
        remote: RemoteVersion,
    },
    Downloaded {
        artifact: PathBuf,
        bytes: u64,
        remote: Option<RemoteVersion>,
    },
}

pub struct WorkflowRunner<C: Clock> {
    base_url: String,
    cnpj: String,
    states: Vec<String>,
    credentials: Credentials,
    poll: PollOptions,
    artifact_path: PathBuf,
    store: VersionStore,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    clock: C,
    show_progress: bool,
}

impl<C: Clock> WorkflowRunner<C> {
    pub fn from_config(config: &AppConfig, paths: &AppPaths, clock: C) -> Result<Self, AppError> {
        Ok(Self {
            base_url: config.base_url()?.to_string(),
            cnpj: config.cnpj()?.to_string(),
            states: config.states(),
            credentials: config.credentials()?,
            poll: PollOptions::builder()
                .max_attempts(config.polling.max_attempts)
                .delay(Duration::from_secs(config.polling.delay_secs))
                .build(),
            artifact_path: paths.artifact_path(),
            store: VersionStore::new(paths.version_record_path()),
            broadcaster: None,
            clock,
            show_progress: true,
        })
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_artifact_path(mut self, path: PathBuf) -> Self {
        self.artifact_path = path;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Version-gated run: compare the published banner against the
    /// persisted record, retrieve only when needed, then persist and
    /// announce. A failed version check never blocks retrieval — skipping
    /// a required table update is worse than a redundant download.
    pub async fn run_check_and_download(&self) -> Result<WorkflowOutcome, AppError> {
        let comparator = VersionComparator::new(&self.base_url)?;
        let persisted = self.store.load()?;

        let remote = match comparator.check_for_update(persisted.as_ref()).await {
            Ok(UpdateVerdict::UpToDate(remote)) => {
                if let Some(mut record) = persisted {
                    record.checked_at = Some(self.clock.now());
                    self.store.save(&record)?;
                }
                info!(
                    version = %remote.version,
                    vigencia_ate = %remote.vigencia_ate,
                    "table already up to date"
                );
                return Ok(WorkflowOutcome::UpToDate { remote });
            }
            Ok(UpdateVerdict::NeedsUpdate(remote)) => {
                info!(
                    version = %remote.version,
                    vigencia_ate = %remote.vigencia_ate,
                    "new table version published"
                );
                Some(remote)
            }
            Err(err) => {
                warn!(error = %err, "version check failed; assuming an update is needed");
                None
            }
        };

        self.retrieve_and_distribute(&comparator, remote).await
    }

    /// Unconditional retrieval, skipping the version gate.
    pub async fn run_fetch(&self) -> Result<WorkflowOutcome, AppError> {
        let comparator = VersionComparator::new(&self.base_url)?;
        self.retrieve_and_distribute(&comparator, None).await
    }

    async fn retrieve_and_distribute(
        &self,
        comparator: &VersionComparator,
        known_remote: Option<RemoteVersion>,
    ) -> Result<WorkflowOutcome, AppError> {
        let bytes = self.retrieve_with_relogin().await?;

        let remote = match known_remote {
            Some(remote) => Some(remote),
            // The pre-download check failed open (or was skipped); fetch
            // the banner once more so the persisted record reflects what
            // was actually downloaded.
            None => match comparator.fetch_remote().await {
                Ok(remote) => Some(remote),
                Err(err) => {
                    warn!(error = %err, "could not refresh the version banner after download");
                    None
                }
            },
        };

        if let Some(remote) = &remote {
            self.store
                .save(&remote.clone().into_record(self.clock.now()))?;
        }

        self.broadcast(remote.as_ref()).await;

        Ok(WorkflowOutcome::Downloaded {
            artifact: self.artifact_path.clone(),
            bytes,
            remote,
        })
    }

    /// A silently dropped session is the one recoverable failure: restart
    /// the whole login → submit → poll → download sequence once. A second
    /// expiry is terminal.
    async fn retrieve_with_relogin(&self) -> Result<u64, AppError> {
        match self.retrieve_once().await {
            Ok(bytes) => Ok(bytes),
            Err(PortalError::SessionExpired { stage }) => {
                warn!(stage, "session expired mid-run; restarting the workflow once");
                Ok(self.retrieve_once().await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn retrieve_once(&self) -> Result<u64, PortalError> {
        let session = PortalSession::new(&self.base_url)?;
        session.login(&self.credentials).await?;
        session.open_home().await?;

        let submitter = ReportRequestSubmitter::new(&session, &self.cnpj);
        let mut intent = RequestIntent::new(self.states.iter().cloned());
        let submitted_at = submitter.submit(&mut intent, &self.clock).await?;

        let resolver = PollingResolver::new(&session, &self.cnpj);
        let artifact = resolver
            .resolve(submitted_at, &self.poll, &self.clock)
            .await?;

        let downloader = ArtifactDownloader::new(&session);
        downloader
            .download(&artifact.download_url, &self.artifact_path, self.show_progress)
            .await
    }

    /// Announce the new table, then ship the archive itself.
    /// Per-destination failures are counted by the broadcaster; a failed
    /// broadcast never fails the run.
    async fn broadcast(&self, remote: Option<&RemoteVersion>) {
        let Some(broadcaster) = &self.broadcaster else {
            return;
        };

        let headline = match remote {
            Some(remote) => format!(
                "🆕 *Nova versão {} (válida até {})*\n\nA tabela de alíquotas foi atualizada e está disponível para download.",
                remote.version, remote.vigencia_ate
            ),
            None => "🆕 *Nova versão disponível*\n\nA tabela de alíquotas foi atualizada e está disponível para download."
                .to_string(),
        };
        match broadcaster.broadcast_text(&headline).await {
            Ok(report) => info!(
                sent = report.sent,
                failed = report.failed,
                "update announcement broadcast"
            ),
            Err(err) => warn!(error = %err, "failed to broadcast the update announcement"),
        }

        let caption = match remote {
            Some(remote) => format!(
                "📊 *Tabela de alíquotas — versão {} (válida até {})*",
                remote.version, remote.vigencia_ate
            ),
            None => "📊 *Tabela de alíquotas atualizada*".to_string(),
        };
        match broadcaster.broadcast_file(&self.artifact_path, &caption).await {
            Ok(report) => info!(
                sent = report.sent,
                failed = report.failed,
                "artifact broadcast"
            ),
            Err(err) => warn!(error = %err, "failed to broadcast the artifact"),
        }
    }
}
