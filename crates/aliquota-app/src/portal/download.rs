//! Streaming artifact download with progress accounting.

use std::path::Path;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::Url;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{PortalError, PortalSession};

#[derive(Debug)]
pub struct ArtifactDownloader<'a> {
    session: &'a PortalSession,
}

impl<'a> ArtifactDownloader<'a> {
    pub fn new(session: &'a PortalSession) -> Self {
        Self { session }
    }

    /// Stream `url` into `destination` chunk by chunk, overwriting any
    /// previous artifact; the whole file is never held in memory. A
    /// non-2xx status is fatal for this call — retries are the
    /// orchestrator's concern.
    pub async fn download(
        &self,
        url: &Url,
        destination: &Path,
        show_progress: bool,
    ) -> Result<u64, PortalError> {
        let stage = "download";
        info!(stage, %url, destination = %destination.display(), "starting artifact download");

        let response = self
            .session
            .http()
            .get(url.clone())
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

        let total = response.content_length();

        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(destination).await?;

        let progress = show_progress.then(|| make_progress(total));
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| PortalError::body(stage, err))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(pb) = &progress {
                pb.set_position(downloaded);
            }
        }
        file.flush().await?;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        info!(
            stage,
            bytes = downloaded,
            total = ?total,
            destination = %destination.display(),
            "artifact stored"
        );
        Ok(downloaded)
    }
}

fn make_progress(total: Option<u64>) -> ProgressBar {
    let pb = match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} [{elapsed_precise}] {bytes}/{total_bytes} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {bytes} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    };
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb
}
