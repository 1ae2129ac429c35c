//! Direct HTTP fetch tasks.

use super::{DownloadManager, ManagerState};
use crate::error::{Error, Result};
use crate::http::FetchOutcome;
use crate::types::{Event, JobId, JobStatus};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// What a fetch task needs from the job record
struct FetchTarget {
    url: String,
    destination: PathBuf,
    file_name: String,
    checksum: Option<String>,
}

impl DownloadManager {
    /// Spawn the fetch task of an HTTP job unless one is already running
    pub(crate) fn spawn_http_job(&self, state: &mut ManagerState, id: JobId) {
        if state.http_tasks.contains_key(&id) {
            tracing::debug!(job_id = id.0, "Fetch task already running");
            return;
        }
        let token = CancellationToken::new();
        state.http_tasks.insert(id, token.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_http_job(id, token).await;
        });
    }

    async fn run_http_job(&self, id: JobId, token: CancellationToken) {
        // The job stays `downloading` while it waits for a slot
        let permit = tokio::select! {
            _ = token.cancelled() => return,
            permit = self.http_slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let target = {
            let state = self.state.lock().await;
            state.job(id).and_then(|job| {
                Some(FetchTarget {
                    url: job.http_url.clone()?,
                    destination: job.destination.clone(),
                    file_name: job.file_name().to_string(),
                    checksum: job.checksum.clone(),
                })
            })
        };
        let Some(target) = target else {
            self.finish_http_job(id, &token, Err(Error::InvalidRequest("job has no download URL".into())))
                .await;
            return;
        };

        tracing::info!(job_id = id.0, url = %target.url, "HTTP download started");
        let result = tokio::select! {
            _ = token.cancelled() => None,
            result = self.fetch(id, &target) => Some(result),
        };
        drop(permit);

        match result {
            Some(result) => self.finish_http_job(id, &token, result).await,
            None => tracing::info!(job_id = id.0, "HTTP download cancelled"),
        }
    }

    async fn fetch(&self, id: JobId, target: &FetchTarget) -> Result<FetchOutcome> {
        let mut transfer = self
            .fetcher
            .start(
                &target.url,
                &target.destination,
                &target.file_name,
                target.checksum.as_deref(),
            )
            .await?;

        while let Some(progress) = transfer.advance().await? {
            let mut state = self.state.lock().await;
            let Some(job) = state.job_mut(id) else {
                continue;
            };
            if job.status != JobStatus::Downloading {
                continue;
            }
            job.progress = job.progress.max(progress.percent);
            job.speed_kbps = progress.speed_kbps;
            job.peers = 0;
            let event = Event::Progress {
                id,
                percent: job.progress,
                speed_kbps: job.speed_kbps,
                peers: 0,
            };
            self.save_jobs(&state.jobs).await;
            self.emit_event(event);
        }

        transfer.finish().await
    }

    async fn finish_http_job(&self, id: JobId, token: &CancellationToken, result: Result<FetchOutcome>) {
        let mut state = self.state.lock().await;
        if token.is_cancelled() {
            return;
        }
        state.http_tasks.remove(&id);

        let Some(job) = state.job_mut(id) else {
            return;
        };
        let event = match result {
            Ok(outcome) => {
                job.status = JobStatus::Completed;
                job.progress = 100.0;
                job.speed_kbps = 0.0;
                job.local_path = Some(outcome.path.clone());
                job.error = None;
                tracing::info!(
                    job_id = id.0,
                    path = %outcome.path.display(),
                    bytes = outcome.bytes,
                    "HTTP download completed"
                );
                Event::Completed {
                    id,
                    path: outcome.path,
                }
            }
            Err(e) => {
                tracing::warn!(job_id = id.0, error = %e, "HTTP download failed");
                job.fail(e.to_string());
                Event::Failed {
                    id,
                    error: e.to_string(),
                }
            }
        };

        self.save_jobs(&state.jobs).await;
        self.emit_event(event);
    }
}
