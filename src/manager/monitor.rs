//! Per-container progress polling.

use super::{DownloadManager, ManagerState};
use crate::types::{Event, JobId, JobStatus};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

impl DownloadManager {
    /// Start the monitor of a binding unless it already runs
    pub(crate) fn ensure_monitor(&self, state: &mut ManagerState, container: &Path) {
        let Some(binding) = state.bindings.get_mut(container) else {
            return;
        };
        if binding.is_monitored() {
            return;
        }

        let token = CancellationToken::new();
        binding.set_monitor(token.clone());

        let manager = self.clone();
        let container = container.to_path_buf();
        tokio::spawn(async move {
            manager.run_monitor(container, token).await;
        });
    }

    /// Poll a binding until its jobs complete, it fails, or it is cancelled
    async fn run_monitor(&self, container: PathBuf, token: CancellationToken) {
        let interval = self.config.archive.poll_interval;
        tracing::debug!(container = %container.display(), "Archive monitor started");

        loop {
            if !self.poll_binding(&container, &token).await {
                break;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::debug!(container = %container.display(), "Archive monitor stopped");
    }

    /// One progress poll; returns whether monitoring should continue
    ///
    /// The monitor flag is cleared under the same lock that observed the
    /// final state, so a job added afterwards always gets a fresh monitor.
    async fn poll_binding(&self, container: &Path, token: &CancellationToken) -> bool {
        let mut state = self.state.lock().await;
        if token.is_cancelled() {
            return false;
        }

        let ManagerState { jobs, bindings, .. } = &mut *state;
        let Some(binding) = bindings.get_mut(container) else {
            return false;
        };

        let before: Vec<(JobId, JobStatus)> = binding
            .job_ids()
            .filter_map(|id| jobs.iter().find(|j| j.id == id).map(|j| (id, j.status)))
            .collect();

        let all_complete = match binding.update_progress(jobs).await {
            Ok(all_complete) => all_complete,
            Err(e) => {
                tracing::error!(
                    container = %container.display(),
                    error = %e,
                    "Archive monitor failed, stopping"
                );
                binding.clear_monitor();
                return false;
            }
        };
        if all_complete {
            binding.clear_monitor();
            tracing::info!(container = %container.display(), "All archive jobs complete");
        }

        for (id, previous) in before {
            let Some(job) = jobs.iter().find(|j| j.id == id) else {
                continue;
            };
            match job.status {
                JobStatus::Completed if previous != JobStatus::Completed => {
                    tracing::info!(job_id = id.0, name = %job.name, "Archive job completed");
                    self.emit_event(Event::Completed {
                        id,
                        path: job.expected_path(),
                    });
                }
                JobStatus::Downloading => self.emit_event(Event::Progress {
                    id,
                    percent: job.progress,
                    speed_kbps: job.speed_kbps,
                    peers: job.peers,
                }),
                _ => {}
            }
        }

        self.save_jobs(jobs).await;
        !all_complete
    }
}
