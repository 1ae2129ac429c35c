//! Re-attaching incomplete jobs at startup.

use super::{DownloadManager, ManagerState};
use crate::error::Result;
use crate::types::{Event, JobId, JobStatus, Protocol};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Outcome of [`DownloadManager::resume_incomplete_jobs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// Archive jobs re-registered with a binding
    pub archive: usize,
    /// HTTP jobs with a running fetch task
    pub http: usize,
    /// Jobs left as they were because their container is missing or unusable
    pub stalled: usize,
    /// Jobs marked `error` or `not_found` while resuming
    pub failed: usize,
}

impl DownloadManager {
    /// Re-attach every queued or downloading job
    ///
    /// Archive jobs are grouped by container; each container that exists is
    /// opened once and all of its jobs re-registered under one monitor.
    /// Jobs whose container is missing are left untouched. HTTP jobs restart
    /// from byte 0. A job without a usable source is marked `error`.
    ///
    /// Runs automatically when the manager is created. Calling it again is
    /// harmless: bound jobs are re-registered in place and running fetch
    /// tasks are not duplicated.
    pub async fn resume_incomplete_jobs(&self) -> Result<ResumeReport> {
        let mut report = ResumeReport::default();
        let mut state = self.state.lock().await;

        let active: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|j| j.status.is_active())
            .map(|j| j.id)
            .collect();
        if active.is_empty() {
            return Ok(report);
        }

        let mut groups: BTreeMap<PathBuf, Vec<JobId>> = BTreeMap::new();
        let mut fetches = Vec::new();
        let mut failures = Vec::new();
        for id in active {
            let Some(job) = state.job_mut(id) else {
                continue;
            };
            match job.protocol {
                Protocol::Archive => match job.source.clone() {
                    Some(source) => {
                        let container = self.layout.resolve_container(&source, &job.metadata);
                        groups.entry(container).or_default().push(id);
                    }
                    None => {
                        job.fail("no container locator recorded for this job");
                        failures.push(id);
                    }
                },
                Protocol::Http => {
                    if job.http_url.is_some() {
                        fetches.push(id);
                    } else {
                        job.fail("no download URL recorded for this job");
                        failures.push(id);
                    }
                }
                Protocol::Local => {
                    let path = job.expected_path();
                    if path.is_file() {
                        job.status = JobStatus::Completed;
                        job.progress = 100.0;
                        job.local_path = Some(path);
                    } else {
                        job.fail("local file is missing");
                        failures.push(id);
                    }
                }
            }
        }

        for id in fetches {
            self.spawn_http_job(&mut state, id);
            report.http += 1;
        }

        for (container, ids) in groups {
            if !container.is_file() {
                tracing::warn!(
                    container = %container.display(),
                    jobs = ids.len(),
                    "Container missing, leaving jobs stalled"
                );
                report.stalled += ids.len();
                continue;
            }

            let Some(save_path) = ids
                .first()
                .and_then(|id| state.job(*id))
                .map(|j| j.destination.clone())
            else {
                continue;
            };
            if let Err(e) = self.open_binding(&mut state, &container, &save_path).await {
                tracing::warn!(
                    container = %container.display(),
                    error = %e,
                    "Failed to open container, leaving jobs stalled"
                );
                report.stalled += ids.len();
                continue;
            }

            let mut bound = 0;
            for id in ids {
                let ManagerState { jobs, bindings, .. } = &mut *state;
                let (Some(binding), Some(job)) =
                    (bindings.get_mut(&container), jobs.iter_mut().find(|j| j.id == id))
                else {
                    continue;
                };
                match binding.add_file_job(job) {
                    Ok(true) => {
                        job.status = JobStatus::Downloading;
                        bound += 1;
                    }
                    Ok(false) => {
                        report.failed += 1;
                        self.emit_event(Event::NotFound {
                            id,
                            name: job.name.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(job_id = id.0, error = %e, "Failed to re-register job");
                        report.stalled += 1;
                    }
                }
            }
            if bound > 0 {
                self.ensure_monitor(&mut state, &container);
            }
            report.archive += bound;
        }

        report.failed += failures.len();
        for id in failures {
            if let Some(job) = state.job(id) {
                self.emit_event(Event::Failed {
                    id,
                    error: job.error.clone().unwrap_or_default(),
                });
            }
        }

        self.save_jobs(&state.jobs).await;
        tracing::info!(
            archive = report.archive,
            http = report.http,
            stalled = report.stalled,
            failed = report.failed,
            "Resumed incomplete jobs"
        );
        Ok(report)
    }
}
