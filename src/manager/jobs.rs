//! Adding, listing and removing jobs.

use super::{DownloadManager, ManagerState};
use crate::archive::ArchiveBinding;
use crate::error::{Error, Result};
use crate::types::{Event, Job, JobId, JobMetadata, JobStatus, NewJob, Protocol};
use crate::utils::base_name;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Fill fields the existing job lacks from a repeated request
fn merge_request(job: &mut Job, request: &NewJob) -> bool {
    let mut changed = job.metadata.merge_missing(&request.metadata);
    if job.source.is_none()
        && let Some(source) = non_empty(&request.source)
    {
        job.source = Some(source.to_string());
        changed = true;
    }
    if job.http_url.is_none()
        && let Some(url) = non_empty(&request.http_url)
    {
        job.http_url = Some(url.to_string());
        changed = true;
    }
    if job.size_bytes.is_none() && request.size_bytes.is_some() {
        job.size_bytes = request.size_bytes;
        changed = true;
    }
    if job.checksum.is_none()
        && let Some(checksum) = non_empty(&request.checksum)
    {
        job.checksum = Some(checksum.to_string());
        changed = true;
    }
    changed
}

impl DownloadManager {
    /// Request an artifact
    ///
    /// Resolution order:
    /// 1. A completed job for the same name whose file is still on disk is
    ///    returned as-is (missing details are back-filled)
    /// 2. A queued or downloading job for the same name is returned; no
    ///    duplicate is ever created while one is active
    /// 3. A file already at the destination becomes a `local` job without
    ///    any transfer
    /// 4. Otherwise a container locator selects the archive protocol and a
    ///    URL the HTTP protocol
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] when the name is empty or neither a
    ///   container nor a URL is given
    /// - [`Error::ContainerMissing`] when the container file is not on disk
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    ///
    /// Nothing is recorded when an error is returned. A name that matches no
    /// file inside the container is not an error: the job is recorded as
    /// `not_found`.
    pub async fn add_job(&self, request: NewJob) -> Result<Job> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidRequest("artifact name is empty".into()));
        }
        let destination = request
            .destination
            .clone()
            .unwrap_or_else(|| self.layout.default_destination(&request.metadata));

        let mut state = self.state.lock().await;

        // 1. Already downloaded and still on disk
        if let Some(job) = state.jobs.iter_mut().find(|j| {
            j.name == name && j.status == JobStatus::Completed && j.expected_path().is_file()
        }) {
            let changed = merge_request(job, &request);
            let job = job.clone();
            if changed {
                self.save_jobs(&state.jobs).await;
            }
            tracing::debug!(job_id = job.id.0, name = %name, "Artifact already downloaded");
            return Ok(job);
        }

        // 2. Already in flight
        if let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| j.name == name && j.status.is_active())
        {
            let changed = merge_request(job, &request);
            let job = job.clone();
            if changed {
                self.save_jobs(&state.jobs).await;
            }
            tracing::debug!(job_id = job.id.0, name = %name, "Job already active");
            return Ok(job);
        }

        // 3. Present on disk outside the job list
        let target = destination.join(base_name(&name));
        if target.is_file() {
            let mut job = self.new_record(&mut state, &name, &request, destination, Protocol::Local);
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.local_path = Some(target.clone());
            tracing::info!(job_id = job.id.0, path = %target.display(), "Artifact already present");

            state.jobs.push(job.clone());
            self.save_jobs(&state.jobs).await;
            self.emit_added(&job);
            self.emit_event(Event::Completed {
                id: job.id,
                path: target,
            });
            return Ok(job);
        }

        // 4. Pick a transport
        if let Some(source) = non_empty(&request.source) {
            let source = source.to_string();
            self.add_archive_job(&mut state, &name, &source, &request, destination)
                .await
        } else if non_empty(&request.http_url).is_some() {
            let mut job = self.new_record(&mut state, &name, &request, destination, Protocol::Http);
            job.status = JobStatus::Downloading;
            let id = job.id;
            state.jobs.push(job.clone());
            self.spawn_http_job(&mut state, id);
            self.save_jobs(&state.jobs).await;
            tracing::info!(job_id = id.0, name = %name, "HTTP job added");
            self.emit_added(&job);
            Ok(job)
        } else {
            Err(Error::InvalidRequest(format!(
                "no source given for {name}: provide a container locator or an HTTP URL"
            )))
        }
    }

    async fn add_archive_job(
        &self,
        state: &mut ManagerState,
        name: &str,
        source: &str,
        request: &NewJob,
        destination: PathBuf,
    ) -> Result<Job> {
        let container = self.layout.resolve_container(source, &request.metadata);
        if !container.is_file() {
            tracing::warn!(name, container = %container.display(), "Container file missing");
            return Err(Error::ContainerMissing { path: container });
        }

        self.open_binding(state, &container, &destination).await?;

        let mut job = self.new_record(state, name, request, destination, Protocol::Archive);
        let outcome = match state.bindings.get_mut(&container) {
            Some(binding) => binding.add_file_job(&mut job),
            None => Ok(false),
        };
        let matched = match outcome {
            Ok(matched) => matched,
            Err(e) => {
                close_if_unused(state, &container);
                return Err(e);
            }
        };

        if matched {
            job.status = JobStatus::Downloading;
            self.ensure_monitor(state, &container);
        }
        tracing::info!(
            job_id = job.id.0,
            name,
            container = %container.display(),
            status = %job.status,
            "Archive job added"
        );

        state.jobs.push(job.clone());
        self.save_jobs(&state.jobs).await;
        self.emit_added(&job);
        if !matched {
            self.emit_event(Event::NotFound {
                id: job.id,
                name: job.name.clone(),
            });
        }
        Ok(job)
    }

    /// Open a binding for `container` unless one is already open
    ///
    /// A new binding writes below `save_path`; an existing one keeps the save
    /// path it was opened with.
    pub(crate) async fn open_binding(
        &self,
        state: &mut ManagerState,
        container: &std::path::Path,
        save_path: &std::path::Path,
    ) -> Result<()> {
        if state.bindings.contains_key(container) {
            return Ok(());
        }
        let handle = self.engine.open(container, save_path).await?;
        tracing::info!(
            container = %container.display(),
            save_path = %save_path.display(),
            files = handle.files().len(),
            "Opened archive binding"
        );
        state.bindings.insert(
            container.to_path_buf(),
            ArchiveBinding::new(container, save_path, handle),
        );
        Ok(())
    }

    fn new_record(
        &self,
        state: &mut ManagerState,
        name: &str,
        request: &NewJob,
        destination: PathBuf,
        protocol: Protocol,
    ) -> Job {
        Job {
            id: state.allocate_id(),
            name: name.to_string(),
            source: non_empty(&request.source).map(str::to_string),
            http_url: non_empty(&request.http_url).map(str::to_string),
            destination,
            metadata: JobMetadata {
                console: request.metadata.known_console().map(str::to_string),
                manufacturer: request.metadata.known_manufacturer().map(str::to_string),
            },
            protocol,
            status: JobStatus::Queued,
            progress: 0.0,
            speed_kbps: 0.0,
            peers: 0,
            size_bytes: request.size_bytes,
            checksum: non_empty(&request.checksum).map(str::to_string),
            added_at: chrono::Utc::now(),
            local_path: None,
            error: None,
        }
    }

    fn emit_added(&self, job: &Job) {
        self.emit_event(Event::JobAdded {
            id: job.id,
            name: job.name.clone(),
            protocol: job.protocol,
        });
    }

    /// Snapshot of every job, in insertion order
    pub async fn list_jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    /// Snapshot of one job
    pub async fn get_job(&self, id: JobId) -> Option<Job> {
        self.state.lock().await.job(id).cloned()
    }

    /// Remove a job and stop its transfer
    ///
    /// An HTTP job's fetch task is cancelled; an archive job is unregistered
    /// from its container so the engine stops fetching the file. A container
    /// left without jobs is closed. Files already written stay on disk.
    pub async fn remove_job(&self, id: JobId) -> Result<Job> {
        let mut state = self.state.lock().await;
        let position = state
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        let job = state.jobs.remove(position);

        if let Some(token) = state.http_tasks.remove(&id) {
            token.cancel();
        }

        let mut unregistered = None;
        for (container, binding) in state.bindings.iter_mut() {
            if binding.file_index(id).is_none() {
                continue;
            }
            if let Err(e) = binding.remove_job(id) {
                tracing::warn!(job_id = id.0, error = %e, "Failed to update container selection");
            }
            unregistered = Some(container.clone());
            break;
        }
        if let Some(container) = unregistered {
            close_if_unused(&mut state, &container);
        }

        self.save_jobs(&state.jobs).await;
        tracing::info!(job_id = id.0, name = %job.name, "Job removed");
        self.emit_event(Event::Removed { id });
        Ok(job)
    }
}

/// Close a binding that has no registered jobs left
fn close_if_unused(state: &mut ManagerState, container: &Path) {
    if !state.bindings.get(container).is_some_and(|b| b.job_count() == 0) {
        return;
    }
    if let Some(mut binding) = state.bindings.remove(container) {
        binding.cancel_monitor();
        tracing::debug!(container = %container.display(), "Closed unused archive binding");
    }
}
