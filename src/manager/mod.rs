//! Download manager split into focused submodules.
//!
//! The `DownloadManager` struct and its methods are organized by domain:
//! - [`jobs`] - Adding, listing and removing jobs
//! - [`monitor`] - Per-container progress polling
//! - [`http_jobs`] - Direct HTTP fetch tasks
//! - [`resume`] - Re-attaching incomplete jobs at startup
//! - [`lifecycle`] - Shutdown coordination

mod http_jobs;
mod jobs;
mod lifecycle;
mod monitor;
mod resume;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use resume::ResumeReport;

use crate::archive::{ArchiveBinding, ArchiveEngine, DiskWatchEngine};
use crate::config::Config;
use crate::error::Result;
use crate::http::HttpFetcher;
use crate::paths::LibraryLayout;
use crate::store::JobStore;
use crate::types::{Event, Job, JobId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;

/// Capacity of the event channel before slow subscribers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Everything guarded by the manager's single lock
pub(crate) struct ManagerState {
    /// Full job list, in insertion order
    pub(crate) jobs: Vec<Job>,
    /// Open containers by resolved container path
    pub(crate) bindings: HashMap<PathBuf, ArchiveBinding>,
    /// Cancellation tokens of running HTTP fetch tasks
    pub(crate) http_tasks: HashMap<JobId, CancellationToken>,
    /// Next job id to hand out
    pub(crate) next_id: u64,
}

impl ManagerState {
    fn new(jobs: Vec<Job>) -> Self {
        let next_id = jobs.iter().map(|j| j.id.0).max().unwrap_or(0) + 1;
        Self {
            jobs,
            bindings: HashMap::new(),
            http_tasks: HashMap::new(),
            next_id,
        }
    }

    pub(crate) fn allocate_id(&mut self) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub(crate) fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }
}

/// Orchestrates archive and HTTP jobs (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadManager {
    /// Job list, bindings and task tokens behind one coarse lock
    pub(crate) state: Arc<tokio::sync::Mutex<ManagerState>>,
    /// Persisted job list
    pub(crate) store: Arc<JobStore>,
    /// Container and destination path resolution
    pub(crate) layout: Arc<LibraryLayout>,
    /// Engine used to open containers
    pub(crate) engine: Arc<dyn ArchiveEngine>,
    /// HTTP client for direct downloads
    pub(crate) fetcher: HttpFetcher,
    /// Limits concurrently running HTTP transfers
    pub(crate) http_slots: Arc<tokio::sync::Semaphore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl DownloadManager {
    /// Create a manager that tracks transfers through a [`DiskWatchEngine`]
    ///
    /// See [`with_engine`](Self::with_engine).
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_engine(config, Arc::new(DiskWatchEngine::new())).await
    }

    /// Create a manager backed by the given archive engine
    ///
    /// This loads the persisted job list (an unreadable list is treated as
    /// empty) and re-attaches every queued or downloading job, so it must
    /// run inside a tokio runtime.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use romfetch::{Config, DownloadManager, NewJob, JobMetadata};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let manager = DownloadManager::new(Config::default()).await?;
    ///
    /// let job = manager
    ///     .add_job(
    ///         NewJob::new("Sonic.bin")
    ///             .from_container("genesis.torrent")
    ///             .metadata(JobMetadata::new("Sega", "Genesis")),
    ///     )
    ///     .await?;
    /// println!("{} is {}", job.name, job.status);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_engine(config: Config, engine: Arc<dyn ArchiveEngine>) -> Result<Self> {
        config.validate()?;

        let store = JobStore::new(config.library.jobs_file.clone());
        let jobs = store.load().await;
        tracing::info!(
            jobs = jobs.len(),
            engine = engine.name(),
            jobs_file = %store.path().display(),
            "Download manager starting"
        );

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Self {
            state: Arc::new(tokio::sync::Mutex::new(ManagerState::new(jobs))),
            store: Arc::new(store),
            layout: Arc::new(LibraryLayout::new(&config.library)),
            engine,
            fetcher: HttpFetcher::new(&config.http)?,
            http_slots: Arc::new(tokio::sync::Semaphore::new(config.http.max_concurrent)),
            event_tx,
            config: Arc::new(config),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        manager.resume_incomplete_jobs().await?;
        Ok(manager)
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`. Events are
    /// advisory; [`list_jobs`](Self::list_jobs) is the source of truth.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Directory layout used for containers and destinations
    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }

    // send() only fails when nobody is subscribed
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Persist the job list, logging instead of failing
    ///
    /// Called with the state lock held so writes never interleave.
    pub(crate) async fn save_jobs(&self, jobs: &[Job]) {
        if let Err(e) = self.store.save(jobs).await {
            tracing::error!(
                error = %e,
                path = %self.store.path().display(),
                "Failed to persist job list"
            );
        }
    }
}
