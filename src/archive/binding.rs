//! One open container and the jobs matched into it

use super::{ContainerHandle, PRIORITY_FETCH, PRIORITY_SKIP};
use crate::error::Result;
use crate::types::{Job, JobId, JobStatus};
use crate::utils::{base_name, round2, split_extension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Binds jobs to file indices of one container
///
/// The binding owns the container handle. Jobs themselves stay in the
/// manager's job list; the binding only records `(job id, file index)` pairs
/// and is handed the list whenever it needs to update job state.
pub struct ArchiveBinding {
    container: PathBuf,
    save_path: PathBuf,
    handle: Box<dyn ContainerHandle>,
    entries: Vec<(JobId, usize)>,
    monitor: Option<CancellationToken>,
}

impl std::fmt::Debug for ArchiveBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBinding")
            .field("container", &self.container)
            .field("save_path", &self.save_path)
            .field("entries", &self.entries)
            .field("monitored", &self.monitor.is_some())
            .finish()
    }
}

impl ArchiveBinding {
    /// Wrap an opened container
    pub fn new(
        container: impl Into<PathBuf>,
        save_path: impl Into<PathBuf>,
        handle: Box<dyn ContainerHandle>,
    ) -> Self {
        Self {
            container: container.into(),
            save_path: save_path.into(),
            handle,
            entries: Vec::new(),
            monitor: None,
        }
    }

    /// Container file this binding was opened from
    pub fn container(&self) -> &Path {
        &self.container
    }

    /// Directory the container's files are written below
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// Number of registered jobs
    pub fn job_count(&self) -> usize {
        self.entries.len()
    }

    /// Registered job ids in registration order
    pub fn job_ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// File index a job is bound to
    pub fn file_index(&self, id: JobId) -> Option<usize> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, index)| *index)
    }

    /// File indices currently selected for fetching
    pub fn wanted_indices(&self) -> BTreeSet<usize> {
        self.entries.iter().map(|(_, index)| *index).collect()
    }

    /// Find the container file for an artifact name
    ///
    /// An exact case-insensitive filename match wins. Otherwise the first file
    /// (in container order) whose stem contains the artifact's stem matches,
    /// which covers regional variants such as `Sonic (USA).bin` for `Sonic.bin`.
    pub fn match_file(&self, name: &str) -> Option<usize> {
        let target = base_name(name).to_lowercase();
        let files = self.handle.files();

        if let Some(file) = files
            .iter()
            .find(|f| f.file_name().to_lowercase() == target)
        {
            return Some(file.index);
        }

        let (stem, _) = split_extension(&target);
        if stem.is_empty() {
            return None;
        }
        files
            .iter()
            .find(|f| {
                let candidate = f.file_name().to_lowercase();
                split_extension(&candidate).0.contains(stem)
            })
            .map(|f| f.index)
    }

    /// Register a job against the matching container file
    ///
    /// Returns false and marks the job `not_found` when nothing matches; the
    /// selection is left untouched in that case. Registering a job that is
    /// already bound replaces its entry. When the engine rejects the new
    /// selection the error is returned and the registrations are unchanged.
    pub fn add_file_job(&mut self, job: &mut Job) -> Result<bool> {
        let Some(index) = self.match_file(&job.name) else {
            tracing::info!(
                job_id = job.id.0,
                name = %job.name,
                container = %self.container.display(),
                "No matching file in container"
            );
            job.status = JobStatus::NotFound;
            job.speed_kbps = 0.0;
            job.peers = 0;
            return Ok(false);
        };

        let mut entries = self.entries.clone();
        match entries.iter_mut().find(|(id, _)| *id == job.id) {
            Some(entry) => entry.1 = index,
            None => entries.push((job.id, index)),
        }
        self.handle.set_priorities(&self.priorities_for(&entries))?;
        self.entries = entries;

        tracing::debug!(
            job_id = job.id.0,
            file_index = index,
            file = self.file_path(index).unwrap_or("?"),
            "Bound job to container file"
        );
        Ok(true)
    }

    /// Unregister a job, returning whether it was bound
    ///
    /// The job is unregistered even when the engine rejects the reduced
    /// selection; the error is still returned.
    pub fn remove_job(&mut self, id: JobId) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.update_priorities()?;
        Ok(true)
    }

    /// Select exactly the files referenced by registered jobs
    pub fn update_priorities(&self) -> Result<()> {
        self.handle.set_priorities(&self.priorities_for(&self.entries))
    }

    fn priorities_for(&self, entries: &[(JobId, usize)]) -> Vec<u8> {
        let mut priorities = vec![PRIORITY_SKIP; self.handle.files().len()];
        for (_, index) in entries {
            if let Some(priority) = priorities.get_mut(*index) {
                *priority = PRIORITY_FETCH;
            }
        }
        priorities
    }

    fn file_path(&self, index: usize) -> Option<&str> {
        self.handle.files().get(index).map(|f| f.path.as_str())
    }

    /// Refresh progress of every registered job from the container
    ///
    /// `jobs` is the manager's job list; entries whose job is no longer in
    /// it are ignored. Returns true once every registered job is completed.
    pub async fn update_progress(&self, jobs: &mut [Job]) -> Result<bool> {
        let downloaded = self.handle.file_progress().await?;
        let stats = self.handle.stats().await?;
        let files = self.handle.files();
        let speed_kbps = round2(stats.download_rate / 1024.0);

        let mut all_complete = true;
        for (id, index) in &self.entries {
            let Some(job) = jobs.iter_mut().find(|j| j.id == *id) else {
                continue;
            };
            if job.status == JobStatus::Completed {
                continue;
            }

            let (size, path) = files
                .get(*index)
                .map(|f| (f.size, f.path.as_str()))
                .unwrap_or((0, ""));
            let done = downloaded.get(*index).copied().unwrap_or(0);

            if size > 0 && done >= size {
                job.progress = 100.0;
                job.status = JobStatus::Completed;
                job.speed_kbps = 0.0;
                job.peers = 0;
                job.local_path = Some(self.save_path.join(path));
                job.error = None;
                continue;
            }

            all_complete = false;
            // Rounding must not report 100% before the last byte arrives
            let percent = if size == 0 {
                0.0
            } else {
                round2(done as f64 / size as f64 * 100.0).min(99.99)
            };
            job.progress = if job.status == JobStatus::Downloading {
                job.progress.max(percent)
            } else {
                percent
            };
            job.status = JobStatus::Downloading;
            job.speed_kbps = speed_kbps;
            job.peers = stats.peers;
        }

        Ok(all_complete)
    }

    /// Whether a monitor task is attached
    pub fn is_monitored(&self) -> bool {
        self.monitor.is_some()
    }

    /// Attach a monitor task's token
    pub(crate) fn set_monitor(&mut self, token: CancellationToken) {
        self.monitor = Some(token);
    }

    /// Detach the monitor token without cancelling it
    pub(crate) fn clear_monitor(&mut self) {
        self.monitor = None;
    }

    /// Cancel and detach the monitor task
    pub(crate) fn cancel_monitor(&mut self) {
        if let Some(token) = self.monitor.take() {
            token.cancel();
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveEngine, ContainerFile, MemoryEngine, TransferStats};
    use async_trait::async_trait;
    use crate::types::{JobMetadata, Protocol};
    use chrono::Utc;

    fn job(id: u64, name: &str) -> Job {
        Job {
            id: JobId(id),
            name: name.into(),
            source: Some("genesis.torrent".into()),
            http_url: None,
            destination: PathBuf::from("downloads/sega/genesis"),
            metadata: JobMetadata::new("Sega", "Genesis"),
            protocol: Protocol::Archive,
            status: JobStatus::Queued,
            progress: 0.0,
            speed_kbps: 0.0,
            peers: 0,
            size_bytes: None,
            checksum: None,
            added_at: Utc::now(),
            local_path: None,
            error: None,
        }
    }

    async fn binding(engine: &MemoryEngine) -> ArchiveBinding {
        engine.add_container(
            "genesis.torrent",
            &[
                ("Genesis/Altered Beast (USA).bin", 512 * 1024),
                ("Genesis/SONIC.BIN", 512 * 1024),
                ("Genesis/Sonic the Hedgehog 2 (World).bin", 1024 * 1024),
                ("Genesis/Streets of Rage (Europe).bin", 0),
            ],
        );
        let handle = engine
            .open(Path::new("genesis.torrent"), Path::new("/roms/genesis"))
            .await
            .unwrap();
        ArchiveBinding::new("genesis.torrent", "/roms/genesis", handle)
    }

    #[tokio::test]
    async fn exact_match_beats_earlier_substring_match() {
        let engine = MemoryEngine::new();
        let b = binding(&engine).await;
        // "sonic" is a substring of index 2 too, but index 1 matches exactly
        assert_eq!(b.match_file("Sonic.bin"), Some(1));
    }

    #[tokio::test]
    async fn substring_match_takes_first_in_container_order() {
        let engine = MemoryEngine::new();
        let b = binding(&engine).await;
        assert_eq!(b.match_file("Altered Beast.bin"), Some(0));
        assert_eq!(b.match_file("sonic the hedgehog 2.md"), Some(2));
        assert_eq!(b.match_file("Sonic.zip"), Some(1), "first file containing 'sonic'");
    }

    #[tokio::test]
    async fn substring_match_ignores_candidate_extension() {
        let engine = MemoryEngine::new();
        engine.add_container("beast.torrent", &[("Altered Beast.zip", 1024)]);
        let handle = engine
            .open(Path::new("beast.torrent"), Path::new("/roms"))
            .await
            .unwrap();
        let mut b = ArchiveBinding::new("beast.torrent", "/roms", handle);

        assert_eq!(b.match_file("Zip.md"), None);
        assert_eq!(b.match_file("beast.md"), Some(0));

        let mut zip = job(1, "Zip.md");
        assert!(!b.add_file_job(&mut zip).unwrap());
        assert_eq!(zip.status, JobStatus::NotFound);
    }

    #[tokio::test]
    async fn priorities_are_union_of_registered_jobs() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let container = engine.container("genesis.torrent").unwrap();

        let mut beast = job(1, "Altered Beast.bin");
        let mut sonic2 = job(2, "Sonic the Hedgehog 2 (World).bin");
        assert!(b.add_file_job(&mut beast).unwrap());
        assert!(b.add_file_job(&mut sonic2).unwrap());

        assert_eq!(container.priorities(), vec![1, 0, 1, 0]);
        assert_eq!(b.wanted_indices(), BTreeSet::from([0, 2]));

        assert!(b.remove_job(JobId(1)).unwrap());
        assert_eq!(container.priorities(), vec![0, 0, 1, 0]);
        assert!(!b.remove_job(JobId(1)).unwrap());
    }

    #[tokio::test]
    async fn unmatched_job_is_not_found_and_selection_unchanged() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let container = engine.container("genesis.torrent").unwrap();

        let mut sonic = job(1, "Sonic.bin");
        b.add_file_job(&mut sonic).unwrap();
        let before = container.priorities();

        let mut missing = job(2, "Missing.bin");
        assert!(!b.add_file_job(&mut missing).unwrap());
        assert_eq!(missing.status, JobStatus::NotFound);
        assert_eq!(b.job_count(), 1);
        assert_eq!(container.priorities(), before);
    }

    #[tokio::test]
    async fn rejected_selection_leaves_registrations_unchanged() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let container = engine.container("genesis.torrent").unwrap();

        let mut beast = job(1, "Altered Beast.bin");
        b.add_file_job(&mut beast).unwrap();

        container.fail_with("engine busy");
        let mut sonic = job(2, "Sonic.bin");
        let err = b.add_file_job(&mut sonic).unwrap_err();
        assert!(err.to_string().contains("engine busy"));
        assert_eq!(b.job_count(), 1);
        assert_eq!(b.file_index(JobId(2)), None);
        assert_eq!(b.wanted_indices(), BTreeSet::from([0]));

        // Moving an existing job is rolled back too
        let mut renamed = job(1, "Sonic the Hedgehog 2.bin");
        assert!(b.add_file_job(&mut renamed).is_err());
        assert_eq!(b.file_index(JobId(1)), Some(0));

        container.clear_failure();
        assert!(b.remove_job(JobId(1)).unwrap());
        assert_eq!(b.job_count(), 0);
        assert_eq!(container.priorities(), vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn re_registering_is_idempotent() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let mut sonic = job(7, "Sonic.bin");
        b.add_file_job(&mut sonic).unwrap();
        b.add_file_job(&mut sonic).unwrap();
        assert_eq!(b.job_count(), 1);
        assert_eq!(b.file_index(JobId(7)), Some(1));
    }

    #[tokio::test]
    async fn progress_is_clamped_rounded_and_completes_once() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let container = engine.container("genesis.torrent").unwrap();
        let mut jobs = vec![job(1, "Sonic.bin"), job(2, "Altered Beast.bin")];
        for j in jobs.iter_mut() {
            b.add_file_job(j).unwrap();
        }

        container.set_stats(2048.0 * 10.0, 5);
        container.set_downloaded(1, 1000);
        assert!(!b.update_progress(&mut jobs).await.unwrap());
        assert_eq!(jobs[0].status, JobStatus::Downloading);
        assert_eq!(jobs[0].progress, 0.19);
        assert_eq!(jobs[0].speed_kbps, 20.0);
        assert_eq!(jobs[0].peers, 5);

        container.set_downloaded(1, 512 * 1024 - 1);
        b.update_progress(&mut jobs).await.unwrap();
        assert!(jobs[0].progress < 100.0, "one byte short is not complete");

        container.set_downloaded(1, 10 * 1024 * 1024);
        container.set_downloaded(0, 512 * 1024);
        assert!(b.update_progress(&mut jobs).await.unwrap());
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert_eq!(jobs[0].progress, 100.0);
        assert_eq!(jobs[0].speed_kbps, 0.0);
        assert_eq!(
            jobs[0].local_path,
            Some(PathBuf::from("/roms/genesis/Genesis/SONIC.BIN"))
        );
    }

    #[tokio::test]
    async fn progress_never_decreases_while_downloading() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let container = engine.container("genesis.torrent").unwrap();
        let mut jobs = vec![job(1, "Sonic.bin")];
        b.add_file_job(&mut jobs[0]).unwrap();

        container.set_downloaded(1, 256 * 1024);
        b.update_progress(&mut jobs).await.unwrap();
        assert_eq!(jobs[0].progress, 50.0);

        container.set_downloaded(1, 1024);
        b.update_progress(&mut jobs).await.unwrap();
        assert_eq!(jobs[0].progress, 50.0);
    }

    #[tokio::test]
    async fn zero_size_file_reports_zero_percent() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let mut jobs = vec![job(1, "Streets of Rage.bin")];
        assert!(b.add_file_job(&mut jobs[0]).unwrap());

        assert!(!b.update_progress(&mut jobs).await.unwrap());
        assert_eq!(jobs[0].progress, 0.0);
        assert_eq!(jobs[0].status, JobStatus::Downloading);
    }

    #[tokio::test]
    async fn engine_failure_propagates() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let container = engine.container("genesis.torrent").unwrap();
        let mut jobs = vec![job(1, "Sonic.bin")];
        b.add_file_job(&mut jobs[0]).unwrap();

        container.fail_with("session closed");
        let err = b.update_progress(&mut jobs).await.unwrap_err();
        assert!(err.to_string().contains("session closed"));
    }

    struct Renumbered {
        files: Vec<ContainerFile>,
    }

    #[async_trait]
    impl ContainerHandle for Renumbered {
        fn files(&self) -> &[ContainerFile] {
            &self.files
        }

        fn set_priorities(&self, _priorities: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn file_progress(&self) -> Result<Vec<u64>> {
            Ok(vec![0; self.files.len()])
        }

        async fn stats(&self) -> Result<TransferStats> {
            Ok(TransferStats::default())
        }
    }

    #[tokio::test]
    async fn file_index_beyond_list_does_not_panic() {
        let handle = Renumbered {
            files: vec![ContainerFile {
                index: 5,
                path: "Genesis/Columns.bin".into(),
                size: 128,
            }],
        };
        let mut b = ArchiveBinding::new("columns.torrent", "/roms", Box::new(handle));

        let mut columns = job(1, "Columns.bin");
        assert!(b.add_file_job(&mut columns).unwrap());
        assert_eq!(b.file_index(JobId(1)), Some(5));

        let mut jobs = vec![columns];
        assert!(!b.update_progress(&mut jobs).await.unwrap());
        assert_eq!(jobs[0].progress, 0.0);
    }

    #[tokio::test]
    async fn monitor_token_lifecycle() {
        let engine = MemoryEngine::new();
        let mut b = binding(&engine).await;
        let token = CancellationToken::new();

        b.set_monitor(token.clone());
        assert!(b.is_monitored());
        b.cancel_monitor();
        assert!(token.is_cancelled());
        assert!(!b.is_monitored());
    }
}
