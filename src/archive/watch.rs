//! Archive engine that watches a torrent client's output directory
//!
//! The byte transfer is left to an external torrent client writing into the
//! save path. Progress is the on-disk length of each selected file, capped at
//! the size the metainfo declares, and the rate is derived from the growth of
//! the selected files between polls.
//!
//! On Unix the count is also bounded by the bytes the filesystem has actually
//! allocated, so a sparse file sized up front reads as partial progress. A
//! client that preallocates with real blocks (`fallocate`, zero filling) is
//! still indistinguishable from a finished file; configure it without
//! preallocation. Filesystems that compress data on disk report fewer
//! allocated bytes than were written and are not supported.

use super::{ArchiveEngine, ContainerFile, ContainerHandle, Metainfo, PRIORITY_SKIP, TransferStats};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

/// Engine backed by the filesystem
#[derive(Clone, Debug, Default)]
pub struct DiskWatchEngine;

impl DiskWatchEngine {
    /// Create the engine
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveEngine for DiskWatchEngine {
    async fn open(&self, container: &Path, save_path: &Path) -> Result<Box<dyn ContainerHandle>> {
        let meta = Metainfo::from_file(container).await?;
        tracing::debug!(
            container = %container.display(),
            files = meta.files.len(),
            total_bytes = meta.total_size(),
            "Opened container"
        );
        Ok(Box::new(DiskWatchHandle::new(meta.files, save_path)))
    }

    fn name(&self) -> &str {
        "disk-watch"
    }
}

/// Container handle reading progress from the save path
#[derive(Debug)]
pub struct DiskWatchHandle {
    files: Vec<ContainerFile>,
    save_path: PathBuf,
    priorities: Mutex<Vec<u8>>,
    last_sample: Mutex<Option<(Instant, u64)>>,
}

impl DiskWatchHandle {
    /// Handle over `files` laid out below `save_path`
    pub fn new(files: Vec<ContainerFile>, save_path: impl Into<PathBuf>) -> Self {
        let count = files.len();
        Self {
            files,
            save_path: save_path.into(),
            priorities: Mutex::new(vec![PRIORITY_SKIP; count]),
            last_sample: Mutex::new(None),
        }
    }

    /// Files currently selected for fetching
    pub fn wanted_files(&self) -> Vec<ContainerFile> {
        let priorities = self.priorities_snapshot();
        self.files
            .iter()
            .filter(|f| priorities.get(f.index).is_some_and(|p| *p != PRIORITY_SKIP))
            .cloned()
            .collect()
    }

    fn priorities_snapshot(&self) -> Vec<u8> {
        self.priorities
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    async fn on_disk(&self, file: &ContainerFile) -> u64 {
        match tokio::fs::metadata(self.save_path.join(&file.path)).await {
            Ok(meta) => meta.len().min(allocated_bytes(&meta)).min(file.size),
            Err(_) => 0,
        }
    }
}

/// Bytes backed by storage, which is less than the length for sparse files
#[cfg(unix)]
fn allocated_bytes(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.blocks().saturating_mul(512)
}

#[cfg(not(unix))]
fn allocated_bytes(meta: &std::fs::Metadata) -> u64 {
    meta.len()
}

#[async_trait]
impl ContainerHandle for DiskWatchHandle {
    fn files(&self) -> &[ContainerFile] {
        &self.files
    }

    fn set_priorities(&self, priorities: &[u8]) -> Result<()> {
        if priorities.len() != self.files.len() {
            return Err(Error::Engine(format!(
                "expected {} priorities, got {}",
                self.files.len(),
                priorities.len()
            )));
        }
        let mut current = self
            .priorities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = priorities.to_vec();
        tracing::debug!(
            save_path = %self.save_path.display(),
            wanted = priorities.iter().filter(|p| **p != PRIORITY_SKIP).count(),
            "Updated file selection"
        );
        Ok(())
    }

    async fn file_progress(&self) -> Result<Vec<u64>> {
        let mut progress = vec![0; self.files.len()];
        for file in self.wanted_files() {
            if let Some(slot) = progress.get_mut(file.index) {
                *slot = self.on_disk(&file).await;
            }
        }
        Ok(progress)
    }

    async fn stats(&self) -> Result<TransferStats> {
        let mut total = 0;
        for file in self.wanted_files() {
            total += self.on_disk(&file).await;
        }
        let now = Instant::now();

        let mut last = self
            .last_sample
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let download_rate = match *last {
            Some((at, bytes)) => {
                let elapsed = now.duration_since(at).as_secs_f64().max(0.001);
                total.saturating_sub(bytes) as f64 / elapsed
            }
            None => 0.0,
        };
        *last = Some((now, total));

        Ok(TransferStats {
            download_rate,
            peers: 0,
        })
    }
}
