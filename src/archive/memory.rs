//! In-memory archive engine
//!
//! Containers are either registered up front or parsed from the `.torrent`
//! on first open. Transfer state is set by the embedder, which makes the
//! engine useful for simulations and for exercising the manager.

use super::{ArchiveEngine, ContainerFile, ContainerHandle, Metainfo, PRIORITY_SKIP, TransferStats};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable state of one container
#[derive(Debug)]
pub struct MemoryContainer {
    files: Vec<ContainerFile>,
    state: Mutex<ContainerState>,
}

#[derive(Debug)]
struct ContainerState {
    downloaded: Vec<u64>,
    priorities: Vec<u8>,
    stats: TransferStats,
    failure: Option<String>,
}

impl MemoryContainer {
    fn new(files: Vec<ContainerFile>) -> Self {
        let count = files.len();
        Self {
            files,
            state: Mutex::new(ContainerState {
                downloaded: vec![0; count],
                priorities: vec![PRIORITY_SKIP; count],
                stats: TransferStats::default(),
                failure: None,
            }),
        }
    }

    /// Files in container order
    pub fn files(&self) -> &[ContainerFile] {
        &self.files
    }

    /// Current priority of every file
    pub fn priorities(&self) -> Vec<u8> {
        lock(&self.state).priorities.clone()
    }

    /// Set the downloaded byte count of one file (ignored for unknown indices)
    pub fn set_downloaded(&self, index: usize, bytes: u64) {
        if let Some(slot) = lock(&self.state).downloaded.get_mut(index) {
            *slot = bytes;
        }
    }

    /// Mark one file fully downloaded
    pub fn complete(&self, index: usize) {
        if let Some(file) = self.files.get(index) {
            self.set_downloaded(index, file.size);
        }
    }

    /// Set the container-wide rate (bytes/s) and peer count
    pub fn set_stats(&self, download_rate: f64, peers: u32) {
        lock(&self.state).stats = TransferStats {
            download_rate,
            peers,
        };
    }

    /// Make every subsequent progress query fail
    pub fn fail_with(&self, message: impl Into<String>) {
        lock(&self.state).failure = Some(message.into());
    }

    /// Undo [`fail_with`](Self::fail_with)
    pub fn clear_failure(&self) {
        lock(&self.state).failure = None;
    }

    fn check(&self) -> Result<()> {
        match &lock(&self.state).failure {
            Some(message) => Err(Error::Engine(message.clone())),
            None => Ok(()),
        }
    }
}

struct MemoryHandle {
    container: Arc<MemoryContainer>,
}

#[async_trait]
impl ContainerHandle for MemoryHandle {
    fn files(&self) -> &[ContainerFile] {
        &self.container.files
    }

    fn set_priorities(&self, priorities: &[u8]) -> Result<()> {
        self.container.check()?;
        if priorities.len() != self.container.files.len() {
            return Err(Error::Engine(format!(
                "expected {} priorities, got {}",
                self.container.files.len(),
                priorities.len()
            )));
        }
        lock(&self.container.state).priorities = priorities.to_vec();
        Ok(())
    }

    async fn file_progress(&self) -> Result<Vec<u64>> {
        self.container.check()?;
        Ok(lock(&self.container.state).downloaded.clone())
    }

    async fn stats(&self) -> Result<TransferStats> {
        self.container.check()?;
        Ok(lock(&self.container.state).stats)
    }
}

#[derive(Default)]
struct EngineState {
    containers: HashMap<String, Arc<MemoryContainer>>,
    opens: HashMap<String, usize>,
}

/// Archive engine whose containers live in memory
///
/// Containers are keyed by file name, so the same container is found
/// whichever directory it was resolved in. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<Mutex<EngineState>>,
}

impl MemoryEngine {
    /// Engine with no containers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container from `(path, size)` pairs
    pub fn add_container(&self, name: &str, files: &[(&str, u64)]) -> Arc<MemoryContainer> {
        let files = files
            .iter()
            .enumerate()
            .map(|(index, (path, size))| ContainerFile {
                index,
                path: path.to_string(),
                size: *size,
            })
            .collect();
        let container = Arc::new(MemoryContainer::new(files));
        lock(&self.inner)
            .containers
            .insert(name.to_string(), Arc::clone(&container));
        container
    }

    /// Look up a registered (or already opened) container
    pub fn container(&self, name: &str) -> Option<Arc<MemoryContainer>> {
        lock(&self.inner).containers.get(name).cloned()
    }

    /// How many times a container has been opened
    pub fn open_count(&self, name: &str) -> usize {
        lock(&self.inner).opens.get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ArchiveEngine for MemoryEngine {
    async fn open(&self, container: &Path, _save_path: &Path) -> Result<Box<dyn ContainerHandle>> {
        let name = container
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Engine(format!("not a file: {}", container.display())))?;

        let shared = match self.container(&name) {
            Some(shared) => shared,
            None => {
                let meta = Metainfo::from_file(container).await?;
                let parsed = Arc::new(MemoryContainer::new(meta.files));
                lock(&self.inner)
                    .containers
                    .entry(name.clone())
                    .or_insert(parsed)
                    .clone()
            }
        };

        // Fresh handles start with nothing selected, like a newly added torrent
        lock(&shared.state).priorities = vec![PRIORITY_SKIP; shared.files.len()];
        *lock(&self.inner).opens.entry(name).or_insert(0) += 1;

        Ok(Box::new(MemoryHandle { container: shared }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
