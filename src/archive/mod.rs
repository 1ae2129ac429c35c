//! Multi-file container (torrent) support
//!
//! The byte transfer itself belongs to an external engine. This module only
//! decides which files of a container to fetch and aggregates their progress:
//!
//! - [`ArchiveEngine`] / [`ContainerHandle`] - the seam to the engine
//! - [`ArchiveBinding`] - one open container shared by every job matched into it
//! - [`DiskWatchEngine`] - observes files a torrent client writes to the save path
//! - [`MemoryEngine`] - scriptable in-memory engine
//! - [`metainfo`] / [`bencode`] - `.torrent` parsing

pub mod bencode;
mod binding;
mod memory;
pub mod metainfo;
mod watch;

pub use binding::ArchiveBinding;
pub use memory::{MemoryContainer, MemoryEngine};
pub use metainfo::Metainfo;
pub use watch::{DiskWatchEngine, DiskWatchHandle};

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Priority for files the engine should not fetch
pub const PRIORITY_SKIP: u8 = 0;

/// Priority for files referenced by at least one job
pub const PRIORITY_FETCH: u8 = 1;

/// One file entry inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    /// Position in the container's file list
    pub index: usize,
    /// Relative path below the save path, `/`-separated
    pub path: String,
    /// Total size in bytes
    pub size: u64,
}

impl ContainerFile {
    /// Last component of the path
    pub fn file_name(&self) -> &str {
        crate::utils::base_name(&self.path)
    }
}

/// Container-wide transfer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferStats {
    /// Aggregate download rate in bytes per second
    pub download_rate: f64,
    /// Connected peers
    pub peers: u32,
}

/// Engine capable of opening containers
///
/// # Examples
///
/// ```no_run
/// use romfetch::archive::{ArchiveEngine, DiskWatchEngine};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = DiskWatchEngine::new();
/// let handle = engine
///     .open(Path::new("data/torrents/genesis.torrent"), Path::new("downloads/sega/genesis"))
///     .await?;
/// for file in handle.files() {
///     println!("{} {} bytes", file.path, file.size);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ArchiveEngine: Send + Sync {
    /// Open a container, placing its files below `save_path`
    ///
    /// The returned handle starts with every file at [`PRIORITY_SKIP`].
    async fn open(&self, container: &Path, save_path: &Path) -> Result<Box<dyn ContainerHandle>>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// Open container owned by exactly one [`ArchiveBinding`]
///
/// Progress queries may touch the filesystem or a remote session, so they
/// are async; selection changes are expected to be cheap.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    /// Files in container order
    fn files(&self) -> &[ContainerFile];

    /// Replace the fetch priority of every file (one entry per file)
    fn set_priorities(&self, priorities: &[u8]) -> Result<()>;

    /// Downloaded bytes per file, indexed like [`files`](Self::files)
    ///
    /// Files at [`PRIORITY_SKIP`] may report 0.
    async fn file_progress(&self) -> Result<Vec<u64>>;

    /// Container-wide statistics
    async fn stats(&self) -> Result<TransferStats>;
}
