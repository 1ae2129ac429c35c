//! Shared test helpers for creating DownloadManager instances in tests.

use crate::archive::MemoryEngine;
use crate::archive::metainfo::build_metainfo;
use crate::config::Config;
use crate::manager::DownloadManager;
use crate::paths::LibraryLayout;
use crate::types::{Job, JobId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Config keeping all state under `root`, with a fast poll interval
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::rooted_at(root);
    config.archive.poll_interval = Duration::from_millis(10);
    config.http.chunk_size = 1024;
    config
}

/// Helper to create a test manager backed by an in-memory engine.
/// Returns the manager, the engine and the tempdir (which must be kept alive).
pub(crate) async fn create_test_manager() -> (DownloadManager, MemoryEngine, TempDir) {
    let temp_dir = tempdir().unwrap();
    let engine = MemoryEngine::new();
    let manager = DownloadManager::with_engine(test_config(temp_dir.path()), Arc::new(engine.clone()))
        .await
        .unwrap();
    (manager, engine, temp_dir)
}

/// Manager over an existing root (e.g. to simulate a restart)
pub(crate) async fn manager_at(root: &Path, engine: &MemoryEngine) -> DownloadManager {
    DownloadManager::with_engine(test_config(root), Arc::new(engine.clone()))
        .await
        .unwrap()
}

/// Write a `.torrent` into the structured container directory of a console
pub(crate) fn write_container(
    config: &Config,
    manufacturer: &str,
    console: &str,
    file_name: &str,
    files: &[(&str, u64)],
) -> PathBuf {
    let dir = LibraryLayout::new(&config.library).container_dir(manufacturer, console);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    let torrent_name = file_name.trim_end_matches(".torrent");
    std::fs::write(&path, build_metainfo(torrent_name, files)).unwrap();
    path
}

/// Write `sonic.torrent` for Sega/Genesis with three ROMs
pub(crate) fn write_genesis_container(config: &Config) -> PathBuf {
    write_container(
        config,
        "Sega",
        "Genesis",
        "sonic.torrent",
        &[
            ("SONIC.BIN", 512 * 1024),
            ("Sonic the Hedgehog 2 (World).bin", 1024 * 1024),
            ("Streets of Rage (Europe).bin", 512 * 1024),
        ],
    )
}

/// Poll the job list until `predicate` holds for job `id`
pub(crate) async fn wait_for_job(
    manager: &DownloadManager,
    id: JobId,
    predicate: impl Fn(&Job) -> bool,
) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(job) = manager.get_job(id).await
            && predicate(&job)
        {
            return job;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for job {id}, last state: {:?}",
                manager.get_job(id).await
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
