//! Test configuration helpers for creating managers over a temp directory

use romfetch::{Config, DownloadManager, MemoryEngine};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Config rooted at `root` with fast polling and small progress chunks
pub fn fast_config(root: &Path) -> Config {
    let mut config = Config::rooted_at(root);
    config.archive.poll_interval = Duration::from_millis(10);
    config.http.chunk_size = 1024;
    config
}

/// Manager over `root`, sharing `engine` so containers survive a restart
pub async fn manager_with(root: &Path, engine: &MemoryEngine) -> DownloadManager {
    DownloadManager::with_engine(fast_config(root), Arc::new(engine.clone()))
        .await
        .expect("failed to create manager")
}

/// Fresh manager, engine and temp directory (keep the directory alive)
pub async fn create_manager() -> (DownloadManager, MemoryEngine, TempDir) {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let engine = MemoryEngine::new();
    let manager = manager_with(temp_dir.path(), &engine).await;
    (manager, engine, temp_dir)
}
