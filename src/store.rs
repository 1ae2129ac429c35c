//! Job list persistence
//!
//! The whole list is rewritten on every save. Writes go to a sibling temp
//! file that is renamed over the target, so a crash mid-write leaves the
//! previous list intact. A file that still fails to parse is treated as an
//! empty list.

use crate::error::Result;
use crate::types::Job;
use std::path::{Path, PathBuf};

/// JSON file holding the full job list
#[derive(Clone, Debug)]
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    /// Store backed by the given file (created on first save)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the job list file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "jobs.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the job list
    ///
    /// A missing file is an empty list. An unreadable or unparsable file is
    /// also an empty list; the problem is logged and the next save replaces
    /// the file.
    pub async fn load(&self) -> Vec<Job> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read job list, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<Job>>(&raw) {
            Ok(jobs) => {
                tracing::debug!(path = %self.path.display(), count = jobs.len(), "Loaded job list");
                jobs
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Invalid job list, resetting");
                Vec::new()
            }
        }
    }

    /// Replace the persisted job list with `jobs`
    pub async fn save(&self, jobs: &[Job]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(jobs)?;
        let tmp = self.temp_path();
        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
