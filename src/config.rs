//! Configuration types for romfetch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk layout of the ROM library
///
/// Groups the directories the manager reads containers from and writes
/// artifacts and the job list to. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root for downloaded artifacts (default: "downloads")
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// Persisted job list (default: "downloads/jobs.json")
    #[serde(default = "default_jobs_file")]
    pub jobs_file: PathBuf,

    /// Provider cache root; containers live under
    /// `<cache_dir>/<manufacturer>/<console>/torrents` (default: "data/cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Flat container directory from older releases (default: "data/torrents")
    #[serde(default = "default_legacy_container_dir")]
    pub legacy_container_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            jobs_file: default_jobs_file(),
            cache_dir: default_cache_dir(),
            legacy_container_dir: default_legacy_container_dir(),
        }
    }
}

/// Archive (torrent container) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Interval between progress polls of an open container (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

/// Direct HTTP download settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bytes between progress updates (default: 64 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum HTTP transfers running at once (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Connection timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrent: default_max_concurrent(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for [`DownloadManager`](crate::DownloadManager)
///
/// Every field has a default, so `Config::default()` works out of the box
/// and a config file only needs the settings it changes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory layout
    #[serde(default)]
    pub library: LibraryConfig,

    /// Torrent container settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Direct HTTP settings
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Config rooted at one directory, used by embedders that keep all state together
    ///
    /// Downloads go to `<root>/downloads`, the job list to
    /// `<root>/downloads/jobs.json`, and containers are looked up under
    /// `<root>/data`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let downloads_dir = root.join("downloads");
        Self {
            library: LibraryConfig {
                jobs_file: downloads_dir.join("jobs.json"),
                downloads_dir,
                cache_dir: root.join("data").join("cache"),
                legacy_container_dir: root.join("data").join("torrents"),
            },
            ..Default::default()
        }
    }

    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse config '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.http.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk size must be greater than zero".into(),
                key: Some("http.chunk_size".into()),
            });
        }
        if self.http.max_concurrent == 0 {
            return Err(Error::Config {
                message: "at least one concurrent HTTP transfer is required".into(),
                key: Some("http.max_concurrent".into()),
            });
        }
        if self.archive.poll_interval.is_zero() {
            return Err(Error::Config {
                message: "poll interval must be greater than zero".into(),
                key: Some("archive.poll_interval".into()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_jobs_file() -> PathBuf {
    PathBuf::from("downloads").join("jobs.json")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data").join("cache")
}

fn default_legacy_container_dir() -> PathBuf {
    PathBuf::from("data").join("torrents")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_max_concurrent() -> usize {
    4
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("romfetch/{}", env!("CARGO_PKG_VERSION"))
}

// Duration serialization helper (whole seconds, fractional allowed on input)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration must be a non-negative number of seconds")
        })
    }
}
