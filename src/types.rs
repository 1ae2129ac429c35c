//! Core types for romfetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Label used by collaborators when a console or manufacturer is unknown
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Unique identifier for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Job status
///
/// Status only moves forward: `Queued -> Downloading -> {Completed | Error | NotFound}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, transfer not started yet
    Queued,
    /// Transfer in progress
    Downloading,
    /// File is present at its destination
    Completed,
    /// Transfer failed
    Error,
    /// No file inside the container matched the requested name
    NotFound,
}

impl JobStatus {
    /// Whether a transfer is (or should be) running for this job
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Downloading)
    }

    /// Whether the job has reached an end state
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Lowercase label used in logs and displays
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport used to obtain a job's file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// One file out of a multi-file torrent container
    Archive,
    /// Direct HTTP download
    Http,
    /// Already present on disk, nothing to transfer
    Local,
}

/// Console and manufacturer labels, used for filing and display only
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Console label (e.g. "Genesis")
    #[serde(default)]
    pub console: Option<String>,
    /// Manufacturer label (e.g. "Sega")
    #[serde(default)]
    pub manufacturer: Option<String>,
}

impl JobMetadata {
    /// Create metadata from manufacturer and console labels
    pub fn new(manufacturer: impl Into<String>, console: impl Into<String>) -> Self {
        Self {
            console: Some(console.into()),
            manufacturer: Some(manufacturer.into()),
        }
    }

    /// Console label if it carries information
    pub fn known_console(&self) -> Option<&str> {
        known_label(self.console.as_deref())
    }

    /// Manufacturer label if it carries information
    pub fn known_manufacturer(&self) -> Option<&str> {
        known_label(self.manufacturer.as_deref())
    }

    /// Fill labels this record lacks from `other`
    ///
    /// Returns true if anything changed.
    pub fn merge_missing(&mut self, other: &JobMetadata) -> bool {
        let mut changed = false;
        if self.known_console().is_none()
            && let Some(console) = other.known_console()
        {
            self.console = Some(console.to_string());
            changed = true;
        }
        if self.known_manufacturer().is_none()
            && let Some(manufacturer) = other.known_manufacturer()
        {
            self.manufacturer = Some(manufacturer.to_string());
            changed = true;
        }
        changed
    }
}

fn known_label(label: Option<&str>) -> Option<&str> {
    label
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != UNKNOWN_LABEL)
}

/// One requested artifact and its transfer state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Target artifact filename, also the dedup key
    pub name: String,

    /// Container locator (path or URL of the .torrent)
    #[serde(default)]
    pub source: Option<String>,

    /// Direct download URL
    #[serde(default)]
    pub http_url: Option<String>,

    /// Directory the finished file lands in
    pub destination: PathBuf,

    /// Console/manufacturer labels
    #[serde(default)]
    pub metadata: JobMetadata,

    /// Transport used for this job
    pub protocol: Protocol,

    /// Current status
    pub status: JobStatus,

    /// Progress percentage (0.0 to 100.0)
    #[serde(default)]
    pub progress: f64,

    /// Current speed in KiB/s
    #[serde(default)]
    pub speed_kbps: f64,

    /// Connected peers (archive jobs only)
    #[serde(default)]
    pub peers: u32,

    /// Expected size in bytes, as supplied by the caller
    #[serde(default)]
    pub size_bytes: Option<u64>,

    /// Expected checksum (hex MD5 or SHA-256), as supplied by the caller
    #[serde(default)]
    pub checksum: Option<String>,

    /// When the job was created
    pub added_at: DateTime<Utc>,

    /// Where the file is on disk once confirmed present
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Failure description when status is `error`
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    /// Filename the artifact is written under (last component of `name`)
    pub fn file_name(&self) -> &str {
        crate::utils::base_name(&self.name)
    }

    /// Where the artifact is expected on disk
    ///
    /// This is the recorded `local_path` if set, otherwise the destination
    /// directory joined with the file name.
    pub fn expected_path(&self) -> PathBuf {
        self.local_path
            .clone()
            .unwrap_or_else(|| self.destination.join(self.file_name()))
    }

    /// Mark the job failed with a message
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Error;
        self.error = Some(message.into());
        self.speed_kbps = 0.0;
        self.peers = 0;
    }
}

/// Request to add a job
///
/// At least one of `source` and `http_url` must be set unless the file is
/// already present at the destination.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewJob {
    /// Target artifact filename
    pub name: String,

    /// Container locator (path or URL of the .torrent)
    #[serde(default)]
    pub source: Option<String>,

    /// Direct download URL
    #[serde(default)]
    pub http_url: Option<String>,

    /// Destination directory (None = `<downloads>/<manufacturer>/<console>`)
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Console/manufacturer labels
    #[serde(default)]
    pub metadata: JobMetadata,

    /// Size hint in bytes
    #[serde(default)]
    pub size_bytes: Option<u64>,

    /// Checksum hint (hex MD5 or SHA-256)
    #[serde(default)]
    pub checksum: Option<String>,
}

impl NewJob {
    /// Create a request for the given artifact name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Fetch from a torrent container
    pub fn from_container(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Fetch over HTTP
    pub fn from_url(mut self, url: impl Into<String>) -> Self {
        self.http_url = Some(url.into());
        self
    }

    /// Override the destination directory
    pub fn destination(mut self, dir: impl Into<PathBuf>) -> Self {
        self.destination = Some(dir.into());
        self
    }

    /// Attach console/manufacturer labels
    pub fn metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach a size hint
    pub fn size_bytes(mut self, size: u64) -> Self {
        self.size_bytes = Some(size);
        self
    }

    /// Attach a checksum hint
    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job recorded in the job list
    JobAdded {
        /// Job ID
        id: JobId,
        /// Artifact name
        name: String,
        /// Transport chosen for the job
        protocol: Protocol,
    },

    /// Progress update
    Progress {
        /// Job ID
        id: JobId,
        /// Progress percentage (0.0 to 100.0)
        percent: f64,
        /// Current speed in KiB/s
        speed_kbps: f64,
        /// Connected peers
        peers: u32,
    },

    /// File is present at its destination
    Completed {
        /// Job ID
        id: JobId,
        /// Where the file is
        path: PathBuf,
    },

    /// Transfer failed
    Failed {
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// No file inside the container matched the requested name
    NotFound {
        /// Job ID
        id: JobId,
        /// Artifact name
        name: String,
    },

    /// Job removed from the job list
    Removed {
        /// Job ID
        id: JobId,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_activity_partitions_all_variants() {
        let active = [JobStatus::Queued, JobStatus::Downloading];
        let terminal = [JobStatus::Completed, JobStatus::Error, JobStatus::NotFound];
        for s in active {
            assert!(s.is_active(), "{s} should be active");
        }
        for s in terminal {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        let back: JobStatus = serde_json::from_str("\"downloading\"").unwrap();
        assert_eq!(back, JobStatus::Downloading);
    }

    #[test]
    fn unknown_labels_are_not_known() {
        let meta = JobMetadata {
            console: Some("Unknown".into()),
            manufacturer: Some("  ".into()),
        };
        assert_eq!(meta.known_console(), None);
        assert_eq!(meta.known_manufacturer(), None);
    }

    #[test]
    fn merge_missing_only_fills_gaps() {
        let mut existing = JobMetadata {
            console: Some("Genesis".into()),
            manufacturer: Some("Unknown".into()),
        };
        let incoming = JobMetadata::new("Sega", "Mega Drive");

        assert!(existing.merge_missing(&incoming));
        assert_eq!(existing.console.as_deref(), Some("Genesis"));
        assert_eq!(existing.manufacturer.as_deref(), Some("Sega"));

        assert!(
            !existing.merge_missing(&incoming),
            "second merge has nothing left to fill"
        );
    }

    #[test]
    fn expected_path_prefers_recorded_local_path() {
        let mut job = Job {
            id: JobId(1),
            name: "roms/Sonic.bin".into(),
            source: None,
            http_url: None,
            destination: PathBuf::from("downloads/sega/genesis"),
            metadata: JobMetadata::default(),
            protocol: Protocol::Http,
            status: JobStatus::Queued,
            progress: 0.0,
            speed_kbps: 0.0,
            peers: 0,
            size_bytes: None,
            checksum: None,
            added_at: Utc::now(),
            local_path: None,
            error: None,
        };
        assert_eq!(
            job.expected_path(),
            PathBuf::from("downloads/sega/genesis/Sonic.bin")
        );

        job.local_path = Some(PathBuf::from("/elsewhere/Sonic.bin"));
        assert_eq!(job.expected_path(), PathBuf::from("/elsewhere/Sonic.bin"));
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Removed { id: JobId(3) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "removed");
        assert_eq!(json["id"], 3);
    }
}
