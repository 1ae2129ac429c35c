//! Direct HTTP downloads
//!
//! A [`Transfer`] streams one URL into one file. The caller drives it with
//! [`Transfer::advance`], which returns a progress sample roughly every
//! `chunk_size` bytes, and completes it with [`Transfer::finish`]. Pull-based
//! driving keeps cancellation in the caller's hands: dropping a transfer
//! stops it. Partial files are left on disk.

use crate::checksum::ChecksumVerifier;
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::utils::{normalize_url, round2};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// Lower bound for elapsed time in speed calculations
const MIN_ELAPSED_SECS: f64 = 0.001;

/// Progress sample of a running transfer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchProgress {
    /// Bytes written so far
    pub downloaded: u64,
    /// Content length reported by the server
    pub total: Option<u64>,
    /// Progress percentage (0 when the server sent no length)
    pub percent: f64,
    /// Average speed since the start in KiB/s
    pub speed_kbps: f64,
}

/// Result of a finished transfer
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// File the content was written to
    pub path: PathBuf,
    /// Bytes written
    pub bytes: u64,
    /// Verified digest, when a usable checksum hint was supplied
    pub digest: Option<String>,
}

/// Shared HTTP client for direct downloads
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    chunk_size: usize,
}

impl HttpFetcher {
    /// Build a fetcher from HTTP settings
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Send the request and open the destination file
    ///
    /// The destination directory is created if needed. Non-success HTTP
    /// statuses are errors. `checksum` is ignored when its format is not
    /// recognized.
    pub async fn start(
        &self,
        url: &str,
        destination: &Path,
        file_name: &str,
        checksum: Option<&str>,
    ) -> Result<Transfer> {
        let url = normalize_url(url)?;
        tokio::fs::create_dir_all(destination).await?;

        tracing::debug!(url = %url, destination = %destination.display(), "Starting HTTP download");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let total = response.content_length();

        let path = destination.join(file_name);
        let file = tokio::fs::File::create(&path).await?;

        let verifier = checksum.and_then(|hint| {
            let verifier = ChecksumVerifier::from_hint(hint);
            if verifier.is_none() {
                tracing::debug!(name = file_name, hint, "Ignoring unrecognized checksum hint");
            }
            verifier
        });

        Ok(Transfer {
            name: file_name.to_string(),
            response,
            file,
            path,
            total,
            downloaded: 0,
            unreported: 0,
            chunk_size: self.chunk_size,
            started: Instant::now(),
            verifier,
            exhausted: false,
        })
    }
}

/// One HTTP download in flight
pub struct Transfer {
    name: String,
    response: reqwest::Response,
    file: tokio::fs::File,
    path: PathBuf,
    total: Option<u64>,
    downloaded: u64,
    unreported: usize,
    chunk_size: usize,
    started: Instant,
    verifier: Option<ChecksumVerifier>,
    exhausted: bool,
}

impl Transfer {
    /// File being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read until another progress sample is due
    ///
    /// Returns `None` once the body is exhausted and every byte has been
    /// reported.
    pub async fn advance(&mut self) -> Result<Option<FetchProgress>> {
        while !self.exhausted {
            match self.response.chunk().await? {
                Some(chunk) => {
                    self.file.write_all(&chunk).await?;
                    if let Some(verifier) = self.verifier.as_mut() {
                        verifier.update(&chunk);
                    }
                    self.downloaded += chunk.len() as u64;
                    self.unreported += chunk.len();
                    if self.unreported >= self.chunk_size {
                        self.unreported = 0;
                        return Ok(Some(self.progress()));
                    }
                }
                None => self.exhausted = true,
            }
        }

        if self.unreported > 0 {
            self.unreported = 0;
            return Ok(Some(self.progress()));
        }
        Ok(None)
    }

    /// Current progress sample
    pub fn progress(&self) -> FetchProgress {
        let percent = match self.total {
            Some(total) if total > 0 => {
                round2((self.downloaded as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => 0.0,
        };
        let elapsed = self.started.elapsed().as_secs_f64().max(MIN_ELAPSED_SECS);
        FetchProgress {
            downloaded: self.downloaded,
            total: self.total,
            percent,
            speed_kbps: round2(self.downloaded as f64 / elapsed / 1024.0),
        }
    }

    /// Drain any remaining body, flush the file and verify the checksum
    pub async fn finish(mut self) -> Result<FetchOutcome> {
        while self.advance().await?.is_some() {}
        self.file.flush().await?;
        self.file.sync_all().await?;

        let digest = match self.verifier.take() {
            Some(verifier) => {
                let expected = verifier.expected().to_string();
                match verifier.finish() {
                    Ok(digest) => Some(digest),
                    Err(actual) => {
                        return Err(Error::ChecksumMismatch {
                            name: self.name,
                            expected,
                            actual,
                        });
                    }
                }
            }
            None => None,
        };

        tracing::debug!(path = %self.path.display(), bytes = self.downloaded, "HTTP download finished");
        Ok(FetchOutcome {
            path: self.path,
            bytes: self.downloaded,
            digest,
        })
    }
}
