//! # romfetch
//!
//! Download-job orchestration for ROM libraries.
//!
//! A [`DownloadManager`] accepts requests for named artifacts and fetches
//! each one either out of a multi-file torrent container or over direct
//! HTTP. It deduplicates requests by name, shares one open container
//! between every job that needs a file from it, persists the job list after
//! every change and resumes interrupted jobs on startup.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI; catalogs and screens submit jobs and
//!   poll [`DownloadManager::list_jobs`]
//! - **Failures are job states** - Transfer errors never reach the caller that
//!   added the job; they show up as `error` / `not_found` in the job list
//! - **Pluggable engine** - The torrent wire protocol sits behind
//!   [`archive::ArchiveEngine`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use romfetch::{Config, DownloadManager, JobMetadata, NewJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = DownloadManager::new(Config::rooted_at("/srv/roms")).await?;
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     manager
//!         .add_job(
//!             NewJob::new("Sonic.bin")
//!                 .from_container("sega_genesis.torrent")
//!                 .metadata(JobMetadata::new("Sega", "Genesis")),
//!         )
//!         .await?;
//!     manager
//!         .add_job(NewJob::new("homebrew.nes").from_url("https://example.com/roms/homebrew.nes"))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Torrent container support and the archive engine seam
pub mod archive;
/// Checksum verification for HTTP downloads
pub mod checksum;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Direct HTTP downloads
pub mod http;
/// Download manager (decomposed into focused submodules)
pub mod manager;
/// Library directory convention
pub mod paths;
/// Job list persistence
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::{ArchiveEngine, DiskWatchEngine, MemoryEngine};
pub use config::Config;
pub use error::{Error, Result};
pub use manager::{DownloadManager, ResumeReport};
pub use store::JobStore;
pub use types::{Event, Job, JobId, JobMetadata, JobStatus, NewJob, Protocol};

/// Run the manager until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use romfetch::{Config, DownloadManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = DownloadManager::new(Config::default()).await?;
///     run_with_shutdown(manager).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: DownloadManager) {
    wait_for_signal().await;
    manager.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
