//! Library directory convention
//!
//! Containers fetched by provider tooling live under
//! `<cache>/<manufacturer_slug>/<console_slug>/torrents/`, with a flat legacy
//! directory from older releases as fallback. Artifacts default to
//! `<downloads>/<manufacturer_slug>/<console_slug>/`.

use crate::config::LibraryConfig;
use crate::types::JobMetadata;
use crate::utils::{container_file_name, slugify};
use std::path::{Path, PathBuf};

/// Subdirectory of a console's cache directory that holds containers
const CONTAINER_SUBDIR: &str = "torrents";

/// Resolves where containers and artifacts live on disk
#[derive(Clone, Debug)]
pub struct LibraryLayout {
    downloads_dir: PathBuf,
    cache_dir: PathBuf,
    legacy_container_dir: PathBuf,
}

impl LibraryLayout {
    /// Build the layout from library settings
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            downloads_dir: config.downloads_dir.clone(),
            cache_dir: config.cache_dir.clone(),
            legacy_container_dir: config.legacy_container_dir.clone(),
        }
    }

    /// Root for downloaded artifacts
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Flat container directory from older releases
    pub fn legacy_container_dir(&self) -> &Path {
        &self.legacy_container_dir
    }

    /// Cache directory for one console
    pub fn console_cache_dir(&self, manufacturer: &str, console: &str) -> PathBuf {
        self.cache_dir
            .join(slugify(manufacturer))
            .join(slugify(console))
    }

    /// Structured container directory for one console
    pub fn container_dir(&self, manufacturer: &str, console: &str) -> PathBuf {
        self.console_cache_dir(manufacturer, console)
            .join(CONTAINER_SUBDIR)
    }

    /// Paths checked for a container, in lookup order
    ///
    /// An absolute locator naming a local file comes first. The structured
    /// per-console path is only a candidate when both labels are known; the
    /// legacy flat directory is always last.
    pub fn container_candidates(&self, locator: &str, metadata: &JobMetadata) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(3);

        let as_path = Path::new(locator);
        if as_path.is_absolute() && as_path.is_file() {
            candidates.push(as_path.to_path_buf());
        }

        let file_name = container_file_name(locator);
        if let (Some(manufacturer), Some(console)) =
            (metadata.known_manufacturer(), metadata.known_console())
        {
            candidates.push(self.container_dir(manufacturer, console).join(&file_name));
        }
        candidates.push(self.legacy_container_dir.join(&file_name));
        candidates
    }

    /// Resolve a container locator to a local path
    ///
    /// Returns the first candidate that exists. When none exists the primary
    /// candidate is returned so the caller can report where the container
    /// was expected.
    pub fn resolve_container(&self, locator: &str, metadata: &JobMetadata) -> PathBuf {
        let candidates = self.container_candidates(locator, metadata);
        candidates
            .iter()
            .find(|c| c.is_file())
            .or_else(|| candidates.first())
            .cloned()
            .unwrap_or_else(|| self.legacy_container_dir.join(container_file_name(locator)))
    }

    /// Destination for artifacts of a console when the request names none
    pub fn default_destination(&self, metadata: &JobMetadata) -> PathBuf {
        match (metadata.known_manufacturer(), metadata.known_console()) {
            (Some(manufacturer), Some(console)) => self
                .downloads_dir
                .join(slugify(manufacturer))
                .join(slugify(console)),
            (None, Some(console)) => self.downloads_dir.join(slugify(console)),
            _ => self.downloads_dir.clone(),
        }
    }
}
