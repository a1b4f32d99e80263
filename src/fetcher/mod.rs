// Model Fetcher
//
// Split into focused files:
// - downloader.rs: streaming archive transfer
// - archive.rs: extraction and atomic install
// - this file: the ModelFetcher facade (idempotence, in-flight collapsing,
//   staging lifecycle, catalog updates)

pub mod archive;
pub mod downloader;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::catalog::{CatalogError, CatalogStore, ModelDescriptor};
use crate::config::ServiceConfig;

/// Error types for model fetching. Each variant names the phase it belongs
/// to so failure messages stay actionable.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Transfer-phase failure (request, status, interrupted stream)
    Network(String),
    /// Disk failure while staging or installing
    Disk(String),
    /// The archive failed extraction or its shape is wrong
    CorruptArchive(String),
    /// An un-sized transfer exceeded the configured cap
    ResourceExhausted(String),
    /// Catalog lookup or update failed
    Catalog(CatalogError),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "Fetch failed (network): {}", msg),
            FetchError::Disk(msg) => write!(f, "Fetch failed (disk): {}", msg),
            FetchError::CorruptArchive(msg) => write!(f, "Fetch failed (extract): {}", msg),
            FetchError::ResourceExhausted(msg) => write!(f, "Fetch aborted: {}", msg),
            FetchError::Catalog(err) => write!(f, "Fetch failed (catalog): {}", err),
        }
    }
}

impl std::error::Error for FetchError {}

/// Successful download outcome
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The archive was fetched, extracted, and installed
    Installed(PathBuf),
    /// Informational no-op: the model was already on disk
    AlreadyDownloaded(PathBuf),
}

impl FetchOutcome {
    pub fn local_path(&self) -> &Path {
        match self {
            FetchOutcome::Installed(path) | FetchOutcome::AlreadyDownloaded(path) => path,
        }
    }
}

/// Progress snapshot passed to download observers
#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    pub model_id: String,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub percent: Option<f32>,
}

pub type ProgressCallback = Box<dyn Fn(DownloadProgress) + Send + Sync>;

type SharedOutcome = Option<Result<FetchOutcome, FetchError>>;

/// Downloads, verifies, and atomically installs model archives.
///
/// Concurrent `download` calls for the same id collapse into one in-flight
/// fetch whose outcome every caller observes; distinct ids download fully
/// in parallel.
pub struct ModelFetcher {
    models_dir: PathBuf,
    max_unsized_download_bytes: u64,
    catalog: Arc<CatalogStore>,
    client: reqwest::Client,
    in_flight: DashMap<String, watch::Receiver<SharedOutcome>>,
}

impl ModelFetcher {
    pub fn new(config: &ServiceConfig, catalog: Arc<CatalogStore>) -> Self {
        Self {
            models_dir: config.models_dir.clone(),
            max_unsized_download_bytes: config.max_unsized_download_bytes,
            catalog,
            client: reqwest::Client::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Whether a fetch for the id is currently running
    pub fn is_in_flight(&self, model_id: &str) -> bool {
        self.in_flight.contains_key(model_id)
    }

    /// Download and install the model. Idempotent: an already-installed
    /// model returns `AlreadyDownloaded` without network activity.
    pub async fn download(
        &self,
        model_id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<FetchOutcome, FetchError> {
        let descriptor = self.catalog.get(model_id).map_err(FetchError::Catalog)?;

        if descriptor.downloaded {
            if let Some(path) = installed_path(&descriptor) {
                log::info!("Model {} already downloaded, skipping fetch", model_id);
                return Ok(FetchOutcome::AlreadyDownloaded(path));
            }
            // Flag set but directory gone or empty: fall through and refetch.
            log::warn!(
                "Model {} is flagged downloaded but its directory is missing; refetching",
                model_id
            );
        }

        enum Role {
            Leader(watch::Sender<SharedOutcome>),
            Follower(watch::Receiver<SharedOutcome>),
        }

        let role = match self.in_flight.entry(model_id.to_string()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => {
                log::info!(
                    "Download already in progress for model {}, awaiting its outcome",
                    model_id
                );
                loop {
                    let published = rx.borrow().clone();
                    if let Some(outcome) = published {
                        return outcome;
                    }
                    if rx.changed().await.is_err() {
                        return Err(FetchError::Network(format!(
                            "In-flight download for model {} was dropped before completing",
                            model_id
                        )));
                    }
                }
            }
            Role::Leader(tx) => {
                let _guard = InFlightGuard {
                    map: &self.in_flight,
                    id: model_id.to_string(),
                };
                let result = self.perform_fetch(&descriptor, progress.as_ref()).await;
                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }

    async fn perform_fetch(
        &self,
        descriptor: &ModelDescriptor,
        progress: Option<&ProgressCallback>,
    ) -> Result<FetchOutcome, FetchError> {
        let staging = self.prepare_staging(&descriptor.id).await?;
        let result = self.fetch_into(descriptor, &staging, progress).await;

        // Staging never outlives the attempt, success or failure; retries
        // must not need manual cleanup.
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            log::warn!(
                "Failed to remove staging directory {}: {}",
                staging.display(),
                e
            );
        }

        result
    }

    async fn prepare_staging(&self, model_id: &str) -> Result<PathBuf, FetchError> {
        let staging_root = self.models_dir.join(".staging");
        tokio::fs::create_dir_all(&staging_root)
            .await
            .map_err(|e| FetchError::Disk(format!("Failed to create staging root: {}", e)))?;

        // Leftovers from interrupted attempts. Only one fetch per id can be
        // in flight, so anything matching this id is stale.
        let stale_prefix = format!("{}-", model_id);
        if let Ok(mut entries) = tokio::fs::read_dir(&staging_root).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_name().to_string_lossy().starts_with(&stale_prefix) {
                    log::warn!(
                        "Removing stale staging directory: {}",
                        entry.path().display()
                    );
                    let _ = tokio::fs::remove_dir_all(entry.path()).await;
                }
            }
        }

        let staging = staging_root.join(format!("{}-{}", model_id, Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| FetchError::Disk(format!("Failed to create staging directory: {}", e)))?;
        Ok(staging)
    }

    async fn fetch_into(
        &self,
        descriptor: &ModelDescriptor,
        staging: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<FetchOutcome, FetchError> {
        let archive_path = staging.join("model.tar.gz");

        downloader::download_to(
            &self.client,
            &descriptor.id,
            &descriptor.source_url,
            &archive_path,
            descriptor.expected_size,
            self.max_unsized_download_bytes,
            progress,
        )
        .await?;

        let final_dir = self.models_dir.join(&descriptor.id);

        let staging_owned = staging.to_path_buf();
        let install_dir = final_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<(), FetchError> {
            let content_root = archive::extract_archive(&archive_path, &staging_owned)?;
            archive::install_atomic(&content_root, &install_dir)
        })
        .await
        .map_err(|e| FetchError::Disk(format!("Extraction task failed: {}", e)))??;

        self.catalog
            .mark_downloaded(&descriptor.id, &final_dir)
            .map_err(FetchError::Catalog)?;

        log::info!(
            "Model {} installed at {}",
            descriptor.id,
            final_dir.display()
        );
        Ok(FetchOutcome::Installed(final_dir))
    }
}

/// Removes the in-flight entry when the leading download finishes or its
/// future is dropped, so an aborted fetch never wedges later attempts.
struct InFlightGuard<'a> {
    map: &'a DashMap<String, watch::Receiver<SharedOutcome>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}

/// The descriptor's install directory, if it actually exists and is
/// non-empty (the invariant behind `downloaded = true`).
fn installed_path(descriptor: &ModelDescriptor) -> Option<PathBuf> {
    let path = descriptor.local_path.clone()?;
    let mut entries = std::fs::read_dir(&path).ok()?;
    entries.next().is_some().then_some(path)
}
